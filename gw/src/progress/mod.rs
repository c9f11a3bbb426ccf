//! Generation progress projection
//!
//! - [`run`] - the projection types (`GenerationRun`, `SlotProgress`)
//! - [`reducer`] - the pure fold from events to projection
//! - [`display`] - derived percentages and status text
//! - [`tracker`] - a view-owned projection with drop counters

pub mod display;
pub mod reducer;
mod run;
mod tracker;

pub use display::{DEFAULT_MAX_ATTEMPTS, overall_percent, slot_percent, status_text};
pub use reducer::{Effect, apply, step};
pub use run::{GenerationRun, MAX_SLOTS, SlotFailure, SlotProgress, Stage, StageCompletion, check_slot_count};
pub use tracker::{ProgressTracker, TrackerStats};
