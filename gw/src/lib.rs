//! genwatch - Generation Progress Client
//!
//! Starts multi-slot generation runs on a backend and follows their progress
//! over SSE. The backend owns every decision; this crate folds what it reports
//! into a per-slot projection and renders it.
//!
//! # Core Concepts
//!
//! - **Pure Reducer**: `apply(state, event)` is the only way the projection changes
//! - **Decode Boundary**: both wire schemas are normalized before the reducer sees them
//! - **Terminal Absorption**: done and failed slots ignore everything but a new run
//! - **Owned Streams**: one subscription per watcher, closed on drop
//!
//! # Modules
//!
//! - [`events`] - Event vocabulary, wire decoding and recordings
//! - [`progress`] - Projection types, reducer and display values
//! - [`client`] - Backend client trait and HTTP implementation
//! - [`stream`] - SSE subscription, stall watchdog and watcher
//! - [`render`] - Terminal output
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod client;
pub mod config;
pub mod events;
pub mod progress;
pub mod render;
pub mod stream;

// Re-export commonly used types
pub use client::{ClientError, GenerationApi, GenerationStarted, HttpGenerationClient, create_client};
pub use config::Config;
pub use events::{Decoded, FailurePhase, IgnoreReason, ProgressEvent, decode_message};
pub use progress::{
    Effect, GenerationRun, ProgressTracker, SlotProgress, Stage, apply, overall_percent, slot_percent, status_text,
};
pub use stream::{ProgressSubscription, ProgressWatcher, StreamError, StreamUpdate};
