//! Derived display values
//!
//! Pure functions of the projection; nothing here is stored.
//!
//! Per-slot percentages use one scale for both event schemas:
//! queued 0, drafting 25, verifying 75, done/failed 100.

use super::run::{GenerationRun, SlotFailure, SlotProgress, Stage};
use crate::events::FailurePhase;

/// Attempts shown in "attempt N of M" text. Display only; the backend
/// decides when to stop retrying.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Overall completion: share of slots that are done, rounded, 0..=100
pub fn overall_percent(run: &GenerationRun) -> u8 {
    let total = run.total_slots();
    if total == 0 {
        return 0;
    }
    let done = run.count(Stage::Done);
    let pct = (100.0 * done as f64 / total as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Per-slot percentage for a progress bar
pub fn slot_percent(slot: &SlotProgress) -> u8 {
    match slot.stage {
        Stage::Queued => 0,
        Stage::Drafting => 25,
        Stage::Verifying => 75,
        Stage::Done | Stage::Failed => 100,
    }
}

fn attempt_suffix(attempt: u32, max_attempts: u32) -> String {
    if attempt == 0 {
        String::new()
    } else {
        format!(" (attempt {} of {})", attempt, max_attempts)
    }
}

fn with_message(prefix: &str, failure: &SlotFailure) -> String {
    if failure.message.is_empty() {
        prefix.to_string()
    } else {
        format!("{}: {}", prefix, failure.message)
    }
}

/// Human status line for a slot; a function of stage, attempt and last failure only
pub fn status_text(slot: &SlotProgress, max_attempts: u32) -> String {
    let suffix = attempt_suffix(slot.attempt, max_attempts);
    match (slot.stage, &slot.last_failure) {
        (Stage::Queued, _) => "Queued".to_string(),
        (Stage::Drafting, Some(f)) if f.phase == FailurePhase::Contract => {
            format!("{}, retrying{}", with_message("Contract check failed", f), suffix)
        }
        (Stage::Drafting, _) => format!("Drafting{}", suffix),
        (Stage::Verifying, Some(f)) if f.phase == FailurePhase::Verification => {
            format!("{}{}", with_message("Sandbox verification failed", f), suffix)
        }
        (Stage::Verifying, _) => format!("Verifying in sandbox{}", suffix),
        (Stage::Done, _) => "Done".to_string(),
        (Stage::Failed, Some(f)) => with_message(&format!("Failed during {}", f.phase), f),
        (Stage::Failed, None) => "Failed".to_string(),
    }
}
