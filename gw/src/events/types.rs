//! Canonical progress event vocabulary
//!
//! Every event the backend can send, in one schema. Wire-level naming
//! differences are resolved in [`super::wire`] before events get here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which pipeline phase a slot failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePhase {
    /// Structural contract check on the drafted output
    Contract,
    /// Sandboxed verification run
    Verification,
}

impl std::fmt::Display for FailurePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Contract => write!(f, "contract"),
            Self::Verification => write!(f, "verification"),
        }
    }
}

/// Core event enum - the vocabulary of generation progress
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    // === Run Lifecycle ===
    /// A new run has begun; replaces any prior projection
    RunInitializing { total_slots: usize, run_number: u64 },
    /// Liveness signal from the backend
    Heartbeat { timestamp: DateTime<Utc> },
    /// The run failed; `index` narrows the failure to one slot
    RunFailed { index: Option<usize>, error: String },

    // === Slot Lifecycle ===
    /// Work on a slot has been picked up
    SlotStarted {
        index: usize,
        difficulty: Option<String>,
        topic: Option<String>,
        language: Option<String>,
    },
    /// A fresh drafting attempt has begun
    AttemptStarted { index: usize, attempt: u32 },
    /// The draft passed the contract check
    ContractValidated { index: usize, attempt: Option<u32> },
    /// The draft failed the contract check
    ContractFailed {
        index: usize,
        attempt: Option<u32>,
        error: String,
    },
    /// Sandboxed verification has begun
    VerificationStarted { index: usize, attempt: Option<u32> },
    /// Sandboxed verification failed
    VerificationFailed {
        index: usize,
        attempt: Option<u32>,
        error: String,
    },
    /// The slot finished successfully
    SlotCompleted { index: usize },
    /// The slot gave up
    SlotFailed { index: usize },
}

impl ProgressEvent {
    /// Slot index this event addresses, if any
    pub fn slot_index(&self) -> Option<usize> {
        match self {
            ProgressEvent::RunInitializing { .. } | ProgressEvent::Heartbeat { .. } => None,
            ProgressEvent::RunFailed { index, .. } => *index,
            ProgressEvent::SlotStarted { index, .. }
            | ProgressEvent::AttemptStarted { index, .. }
            | ProgressEvent::ContractValidated { index, .. }
            | ProgressEvent::ContractFailed { index, .. }
            | ProgressEvent::VerificationStarted { index, .. }
            | ProgressEvent::VerificationFailed { index, .. }
            | ProgressEvent::SlotCompleted { index }
            | ProgressEvent::SlotFailed { index } => Some(*index),
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            ProgressEvent::RunInitializing { .. } => "RunInitializing",
            ProgressEvent::Heartbeat { .. } => "Heartbeat",
            ProgressEvent::RunFailed { .. } => "RunFailed",
            ProgressEvent::SlotStarted { .. } => "SlotStarted",
            ProgressEvent::AttemptStarted { .. } => "AttemptStarted",
            ProgressEvent::ContractValidated { .. } => "ContractValidated",
            ProgressEvent::ContractFailed { .. } => "ContractFailed",
            ProgressEvent::VerificationStarted { .. } => "VerificationStarted",
            ProgressEvent::VerificationFailed { .. } => "VerificationFailed",
            ProgressEvent::SlotCompleted { .. } => "SlotCompleted",
            ProgressEvent::SlotFailed { .. } => "SlotFailed",
        }
    }

    /// Whether this event ends a slot (or the whole run)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::SlotCompleted { .. } | ProgressEvent::SlotFailed { .. } | ProgressEvent::RunFailed { .. }
        )
    }
}
