//! GenerationRun projection types
//!
//! The per-run, per-slot view a renderer paints. Values here are only ever
//! produced by [`super::reducer`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::FailurePhase;

/// Lifecycle stage of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Waiting for the backend to pick it up
    #[default]
    Queued,
    /// LLM drafting (or redrafting after a contract failure)
    Drafting,
    /// Contract passed, sandboxed verification in progress
    Verifying,
    /// Finished successfully
    Done,
    /// Gave up
    Failed,
}

impl Stage {
    /// Check if the stage absorbs every later slot event
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Drafting => write!(f, "drafting"),
            Self::Verifying => write!(f, "verifying"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Which pipeline steps of the current attempt have finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageCompletion {
    pub drafted: bool,
    pub contract_validated: bool,
    pub sandbox_verified: bool,
}

impl StageCompletion {
    /// Everything finished
    pub const ALL: Self = Self {
        drafted: true,
        contract_validated: true,
        sandbox_verified: true,
    };

    /// Draft written and accepted by the contract check
    pub const CONTRACT_PASSED: Self = Self {
        drafted: true,
        contract_validated: true,
        sandbox_verified: false,
    };

    /// Draft written, nothing else
    pub const DRAFTED: Self = Self {
        drafted: true,
        contract_validated: false,
        sandbox_verified: false,
    };

    pub fn is_complete(&self) -> bool {
        self.drafted && self.contract_validated && self.sandbox_verified
    }
}

/// The most recent failure of the current attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotFailure {
    pub phase: FailurePhase,
    pub message: String,
}

/// Generation lifecycle of one slot
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlotProgress {
    pub stage: Stage,
    /// Drafting attempts reported by the backend
    pub attempt: u32,
    pub difficulty: Option<String>,
    pub topic: Option<String>,
    pub language: Option<String>,
    pub completion: StageCompletion,
    pub last_failure: Option<SlotFailure>,
}

impl SlotProgress {
    /// A fresh queued slot
    pub fn queued() -> Self {
        Self::default()
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }
}

/// Largest slot count a run may declare
pub const MAX_SLOTS: usize = 10_000;

/// Checks a declared slot count, returning the reason it is unusable
pub fn check_slot_count(total_slots: usize) -> Result<(), String> {
    if total_slots == 0 {
        return Err("total slots must be positive".to_string());
    }
    if total_slots > MAX_SLOTS {
        return Err(format!("total slots {} exceeds {}", total_slots, MAX_SLOTS));
    }
    Ok(())
}

/// One end-to-end generation run for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRun {
    /// Fixed at initialization; always equals `slots.len()`
    total_slots: usize,
    pub run_number: u64,
    slots: Vec<SlotProgress>,
    /// Terminal run-level error, rendered as a banner
    pub error: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl GenerationRun {
    /// A run of `total_slots` queued slots
    ///
    /// Callers check the count with [`check_slot_count`] first; the reducer
    /// does this for every run-initializing event.
    pub fn new(total_slots: usize, run_number: u64) -> Self {
        Self {
            total_slots,
            run_number,
            slots: vec![SlotProgress::queued(); total_slots],
            error: None,
            last_heartbeat: None,
        }
    }

    pub fn total_slots(&self) -> usize {
        self.total_slots
    }

    pub fn slots(&self) -> &[SlotProgress] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&SlotProgress> {
        self.slots.get(index)
    }

    /// Mutable access for the reducer; the slot vector itself never resizes
    pub(crate) fn slot_mut(&mut self, index: usize) -> Option<&mut SlotProgress> {
        self.slots.get_mut(index)
    }

    pub(crate) fn slots_mut(&mut self) -> impl Iterator<Item = &mut SlotProgress> {
        self.slots.iter_mut()
    }

    /// Number of slots in `stage`
    pub fn count(&self, stage: Stage) -> usize {
        self.slots.iter().filter(|s| s.stage == stage).count()
    }

    /// Run failed or every slot reached a terminal stage
    pub fn is_finished(&self) -> bool {
        self.error.is_some() || self.slots.iter().all(SlotProgress::is_terminal)
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}
