//! Progress Stream Reducer
//!
//! Folds canonical [`ProgressEvent`]s into a [`GenerationRun`] projection.
//! The fold is total: every event either changes the projection or is
//! ignored with a reason, nothing panics and nothing errors.
//!
//! Per-slot state machine:
//!
//! ```text
//!            slot-started /
//!            attempt-started          contract-validated /
//!   queued ───────────────► drafting ─────────────────────► verifying ──slot-completed──► done
//!                            ▲   │    verification-started     │  ▲
//!                            │   └── contract-failed (self)    │  └── verification-failed (self)
//!                            └───────── attempt-started ───────┘
//!
//!   drafting | verifying ──slot-failed / run-failed──► failed
//! ```
//!
//! `done` and `failed` absorb every later slot event. Only a new
//! run-initializing event starts over.

use tracing::debug;

use super::run::{GenerationRun, SlotFailure, SlotProgress, Stage, StageCompletion, check_slot_count};
use crate::events::{FailurePhase, IgnoreReason, ProgressEvent};

/// What a single event did to the projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// The projection changed
    Applied,
    /// Accepted, but the projection was already in the resulting state
    Unchanged,
    /// Dropped without touching the projection
    Ignored(IgnoreReason),
}

impl Effect {
    pub fn changed(&self) -> bool {
        matches!(self, Effect::Applied)
    }
}

/// Pure fold step: prior projection + event -> next projection
pub fn apply(prior: Option<GenerationRun>, event: &ProgressEvent) -> Option<GenerationRun> {
    let mut state = prior;
    step(&mut state, event);
    state
}

/// Apply `event` in place and report what happened
pub fn step(state: &mut Option<GenerationRun>, event: &ProgressEvent) -> Effect {
    let effect = step_inner(state, event);
    if let Effect::Ignored(reason) = &effect {
        debug!(event_type = event.event_type(), %reason, "reducer: event ignored");
    }
    effect
}

fn step_inner(state: &mut Option<GenerationRun>, event: &ProgressEvent) -> Effect {
    if let ProgressEvent::RunInitializing {
        total_slots,
        run_number,
    } = event
    {
        return init_run(state, event, *total_slots, *run_number);
    }

    let Some(run) = state.as_mut() else {
        return Effect::Ignored(IgnoreReason::NoActiveRun);
    };

    match event {
        ProgressEvent::Heartbeat { timestamp } => {
            if run.last_heartbeat == Some(*timestamp) {
                return Effect::Unchanged;
            }
            run.last_heartbeat = Some(*timestamp);
            Effect::Applied
        }
        ProgressEvent::RunFailed { index, error } => fail_run(run, *index, error),
        _ => slot_event(run, event),
    }
}

fn init_run(state: &mut Option<GenerationRun>, event: &ProgressEvent, total_slots: usize, run_number: u64) -> Effect {
    if let Err(reason) = check_slot_count(total_slots) {
        return Effect::Ignored(IgnoreReason::InvalidValue {
            event_type: event.event_type().to_string(),
            reason,
        });
    }
    debug!(total_slots, run_number, "reducer: run initialized");
    *state = Some(GenerationRun::new(total_slots, run_number));
    Effect::Applied
}

fn slot_event(run: &mut GenerationRun, event: &ProgressEvent) -> Effect {
    if run.is_failed() {
        return Effect::Ignored(IgnoreReason::RunTerminated);
    }
    let Some(index) = event.slot_index() else {
        return Effect::Unchanged;
    };
    let total_slots = run.total_slots();
    let Some(slot) = run.slot_mut(index) else {
        return Effect::Ignored(IgnoreReason::IndexOutOfRange { index, total_slots });
    };
    let before = slot.clone();
    transition(slot, event);
    if *slot == before { Effect::Unchanged } else { Effect::Applied }
}

fn fail_run(run: &mut GenerationRun, index: Option<usize>, error: &str) -> Effect {
    if run.is_failed() {
        return Effect::Ignored(IgnoreReason::RunTerminated);
    }
    if let Some(i) = index
        && i >= run.total_slots()
    {
        return Effect::Ignored(IgnoreReason::IndexOutOfRange {
            index: i,
            total_slots: run.total_slots(),
        });
    }

    debug!(?index, %error, "reducer: run failed");
    run.error = Some(error.to_string());
    match index {
        Some(i) => {
            if let Some(slot) = run.slot_mut(i) {
                fail_slot(slot);
            }
        }
        None => run.slots_mut().for_each(fail_slot),
    }
    Effect::Applied
}

fn fail_slot(slot: &mut SlotProgress) {
    if slot.stage != Stage::Done {
        slot.stage = Stage::Failed;
    }
}

/// Adopt an attempt number when the event carries one
fn adopt_attempt(slot: &mut SlotProgress, attempt: Option<u32>) {
    if let Some(a) = attempt {
        slot.attempt = a;
    }
}

/// Slot transition table
fn transition(slot: &mut SlotProgress, event: &ProgressEvent) {
    // Metadata is informational and accepted in any stage
    if let ProgressEvent::SlotStarted {
        difficulty,
        topic,
        language,
        ..
    } = event
    {
        if difficulty.is_some() {
            slot.difficulty = difficulty.clone();
        }
        if topic.is_some() {
            slot.topic = topic.clone();
        }
        if language.is_some() {
            slot.language = language.clone();
        }
        if slot.stage == Stage::Queued {
            slot.stage = Stage::Drafting;
        }
        return;
    }

    if slot.is_terminal() {
        return;
    }

    match event {
        ProgressEvent::AttemptStarted { attempt, .. } => {
            slot.stage = Stage::Drafting;
            slot.attempt = *attempt;
            slot.completion = StageCompletion::default();
            slot.last_failure = None;
        }
        ProgressEvent::ContractValidated { attempt, .. } | ProgressEvent::VerificationStarted { attempt, .. } => {
            adopt_attempt(slot, *attempt);
            slot.stage = Stage::Verifying;
            slot.completion = StageCompletion::CONTRACT_PASSED;
            slot.last_failure = None;
        }
        ProgressEvent::ContractFailed { attempt, error, .. } => {
            adopt_attempt(slot, *attempt);
            slot.stage = Stage::Drafting;
            slot.completion = StageCompletion::DRAFTED;
            slot.last_failure = Some(SlotFailure {
                phase: FailurePhase::Contract,
                message: error.clone(),
            });
        }
        ProgressEvent::VerificationFailed { attempt, error, .. } => {
            adopt_attempt(slot, *attempt);
            slot.stage = Stage::Verifying;
            slot.completion = StageCompletion::CONTRACT_PASSED;
            slot.last_failure = Some(SlotFailure {
                phase: FailurePhase::Verification,
                message: error.clone(),
            });
        }
        ProgressEvent::SlotCompleted { .. } => {
            slot.stage = Stage::Done;
            slot.completion = StageCompletion::ALL;
            slot.last_failure = None;
        }
        ProgressEvent::SlotFailed { .. } => {
            slot.stage = Stage::Failed;
        }
        ProgressEvent::RunInitializing { .. }
        | ProgressEvent::Heartbeat { .. }
        | ProgressEvent::RunFailed { .. }
        | ProgressEvent::SlotStarted { .. } => {}
    }
}
