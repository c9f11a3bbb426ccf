//! ProgressTracker - the projection a single view owns
//!
//! Wraps the reducer with the decode boundary and keeps counters of what was
//! applied and what was dropped, so a misbehaving stream can be diagnosed
//! without surfacing anything to the user.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use super::display::overall_percent;
use super::reducer::{Effect, step};
use super::run::GenerationRun;
use crate::events::{Decoded, ProgressEvent, decode_message};

/// Counters for troubleshooting a stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    /// Events that changed the projection
    pub applied: u64,
    /// Events accepted with no visible effect (replays, repeated terminals)
    pub unchanged: u64,
    /// Dropped messages keyed by [`crate::events::IgnoreReason::kind`]
    pub ignored: BTreeMap<&'static str, u64>,
}

impl TrackerStats {
    pub fn total_ignored(&self) -> u64 {
        self.ignored.values().sum()
    }
}

/// Owns one projection and folds events into it
#[derive(Debug, Default)]
pub struct ProgressTracker {
    state: Option<GenerationRun>,
    stats: TrackerStats,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current projection (None until a run initializes)
    pub fn run(&self) -> Option<&GenerationRun> {
        self.state.as_ref()
    }

    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }

    /// Overall percent of the current run, if any
    pub fn overall_percent(&self) -> Option<u8> {
        self.state.as_ref().map(overall_percent)
    }

    /// Drop the projection and counters (e.g. before attaching to a new stream)
    pub fn reset(&mut self) {
        debug!("ProgressTracker::reset: called");
        self.state = None;
        self.stats = TrackerStats::default();
    }

    /// Fold a canonical event
    pub fn handle_event(&mut self, event: &ProgressEvent) -> Effect {
        let effect = step(&mut self.state, event);
        self.count(&effect);
        effect
    }

    /// Decode a raw SSE message and fold it
    pub fn handle_message(&mut self, sse_event: &str, data: &str) -> Effect {
        match decode_message(sse_event, data) {
            Decoded::Event(event) => self.handle_event(&event),
            Decoded::Ignored(reason) => {
                let effect = Effect::Ignored(reason);
                self.count(&effect);
                effect
            }
        }
    }

    /// Take the projection out, leaving the tracker empty
    pub fn into_run(self) -> Option<GenerationRun> {
        self.state
    }

    fn count(&mut self, effect: &Effect) {
        match effect {
            Effect::Applied => self.stats.applied += 1,
            Effect::Unchanged => self.stats.unchanged += 1,
            Effect::Ignored(reason) => *self.stats.ignored.entry(reason.kind()).or_insert(0) += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DEFAULT_SSE_EVENT;
    use crate::progress::Stage;

    #[test]
    fn test_tracker_folds_raw_messages() {
        let mut tracker = ProgressTracker::new();
        let messages = [
            r#"{"type":"run_init","totalSlots":2,"runNumber":1}"#,
            r#"{"type":"slot_attempt","slotIndex":0,"attempt":1}"#,
            r#"{"type":"slot_done","slotIndex":0}"#,
            r#"{"type":"slot_done","slotIndex":0}"#,
            r#"{"type":"slot_done","slotIndex":7}"#,
            r#"{"type":"brand_new_thing"}"#,
            "garbage",
        ];
        for m in messages {
            tracker.handle_message(DEFAULT_SSE_EVENT, m);
        }

        let run = tracker.run().unwrap();
        assert_eq!(run.slot(0).unwrap().stage, Stage::Done);
        assert_eq!(tracker.overall_percent(), Some(50));

        let stats = tracker.stats();
        assert_eq!(stats.applied, 3);
        assert_eq!(stats.unchanged, 1);
        assert_eq!(stats.ignored.get("index_out_of_range"), Some(&1));
        assert_eq!(stats.ignored.get("unknown_type"), Some(&1));
        assert_eq!(stats.ignored.get("not_json"), Some(&1));
        assert_eq!(stats.total_ignored(), 3);
    }

    #[test]
    fn test_mixed_schemas_share_slot_space() {
        let mut tracker = ProgressTracker::new();
        tracker.handle_message(DEFAULT_SSE_EVENT, r#"{"type":"progress_init","total":2}"#);
        tracker.handle_message(DEFAULT_SSE_EVENT, r#"{"type":"attempt_started","index":1,"attempt":1}"#);
        tracker.handle_message(DEFAULT_SSE_EVENT, r#"{"type":"slot_docker_started","slotIndex":1}"#);
        tracker.handle_message(DEFAULT_SSE_EVENT, r#"{"type":"problem_completed","index":1}"#);

        let run = tracker.run().unwrap();
        assert_eq!(run.slot(1).unwrap().stage, Stage::Done);
        assert_eq!(run.slot(0).unwrap().stage, Stage::Queued);
    }

    #[test]
    fn test_oversized_run_leaves_current_run() {
        let mut tracker = ProgressTracker::new();
        tracker.handle_message(DEFAULT_SSE_EVENT, r#"{"type":"run_init","totalSlots":2}"#);
        let effect = tracker.handle_message(DEFAULT_SSE_EVENT, r#"{"type":"run_init","totalSlots":100000000000000000}"#);

        assert!(!effect.changed());
        assert_eq!(tracker.run().unwrap().total_slots(), 2);
        assert_eq!(tracker.stats().ignored.get("invalid_value"), Some(&1));
    }

    #[test]
    fn test_reset() {
        let mut tracker = ProgressTracker::new();
        tracker.handle_message(DEFAULT_SSE_EVENT, r#"{"type":"run_init","totalSlots":1}"#);
        assert!(tracker.run().is_some());
        tracker.reset();
        assert!(tracker.run().is_none());
        assert_eq!(tracker.stats(), &TrackerStats::default());
    }
}
