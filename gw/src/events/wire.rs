//! Decode boundary for raw progress messages
//!
//! The backend has shipped two naming schemes for the same events:
//!
//! | canonical            | current (`slot/contract/docker`) | legacy (`problem/attempt/validation`) |
//! |----------------------|----------------------------------|---------------------------------------|
//! | RunInitializing      | `run_init`                       | `progress_init`                       |
//! | Heartbeat            | `heartbeat`                      | `ping`                                |
//! | SlotStarted          | `slot_started`                   | `problem_started`                     |
//! | AttemptStarted       | `slot_attempt`                   | `attempt_started`                     |
//! | ContractValidated    | `slot_contract_ok`               | (none)                                |
//! | ContractFailed       | `slot_contract_failed`           | `attempt_failed` + `phase: contract`  |
//! | VerificationStarted  | `slot_docker_started`            | `validation_started`                  |
//! | VerificationFailed   | `slot_docker_failed`             | `attempt_failed` + `phase: validate`  |
//! | SlotCompleted        | `slot_done`                      | `problem_completed`                   |
//! | SlotFailed           | `slot_failed`                    | `problem_failed`                      |
//! | RunFailed            | `run_failed`                     | `error`                               |
//!
//! Both are folded into [`ProgressEvent`] here so the reducer only ever sees
//! one vocabulary. Anything that fails the shape check is reported as an
//! [`IgnoreReason`] instead of an error: the stream is untrusted input.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::types::{FailurePhase, ProgressEvent};
use crate::progress::check_slot_count;

/// SSE event name used when the server sets no `event:` field
pub const DEFAULT_SSE_EVENT: &str = "message";

/// Result of decoding one raw message
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A well-formed, recognized event
    Event(ProgressEvent),
    /// The message was dropped at the boundary
    Ignored(IgnoreReason),
}

/// Why a message (or event) was dropped without touching the projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Payload was not a JSON object
    NotJson(String),
    /// No `type` field and no SSE event name to fall back on
    MissingType,
    /// A discriminant this client does not know (newer backend)
    UnknownType(String),
    /// A known discriminant with the wrong shape
    Malformed { event_type: String, error: String },
    /// Shape was fine but a value is out of its domain
    InvalidValue { event_type: String, reason: String },
    /// Slot event arrived before any run-initializing event
    NoActiveRun,
    /// Slot index outside `[0, total_slots)`
    IndexOutOfRange { index: usize, total_slots: usize },
    /// Slot event after the run was failed
    RunTerminated,
}

impl IgnoreReason {
    /// Short stable label, used as a counter key
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotJson(_) => "not_json",
            Self::MissingType => "missing_type",
            Self::UnknownType(_) => "unknown_type",
            Self::Malformed { .. } => "malformed",
            Self::InvalidValue { .. } => "invalid_value",
            Self::NoActiveRun => "no_active_run",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::RunTerminated => "run_terminated",
        }
    }
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotJson(e) => write!(f, "payload is not a JSON object: {}", e),
            Self::MissingType => write!(f, "payload has no type discriminant"),
            Self::UnknownType(t) => write!(f, "unknown event type '{}'", t),
            Self::Malformed { event_type, error } => write!(f, "malformed '{}' event: {}", event_type, error),
            Self::InvalidValue { event_type, reason } => write!(f, "invalid '{}' event: {}", event_type, reason),
            Self::NoActiveRun => write!(f, "no run has been initialized"),
            Self::IndexOutOfRange { index, total_slots } => {
                write!(f, "slot index {} outside run of {} slots", index, total_slots)
            }
            Self::RunTerminated => write!(f, "run already failed"),
        }
    }
}

/// Heartbeat timestamp as sent on the wire
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    /// Epoch milliseconds
    Millis(i64),
    /// RFC 3339 text
    Text(String),
}

impl WireTimestamp {
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            WireTimestamp::Millis(ms) => DateTime::from_timestamp_millis(*ms),
            WireTimestamp::Text(s) => DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc)),
        }
    }
}

/// Legacy `phase` values on `attempt_failed`
#[derive(Debug, Clone, Copy, Deserialize)]
enum LegacyPhase {
    #[serde(rename = "contract")]
    Contract,
    #[serde(rename = "validate", alias = "validation", alias = "docker")]
    Validate,
}

impl From<LegacyPhase> for FailurePhase {
    fn from(phase: LegacyPhase) -> Self {
        match phase {
            LegacyPhase::Contract => FailurePhase::Contract,
            LegacyPhase::Validate => FailurePhase::Verification,
        }
    }
}

/// Every message shape the backend has ever sent
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireEvent {
    // === Current schema ===
    #[serde(rename = "run_init", rename_all = "camelCase")]
    RunInit {
        total_slots: usize,
        #[serde(default)]
        run_number: u64,
    },
    #[serde(rename = "heartbeat")]
    Heartbeat {
        #[serde(default)]
        ts: Option<WireTimestamp>,
    },
    #[serde(rename = "slot_started", rename_all = "camelCase")]
    SlotStarted {
        #[serde(alias = "index")]
        slot_index: usize,
        #[serde(default)]
        difficulty: Option<String>,
        #[serde(default)]
        topic: Option<String>,
        #[serde(default)]
        language: Option<String>,
    },
    #[serde(rename = "slot_attempt", rename_all = "camelCase")]
    SlotAttempt {
        #[serde(alias = "index")]
        slot_index: usize,
        attempt: u32,
    },
    #[serde(rename = "slot_contract_ok", rename_all = "camelCase")]
    SlotContractOk {
        #[serde(alias = "index")]
        slot_index: usize,
        #[serde(default)]
        attempt: Option<u32>,
    },
    #[serde(rename = "slot_contract_failed", rename_all = "camelCase")]
    SlotContractFailed {
        #[serde(alias = "index")]
        slot_index: usize,
        #[serde(default)]
        attempt: Option<u32>,
        #[serde(default, alias = "message")]
        error: String,
    },
    #[serde(rename = "slot_docker_started", rename_all = "camelCase")]
    SlotDockerStarted {
        #[serde(alias = "index")]
        slot_index: usize,
        #[serde(default)]
        attempt: Option<u32>,
    },
    #[serde(rename = "slot_docker_failed", rename_all = "camelCase")]
    SlotDockerFailed {
        #[serde(alias = "index")]
        slot_index: usize,
        #[serde(default)]
        attempt: Option<u32>,
        #[serde(default, alias = "message")]
        error: String,
    },
    #[serde(rename = "slot_done", rename_all = "camelCase")]
    SlotDone {
        #[serde(alias = "index")]
        slot_index: usize,
    },
    #[serde(rename = "slot_failed", rename_all = "camelCase")]
    SlotFailed {
        #[serde(alias = "index")]
        slot_index: usize,
    },
    #[serde(rename = "run_failed", rename_all = "camelCase")]
    RunFailed {
        #[serde(default, alias = "index")]
        slot_index: Option<usize>,
        #[serde(default, alias = "message")]
        error: String,
    },

    // === Legacy schema ===
    #[serde(rename = "progress_init")]
    ProgressInit {
        total: usize,
        #[serde(default)]
        run: u64,
    },
    #[serde(rename = "ping")]
    Ping {
        #[serde(default)]
        ts: Option<WireTimestamp>,
    },
    #[serde(rename = "problem_started")]
    ProblemStarted {
        index: usize,
        #[serde(default)]
        difficulty: Option<String>,
        #[serde(default)]
        topic: Option<String>,
        #[serde(default)]
        language: Option<String>,
    },
    #[serde(rename = "attempt_started")]
    AttemptStarted { index: usize, attempt: u32 },
    #[serde(rename = "attempt_failed")]
    AttemptFailed {
        index: usize,
        #[serde(default)]
        attempt: Option<u32>,
        phase: LegacyPhase,
        #[serde(default, alias = "message")]
        error: String,
    },
    #[serde(rename = "validation_started")]
    ValidationStarted {
        index: usize,
        #[serde(default)]
        attempt: Option<u32>,
    },
    #[serde(rename = "problem_completed")]
    ProblemCompleted { index: usize },
    #[serde(rename = "problem_failed")]
    ProblemFailed { index: usize },
    #[serde(rename = "error")]
    LegacyError {
        #[serde(default)]
        index: Option<usize>,
        #[serde(default, alias = "error")]
        message: String,
    },

    #[serde(other)]
    Unknown,
}

impl WireEvent {
    /// Map onto the canonical vocabulary. `received_at` stamps heartbeats
    /// that carry no timestamp of their own.
    fn normalize(self, event_type: &str, received_at: DateTime<Utc>) -> Decoded {
        let event = match self {
            WireEvent::RunInit {
                total_slots,
                run_number,
            }
            | WireEvent::ProgressInit {
                total: total_slots,
                run: run_number,
            } => {
                if let Err(reason) = check_slot_count(total_slots) {
                    return Decoded::Ignored(IgnoreReason::InvalidValue {
                        event_type: event_type.to_string(),
                        reason,
                    });
                }
                ProgressEvent::RunInitializing {
                    total_slots,
                    run_number,
                }
            }
            WireEvent::Heartbeat { ts } | WireEvent::Ping { ts } => {
                let timestamp = match ts {
                    None => received_at,
                    Some(raw) => match raw.to_utc() {
                        Some(t) => t,
                        None => {
                            return Decoded::Ignored(IgnoreReason::InvalidValue {
                                event_type: event_type.to_string(),
                                reason: format!("unreadable timestamp {:?}", raw),
                            });
                        }
                    },
                };
                ProgressEvent::Heartbeat { timestamp }
            }
            WireEvent::SlotStarted {
                slot_index: index,
                difficulty,
                topic,
                language,
            }
            | WireEvent::ProblemStarted {
                index,
                difficulty,
                topic,
                language,
            } => ProgressEvent::SlotStarted {
                index,
                difficulty,
                topic,
                language,
            },
            WireEvent::SlotAttempt {
                slot_index: index,
                attempt,
            }
            | WireEvent::AttemptStarted { index, attempt } => ProgressEvent::AttemptStarted { index, attempt },
            WireEvent::SlotContractOk {
                slot_index: index,
                attempt,
            } => ProgressEvent::ContractValidated { index, attempt },
            WireEvent::SlotContractFailed {
                slot_index: index,
                attempt,
                error,
            } => ProgressEvent::ContractFailed { index, attempt, error },
            WireEvent::SlotDockerStarted {
                slot_index: index,
                attempt,
            }
            | WireEvent::ValidationStarted { index, attempt } => ProgressEvent::VerificationStarted { index, attempt },
            WireEvent::SlotDockerFailed {
                slot_index: index,
                attempt,
                error,
            } => ProgressEvent::VerificationFailed { index, attempt, error },
            WireEvent::AttemptFailed {
                index,
                attempt,
                phase,
                error,
            } => match FailurePhase::from(phase) {
                FailurePhase::Contract => ProgressEvent::ContractFailed { index, attempt, error },
                FailurePhase::Verification => ProgressEvent::VerificationFailed { index, attempt, error },
            },
            WireEvent::SlotDone { slot_index: index } | WireEvent::ProblemCompleted { index } => {
                ProgressEvent::SlotCompleted { index }
            }
            WireEvent::SlotFailed { slot_index: index } | WireEvent::ProblemFailed { index } => {
                ProgressEvent::SlotFailed { index }
            }
            WireEvent::RunFailed {
                slot_index: index,
                error,
            }
            | WireEvent::LegacyError { index, message: error } => ProgressEvent::RunFailed { index, error },
            WireEvent::Unknown => return Decoded::Ignored(IgnoreReason::UnknownType(event_type.to_string())),
        };
        Decoded::Event(event)
    }
}

/// Decode one SSE message, stamping missing heartbeat times with now
pub fn decode_message(sse_event: &str, data: &str) -> Decoded {
    decode_message_at(sse_event, data, Utc::now())
}

/// Decode one SSE message with an explicit receipt time
///
/// `sse_event` is the SSE `event:` field; it names the event only when
/// the JSON payload has no `type` of its own.
pub fn decode_message_at(sse_event: &str, data: &str, received_at: DateTime<Utc>) -> Decoded {
    let mut value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "decode_message: payload is not JSON");
            return Decoded::Ignored(IgnoreReason::NotJson(e.to_string()));
        }
    };

    let Some(obj) = value.as_object_mut() else {
        debug!("decode_message: payload is not an object");
        return Decoded::Ignored(IgnoreReason::NotJson("expected a JSON object".to_string()));
    };

    let declared = obj.get("type").and_then(Value::as_str).map(str::to_string);
    let event_type = match declared {
        Some(t) => t,
        None if !sse_event.is_empty() && sse_event != DEFAULT_SSE_EVENT => {
            debug!(%sse_event, "decode_message: using SSE event name as discriminant");
            obj.insert("type".to_string(), Value::String(sse_event.to_string()));
            sse_event.to_string()
        }
        None => {
            debug!("decode_message: no discriminant");
            return Decoded::Ignored(IgnoreReason::MissingType);
        }
    };

    match serde_json::from_value::<WireEvent>(value) {
        Ok(wire) => {
            let decoded = wire.normalize(&event_type, received_at);
            if let Decoded::Ignored(reason) = &decoded {
                debug!(%event_type, %reason, "decode_message: ignored");
            }
            decoded
        }
        Err(e) => {
            debug!(%event_type, error = %e, "decode_message: malformed");
            Decoded::Ignored(IgnoreReason::Malformed {
                event_type,
                error: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(data: &str) -> Decoded {
        decode_message_at(DEFAULT_SSE_EVENT, data, Utc::now())
    }

    fn event(data: &str) -> ProgressEvent {
        match decode(data) {
            Decoded::Event(e) => e,
            Decoded::Ignored(r) => panic!("expected event, got ignored: {}", r),
        }
    }

    #[test]
    fn test_current_schema_init() {
        assert_eq!(
            event(r#"{"type":"run_init","totalSlots":3,"runNumber":7}"#),
            ProgressEvent::RunInitializing {
                total_slots: 3,
                run_number: 7
            }
        );
    }

    #[test]
    fn test_legacy_schema_init() {
        assert_eq!(
            event(r#"{"type":"progress_init","total":2}"#),
            ProgressEvent::RunInitializing {
                total_slots: 2,
                run_number: 0
            }
        );
    }

    #[test]
    fn test_zero_slots_rejected() {
        let decoded = decode(r#"{"type":"run_init","totalSlots":0}"#);
        assert!(matches!(decoded, Decoded::Ignored(IgnoreReason::InvalidValue { .. })));
    }

    #[test]
    fn test_oversized_slot_count_rejected() {
        use crate::progress::MAX_SLOTS;

        let decoded = decode(r#"{"type":"run_init","totalSlots":100000000000000000}"#);
        assert!(matches!(decoded, Decoded::Ignored(IgnoreReason::InvalidValue { .. })));

        let decoded = decode(&format!(r#"{{"type":"progress_init","total":{}}}"#, MAX_SLOTS + 1));
        assert!(matches!(decoded, Decoded::Ignored(IgnoreReason::InvalidValue { .. })));

        assert_eq!(
            event(&format!(r#"{{"type":"run_init","totalSlots":{}}}"#, MAX_SLOTS)),
            ProgressEvent::RunInitializing {
                total_slots: MAX_SLOTS,
                run_number: 0
            }
        );
    }

    #[test]
    fn test_slot_started_metadata() {
        assert_eq!(
            event(r#"{"type":"slot_started","slotIndex":1,"difficulty":"hard","topic":"graphs","language":"rust"}"#),
            ProgressEvent::SlotStarted {
                index: 1,
                difficulty: Some("hard".to_string()),
                topic: Some("graphs".to_string()),
                language: Some("rust".to_string()),
            }
        );
    }

    #[test]
    fn test_legacy_index_field() {
        assert_eq!(
            event(r#"{"type":"problem_started","index":4}"#),
            ProgressEvent::SlotStarted {
                index: 4,
                difficulty: None,
                topic: None,
                language: None,
            }
        );
        assert_eq!(
            event(r#"{"type":"attempt_started","index":0,"attempt":2}"#),
            ProgressEvent::AttemptStarted { index: 0, attempt: 2 }
        );
    }

    #[test]
    fn test_legacy_attempt_failed_phases() {
        assert_eq!(
            event(r#"{"type":"attempt_failed","index":1,"attempt":1,"phase":"contract","error":"bad syntax"}"#),
            ProgressEvent::ContractFailed {
                index: 1,
                attempt: Some(1),
                error: "bad syntax".to_string(),
            }
        );
        assert_eq!(
            event(r#"{"type":"attempt_failed","index":1,"phase":"validate","message":"tests failed"}"#),
            ProgressEvent::VerificationFailed {
                index: 1,
                attempt: None,
                error: "tests failed".to_string(),
            }
        );
    }

    #[test]
    fn test_docker_events() {
        assert_eq!(
            event(r#"{"type":"slot_docker_started","slotIndex":2,"attempt":1}"#),
            ProgressEvent::VerificationStarted {
                index: 2,
                attempt: Some(1)
            }
        );
        assert_eq!(
            event(r#"{"type":"validation_started","index":2}"#),
            ProgressEvent::VerificationStarted { index: 2, attempt: None }
        );
    }

    #[test]
    fn test_run_failed_both_schemas() {
        assert_eq!(
            event(r#"{"type":"run_failed","error":"timeout"}"#),
            ProgressEvent::RunFailed {
                index: None,
                error: "timeout".to_string()
            }
        );
        assert_eq!(
            event(r#"{"type":"error","index":1,"message":"sandbox down"}"#),
            ProgressEvent::RunFailed {
                index: Some(1),
                error: "sandbox down".to_string()
            }
        );
    }

    #[test]
    fn test_heartbeat_timestamps() {
        let received = DateTime::from_timestamp_millis(1_000).unwrap();

        let decoded = decode_message_at(DEFAULT_SSE_EVENT, r#"{"type":"heartbeat","ts":1700000000000}"#, received);
        assert_eq!(
            decoded,
            Decoded::Event(ProgressEvent::Heartbeat {
                timestamp: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
            })
        );

        let decoded = decode_message_at(DEFAULT_SSE_EVENT, r#"{"type":"ping"}"#, received);
        assert_eq!(decoded, Decoded::Event(ProgressEvent::Heartbeat { timestamp: received }));

        let decoded = decode_message_at(
            DEFAULT_SSE_EVENT,
            r#"{"type":"heartbeat","ts":"2024-05-01T12:00:00Z"}"#,
            received,
        );
        match decoded {
            Decoded::Event(ProgressEvent::Heartbeat { timestamp }) => {
                assert_eq!(timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
            }
            other => panic!("expected heartbeat, got {:?}", other),
        }

        let decoded = decode_message_at(DEFAULT_SSE_EVENT, r#"{"type":"heartbeat","ts":"yesterday"}"#, received);
        assert!(matches!(decoded, Decoded::Ignored(IgnoreReason::InvalidValue { .. })));
    }

    #[test]
    fn test_unknown_type_ignored() {
        let decoded = decode(r#"{"type":"slot_unknown_future_type","slotIndex":0}"#);
        assert_eq!(
            decoded,
            Decoded::Ignored(IgnoreReason::UnknownType("slot_unknown_future_type".to_string()))
        );
    }

    #[test]
    fn test_malformed_known_type() {
        let decoded = decode(r#"{"type":"slot_done","slotIndex":"two"}"#);
        match decoded {
            Decoded::Ignored(IgnoreReason::Malformed { event_type, .. }) => assert_eq!(event_type, "slot_done"),
            other => panic!("expected malformed, got {:?}", other),
        }

        let decoded = decode(r#"{"type":"slot_done","slotIndex":-1}"#);
        assert!(matches!(decoded, Decoded::Ignored(IgnoreReason::Malformed { .. })));
    }

    #[test]
    fn test_not_json_and_missing_type() {
        assert!(matches!(decode("not json"), Decoded::Ignored(IgnoreReason::NotJson(_))));
        assert!(matches!(decode("[1,2]"), Decoded::Ignored(IgnoreReason::NotJson(_))));
        assert_eq!(decode(r#"{"slotIndex":0}"#), Decoded::Ignored(IgnoreReason::MissingType));
    }

    #[test]
    fn test_sse_event_name_as_discriminant() {
        let decoded = decode_message_at("slot_done", r#"{"slotIndex":1}"#, Utc::now());
        assert_eq!(decoded, Decoded::Event(ProgressEvent::SlotCompleted { index: 1 }));

        // An explicit type wins over the SSE name
        let decoded = decode_message_at("slot_done", r#"{"type":"slot_failed","slotIndex":1}"#, Utc::now());
        assert_eq!(decoded, Decoded::Event(ProgressEvent::SlotFailed { index: 1 }));
    }

    #[test]
    fn test_ignore_reason_kinds() {
        assert_eq!(IgnoreReason::MissingType.kind(), "missing_type");
        assert_eq!(
            IgnoreReason::IndexOutOfRange {
                index: 5,
                total_slots: 2
            }
            .to_string(),
            "slot index 5 outside run of 2 slots"
        );
    }
}
