//! Progress events as they arrive from the backend
//!
//! ```text
//!   SSE message (event name + JSON data)
//!          │
//!          ├──► recorder (optional raw JSONL capture)
//!          ▼
//!   wire::decode_message ── unknown / malformed ──► Decoded::Ignored(reason)
//!          │
//!          ▼
//!   ProgressEvent (one canonical vocabulary) ──► progress::reducer
//! ```
//!
//! See [`wire`] for the two naming schemes the backend has used.

mod recorder;
mod types;
pub mod wire;

pub use recorder::{RecordedMessage, Recorder, default_recording_path, read_recording};
pub use types::{FailurePhase, ProgressEvent};
pub use wire::{DEFAULT_SSE_EVENT, Decoded, IgnoreReason, decode_message, decode_message_at};
