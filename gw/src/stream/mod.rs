//! Progress stream plumbing
//!
//! ```text
//! SseStream (reqwest-eventsource) ──► ProgressSubscription ──► ProgressTracker
//!                                        ▲ owned by
//!                                   ProgressWatcher (one at a time)
//! ```

mod error;
mod sse;
mod subscription;
mod watcher;

pub use error::StreamError;
pub use sse::{MessageStream, SseStream, StreamEvent, StreamMessage};
pub use subscription::{ProgressSubscription, StreamUpdate};
pub use watcher::ProgressWatcher;
