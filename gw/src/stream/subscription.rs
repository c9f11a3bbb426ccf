//! ProgressSubscription - one owned progress stream and its projection

use std::time::Duration;

use futures::StreamExt;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use super::error::StreamError;
use super::sse::{MessageStream, StreamEvent};
use crate::events::{RecordedMessage, Recorder};
use crate::progress::{Effect, GenerationRun, ProgressTracker, TrackerStats};

/// What a call to [`ProgressSubscription::next_update`] observed
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    /// A message arrived and was folded (or dropped) by the tracker
    Progress { effect: Effect },
    /// Nothing arrived for a full stall window; advisory only
    Stalled { silent_for: Duration },
    /// The connection dropped and the SSE layer is reconnecting
    Reconnecting { error: StreamError },
    /// A new connection opened after a drop
    Reconnected,
}

/// Owns one progress stream
///
/// Dropping the subscription drops the stream, which closes the connection.
pub struct ProgressSubscription {
    session_id: String,
    generation_id: Option<String>,
    messages: Option<MessageStream>,
    tracker: ProgressTracker,
    recorder: Option<Recorder>,
    stall_timeout: Duration,
    last_event: Instant,
    window_start: Instant,
    pending_error: Option<StreamError>,
}

impl std::fmt::Debug for ProgressSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSubscription")
            .field("session_id", &self.session_id)
            .field("generation_id", &self.generation_id)
            .field("closed", &self.is_closed())
            .field("stats", self.tracker.stats())
            .finish()
    }
}

impl ProgressSubscription {
    pub fn new(session_id: impl Into<String>, messages: MessageStream, stall_timeout: Duration) -> Self {
        let session_id = session_id.into();
        debug!(%session_id, ?stall_timeout, "ProgressSubscription::new: called");
        let now = Instant::now();
        Self {
            session_id,
            generation_id: None,
            messages: Some(messages),
            tracker: ProgressTracker::new(),
            recorder: None,
            stall_timeout,
            last_event: now,
            window_start: now,
            pending_error: None,
        }
    }

    /// Capture every received message to `recorder`
    pub fn set_recorder(&mut self, recorder: Recorder) {
        debug!(path = %recorder.path().display(), "ProgressSubscription::set_recorder: called");
        self.recorder = Some(recorder);
    }

    pub fn recorder(&self) -> Option<&Recorder> {
        self.recorder.as_ref()
    }

    pub(crate) fn set_generation_id(&mut self, generation_id: Option<String>) {
        self.generation_id = generation_id;
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Backend id of the run this subscription was started for, if known
    pub fn generation_id(&self) -> Option<&str> {
        self.generation_id.as_deref()
    }

    /// Current projection
    pub fn run(&self) -> Option<&GenerationRun> {
        self.tracker.run()
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn stats(&self) -> &TrackerStats {
        self.tracker.stats()
    }

    /// Whether the run has reached a state no further event can advance
    pub fn is_settled(&self) -> bool {
        self.run().is_some_and(GenerationRun::is_finished)
    }

    pub fn is_closed(&self) -> bool {
        self.messages.is_none()
    }

    /// Close the stream; the projection stays readable
    pub fn close(&mut self) {
        if self.messages.take().is_some() {
            info!(session_id = %self.session_id, stats = ?self.tracker.stats(), "Closed progress stream");
        }
    }

    /// Wait for the next message, stall or reconnect notice
    ///
    /// Returns `None` once the stream has ended or been closed. An error is
    /// returned for a rejected stream, or when reconnect attempts run out;
    /// the subscription is closed in both cases.
    pub async fn next_update(&mut self) -> Option<Result<StreamUpdate, StreamError>> {
        loop {
            let messages = self.messages.as_mut()?;
            let deadline = self.window_start + self.stall_timeout;

            let next = match timeout_at(deadline, messages.next()).await {
                Ok(next) => next,
                Err(_) => {
                    let silent_for = self.last_event.elapsed();
                    self.window_start = Instant::now();
                    warn!(session_id = %self.session_id, ?silent_for, "No progress events, stream may be stalled");
                    return Some(Ok(StreamUpdate::Stalled { silent_for }));
                }
            };

            match next {
                None => {
                    debug!(session_id = %self.session_id, "next_update: stream ended");
                    self.close();
                    // Ending right after a transport error means reconnects ran out
                    return self.pending_error.take().map(Err);
                }
                Some(Ok(StreamEvent::Opened)) => {
                    if let Some(error) = self.pending_error.take() {
                        info!(session_id = %self.session_id, %error, "Progress stream reconnected");
                        return Some(Ok(StreamUpdate::Reconnected));
                    }
                    debug!(session_id = %self.session_id, "next_update: stream open");
                }
                Some(Ok(StreamEvent::Message(message))) => {
                    let now = Instant::now();
                    self.last_event = now;
                    self.window_start = now;
                    self.pending_error = None;

                    if let Some(recorder) = self.recorder.as_mut()
                        && let Err(e) = recorder.record(&RecordedMessage::new(&message.event, &message.data))
                    {
                        warn!(error = %e, "Failed to record progress message");
                    }

                    let effect = self.tracker.handle_message(&message.event, &message.data);
                    return Some(Ok(StreamUpdate::Progress { effect }));
                }
                Some(Err(error)) if error.is_retryable() => {
                    self.window_start = Instant::now();
                    self.pending_error = Some(error.clone());
                    return Some(Ok(StreamUpdate::Reconnecting { error }));
                }
                Some(Err(error)) => {
                    warn!(session_id = %self.session_id, %error, "Progress stream failed");
                    self.close();
                    return Some(Err(error));
                }
            }
        }
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::read_recording;
    use crate::progress::Stage;
    use crate::stream::StreamMessage;
    use tempfile::tempdir;

    fn canned(events: Vec<Result<StreamEvent, StreamError>>) -> MessageStream {
        futures::stream::iter(events).boxed()
    }

    fn data(s: &str) -> Result<StreamEvent, StreamError> {
        Ok(StreamEvent::Message(StreamMessage::data(s)))
    }

    fn opened() -> Result<StreamEvent, StreamError> {
        Ok(StreamEvent::Opened)
    }

    async fn drain(sub: &mut ProgressSubscription) -> Vec<Result<StreamUpdate, StreamError>> {
        let mut updates = Vec::new();
        while let Some(update) = sub.next_update().await {
            updates.push(update);
        }
        updates
    }

    #[tokio::test]
    async fn test_folds_stream_to_completion() {
        let stream = canned(vec![
            data(r#"{"type":"run_init","totalSlots":2,"runNumber":1}"#),
            data(r#"{"type":"slot_done","slotIndex":0}"#),
            data(r#"{"type":"slot_failed","slotIndex":1}"#),
        ]);
        let mut sub = ProgressSubscription::new("s1", stream, Duration::from_secs(5));

        let updates = drain(&mut sub).await;
        assert_eq!(updates.len(), 3);
        assert!(sub.is_closed());
        assert!(sub.is_settled());

        let run = sub.run().unwrap();
        assert_eq!(run.slot(0).unwrap().stage, Stage::Done);
        assert_eq!(run.slot(1).unwrap().stage, Stage::Failed);
        assert_eq!(sub.stats().applied, 3);
    }

    #[tokio::test]
    async fn test_transport_error_then_recovery() {
        let stream = canned(vec![
            data(r#"{"type":"run_init","totalSlots":1}"#),
            Err(StreamError::Transport("connection reset".to_string())),
            // Replay after reconnect
            data(r#"{"type":"run_init","totalSlots":1}"#),
            data(r#"{"type":"slot_done","slotIndex":0}"#),
        ]);
        let mut sub = ProgressSubscription::new("s1", stream, Duration::from_secs(5));

        let updates = drain(&mut sub).await;
        assert_eq!(updates.len(), 4);
        assert!(matches!(updates[1], Ok(StreamUpdate::Reconnecting { .. })));
        assert!(updates.iter().all(|u| u.is_ok()));
        assert_eq!(sub.run().unwrap().slot(0).unwrap().stage, Stage::Done);
    }

    #[tokio::test]
    async fn test_reconnect_before_any_message_is_not_an_error() {
        let stream = canned(vec![
            opened(),
            Err(StreamError::Transport("error decoding response body".to_string())),
            opened(),
        ]);
        let mut sub = ProgressSubscription::new("s1", stream, Duration::from_secs(5));

        let updates = drain(&mut sub).await;
        assert!(matches!(updates[0], Ok(StreamUpdate::Reconnecting { .. })));
        assert_eq!(updates[1], Ok(StreamUpdate::Reconnected));
        assert_eq!(updates.len(), 2);
        assert!(sub.is_closed());
    }

    #[tokio::test]
    async fn test_first_open_is_silent() {
        let stream = canned(vec![opened(), data(r#"{"type":"run_init","totalSlots":1}"#)]);
        let mut sub = ProgressSubscription::new("s1", stream, Duration::from_secs(5));

        let updates = drain(&mut sub).await;
        assert_eq!(updates.len(), 1);
        assert!(matches!(updates[0], Ok(StreamUpdate::Progress { .. })));
    }

    #[tokio::test]
    async fn test_failed_run_is_settled() {
        let stream = canned(vec![
            data(r#"{"type":"run_init","totalSlots":2}"#),
            data(r#"{"type":"slot_started","slotIndex":0}"#),
            data(r#"{"type":"run_failed","error":"quota exceeded"}"#),
        ]);
        let mut sub = ProgressSubscription::new("s1", stream, Duration::from_secs(5));

        sub.next_update().await;
        assert!(!sub.is_settled());
        drain(&mut sub).await;
        assert!(sub.run().unwrap().is_failed());
        assert!(sub.is_settled());
    }

    #[tokio::test]
    async fn test_retries_exhausted_reports_error() {
        let reset = StreamError::Transport("connection refused".to_string());
        let stream = canned(vec![Err(reset.clone())]);
        let mut sub = ProgressSubscription::new("s1", stream, Duration::from_secs(5));

        assert!(matches!(
            sub.next_update().await,
            Some(Ok(StreamUpdate::Reconnecting { .. }))
        ));
        assert_eq!(sub.next_update().await, Some(Err(reset)));
        assert!(sub.next_update().await.is_none());
    }

    #[tokio::test]
    async fn test_rejected_stream_closes() {
        let stream = canned(vec![
            Err(StreamError::Status { status: 404 }),
            data(r#"{"type":"run_init","totalSlots":1}"#),
        ]);
        let mut sub = ProgressSubscription::new("s1", stream, Duration::from_secs(5));

        assert_eq!(sub.next_update().await, Some(Err(StreamError::Status { status: 404 })));
        assert!(sub.is_closed());
        assert!(sub.next_update().await.is_none());
        assert!(sub.run().is_none());
    }

    #[tokio::test]
    async fn test_stall_is_advisory() {
        let stream: MessageStream = futures::stream::pending().boxed();
        let mut sub = ProgressSubscription::new("s1", stream, Duration::from_millis(20));

        for _ in 0..2 {
            match sub.next_update().await {
                Some(Ok(StreamUpdate::Stalled { silent_for })) => {
                    assert!(silent_for >= Duration::from_millis(20));
                }
                other => panic!("expected stall, got {other:?}"),
            }
        }
        assert!(!sub.is_closed());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let stream: MessageStream = futures::stream::pending().boxed();
        let mut sub = ProgressSubscription::new("s1", stream, Duration::from_secs(5));
        sub.close();
        sub.close();
        assert!(sub.is_closed());
        assert!(sub.next_update().await.is_none());
    }

    #[tokio::test]
    async fn test_records_raw_messages() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("capture.jsonl");

        let stream = canned(vec![
            data(r#"{"type":"run_init","totalSlots":1}"#),
            data("not json"),
        ]);
        let mut sub = ProgressSubscription::new("s1", stream, Duration::from_secs(5));
        sub.set_recorder(Recorder::create(&path).unwrap());
        drain(&mut sub).await;
        assert_eq!(sub.recorder().unwrap().written(), 2);
        drop(sub);

        let recorded = read_recording(&path).unwrap();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[1].data, "not json");
    }
}
