//! SSE transport adapter
//!
//! Wraps a `reqwest_eventsource::EventSource` as a plain stream of raw
//! messages and connection-open markers. The event source is closed when
//! the adapter is dropped, so releasing the stream handle is enough to stop
//! reconnects.

use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use futures::Stream;
use reqwest::RequestBuilder;
use reqwest_eventsource::retry::ExponentialBackoff;
use reqwest_eventsource::{Error as SseError, Event, EventSource};
use tracing::{debug, warn};

use super::error::StreamError;
use crate::config::StreamConfig;

/// One raw SSE message, before decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    /// SSE `event:` field (`message` when the server sets none)
    pub event: String,
    /// SSE `data:` payload
    pub data: String,
    /// SSE `id:` field
    pub id: String,
}

impl StreamMessage {
    /// A default-named message carrying `data`
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event: crate::events::DEFAULT_SSE_EVENT.to_string(),
            data: data.into(),
            id: String::new(),
        }
    }
}

/// What the transport yields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A connection was established, including after a reconnect
    Opened,
    Message(StreamMessage),
}

/// Boxed stream of transport events; anything that yields these can feed a subscription
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, StreamError>> + Send>>;

/// EventSource adapter that closes its connection on drop
pub struct SseStream {
    source: EventSource,
    done: bool,
}

impl SseStream {
    /// Open an SSE connection for `request` with the configured reconnect policy
    pub fn open(request: RequestBuilder, config: &StreamConfig) -> Result<Self, StreamError> {
        debug!(?config, "SseStream::open: called");
        let mut source = EventSource::new(request).map_err(|e| StreamError::Open(e.to_string()))?;
        source.set_retry_policy(Box::new(ExponentialBackoff::new(
            config.retry_start(),
            config.retry_factor,
            Some(Duration::from_millis(config.stall_timeout_ms.max(config.retry_start_ms))),
            Some(config.max_retries),
        )));
        Ok(Self { source, done: false })
    }

    /// Stop the connection and any pending reconnect
    pub fn close(&mut self) {
        if !self.done {
            debug!("SseStream::close: closing event source");
            self.source.close();
            self.done = true;
        }
    }

    /// Box into a [`MessageStream`]
    pub fn boxed(self) -> MessageStream {
        Box::pin(self)
    }
}

impl Stream for SseStream {
    type Item = Result<StreamEvent, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.done {
                return Poll::Ready(None);
            }

            match ready!(Pin::new(&mut self.source).poll_next(cx)) {
                None => {
                    debug!("SseStream: event source exhausted");
                    self.done = true;
                    return Poll::Ready(None);
                }
                Some(Ok(Event::Open)) => {
                    debug!("SseStream: connection open");
                    return Poll::Ready(Some(Ok(StreamEvent::Opened)));
                }
                Some(Ok(Event::Message(msg))) => {
                    return Poll::Ready(Some(Ok(StreamEvent::Message(StreamMessage {
                        event: msg.event,
                        data: msg.data,
                        id: msg.id,
                    }))));
                }
                Some(Err(SseError::StreamEnded)) => {
                    debug!("SseStream: server ended the stream");
                    self.close();
                    return Poll::Ready(None);
                }
                Some(Err(SseError::InvalidStatusCode(status, _))) => {
                    warn!(%status, "SseStream: server rejected stream");
                    self.close();
                    return Poll::Ready(Some(Err(StreamError::Status {
                        status: status.as_u16(),
                    })));
                }
                Some(Err(SseError::InvalidContentType(content_type, _))) => {
                    let content_type = content_type.to_str().unwrap_or("<binary>").to_string();
                    warn!(%content_type, "SseStream: wrong content type");
                    self.close();
                    return Poll::Ready(Some(Err(StreamError::ContentType(content_type))));
                }
                Some(Err(e)) => {
                    // The event source reconnects on the next poll, per its retry policy
                    warn!(error = %e, "SseStream: transport error");
                    return Poll::Ready(Some(Err(StreamError::Transport(e.to_string()))));
                }
            }
        }
    }
}

impl Drop for SseStream {
    fn drop(&mut self) {
        self.close();
    }
}
