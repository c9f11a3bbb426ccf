//! Progress stream error types

use thiserror::Error;

/// Errors from a progress stream connection
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("Could not open stream: {0}")]
    Open(String),

    #[error("Stream rejected with status {status}")]
    Status { status: u16 },

    #[error("Unexpected content type '{0}', expected text/event-stream")]
    ContentType(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl StreamError {
    /// Whether the SSE layer will reconnect after this error
    ///
    /// Transport failures are retried with backoff; a server that answers
    /// with the wrong status or content type is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::Transport(_) => true,
            StreamError::Open(_) | StreamError::Status { .. } | StreamError::ContentType(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(StreamError::Transport("connection reset".to_string()).is_retryable());
        assert!(!StreamError::Status { status: 404 }.is_retryable());
        assert!(!StreamError::ContentType("text/html".to_string()).is_retryable());
        assert!(!StreamError::Open("bad request".to_string()).is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            StreamError::Status { status: 503 }.to_string(),
            "Stream rejected with status 503"
        );
    }
}
