//! Generation client error types

use thiserror::Error;

use crate::stream::StreamError;

/// Errors from starting a generation or opening its stream
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid session id '{0}'")]
    InvalidSession(String),

    #[error("API error {status}{}: {message}", code_suffix(.code))]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
}

impl ClientError {
    /// Backend error code, when the error body carried one
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Api { status, .. } => *status >= 500,
            ClientError::Network(_) => true,
            ClientError::Stream(e) => e.is_retryable(),
            ClientError::InvalidSession(_) => false,
            ClientError::InvalidResponse(_) => false,
        }
    }
}
