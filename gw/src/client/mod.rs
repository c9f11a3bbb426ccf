//! Generation backend client
//!
//! Starts generation for a session and opens its SSE progress stream.

mod api;
mod error;
mod http;

use std::sync::Arc;

use tracing::debug;

pub use api::{GenerationApi, GenerationStarted};
pub use error::ClientError;
pub use http::{HttpGenerationClient, validate_session_id};

#[cfg(test)]
pub use api::mock;

use crate::config::Config;

/// Create the backend client from configuration
pub fn create_client(config: &Config) -> Result<Arc<dyn GenerationApi>, ClientError> {
    debug!(base_url = %config.server.base_url, "create_client: called");
    Ok(Arc::new(HttpGenerationClient::from_config(config)?))
}
