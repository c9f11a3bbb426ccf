//! HTTP implementation of GenerationApi

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderValue};
use serde::Deserialize;
use tracing::{debug, info};

use super::{ClientError, GenerationApi, GenerationStarted};
use crate::config::{Config, ServerConfig, StreamConfig};
use crate::stream::{MessageStream, SseStream};

/// Talks to the generation backend over HTTP + SSE
#[derive(Debug, Clone)]
pub struct HttpGenerationClient {
    http: Client,
    server: ServerConfig,
    stream: StreamConfig,
}

/// Success body of the start request; field naming varies by backend version
#[derive(Debug, Default, Deserialize)]
struct StartBody {
    #[serde(rename = "generationId", alias = "generation_id")]
    generation_id: Option<String>,
    /// Older backends only send `id`
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

/// Error body: `{"error": {...}}` or `{"detail": "..."}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
    detail: Option<serde_json::Value>,
}

impl HttpGenerationClient {
    /// Create a client from configuration
    ///
    /// No client-wide timeout is set: it would also cut off the long-lived
    /// progress stream. The start request gets its own timeout.
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        debug!(base_url = %config.server.base_url, "HttpGenerationClient::from_config: called");
        let http = Client::builder().build().map_err(ClientError::Network)?;

        Ok(Self {
            http,
            server: config.server.clone(),
            stream: config.stream.clone(),
        })
    }
}

/// Session ids are substituted into URL paths, so only a safe charset is accepted
pub fn validate_session_id(session_id: &str) -> Result<(), ClientError> {
    let valid = !session_id.is_empty()
        && session_id != "."
        && session_id != ".."
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ClientError::InvalidSession(session_id.to_string()))
    }
}

/// Parse a start response body; an empty body is a success without an id
fn parse_start_body(text: &str) -> Result<GenerationStarted, ClientError> {
    if text.trim().is_empty() {
        return Ok(GenerationStarted::default());
    }
    let body: StartBody = serde_json::from_str(text)
        .map_err(|e| ClientError::InvalidResponse(format!("start response is not valid JSON: {}", e)))?;
    Ok(GenerationStarted {
        generation_id: body.generation_id.or(body.id),
    })
}

/// Map a non-success response to `ClientError::Api`
fn parse_error_body(status: u16, text: &str) -> ClientError {
    let parsed = serde_json::from_str::<ErrorBody>(text).ok();

    let (code, message) = match parsed {
        Some(ErrorBody {
            error: Some(detail), ..
        }) => (detail.code, detail.message),
        Some(ErrorBody {
            detail: Some(serde_json::Value::String(s)),
            ..
        }) => (None, Some(s)),
        Some(ErrorBody { detail: Some(v), .. }) => (None, Some(v.to_string())),
        _ => (None, None),
    };

    let message = message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| match text.trim() {
            "" => format!("HTTP {}", status),
            raw => raw.to_string(),
        });

    ClientError::Api { status, code, message }
}

#[async_trait]
impl GenerationApi for HttpGenerationClient {
    async fn start_generation(&self, session_id: &str) -> Result<GenerationStarted, ClientError> {
        debug!(%session_id, "start_generation: called");
        validate_session_id(session_id)?;

        let url = self.server.start_url(session_id);
        let response = self
            .http
            .post(&url)
            .timeout(self.server.timeout())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;

        if !(200..300).contains(&status) {
            debug!(%status, "start_generation: API error");
            return Err(parse_error_body(status, &text));
        }

        let started = parse_start_body(&text)?;
        info!(%session_id, generation_id = ?started.generation_id, "Generation started");
        Ok(started)
    }

    fn open_stream(&self, session_id: &str) -> Result<MessageStream, ClientError> {
        debug!(%session_id, "open_stream: called");
        validate_session_id(session_id)?;

        let url = self.server.stream_url(session_id);
        let request = self.http.get(&url);
        let stream = SseStream::open(request, &self.stream)?;
        info!(%session_id, %url, "Opened progress stream");
        Ok(stream.boxed())
    }
}
