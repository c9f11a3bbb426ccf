//! GenerationApi trait definition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ClientError;
use crate::stream::MessageStream;

/// Acknowledgement of a start request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStarted {
    /// Backend id for the run, when the backend returns one
    pub generation_id: Option<String>,
}

/// The two backend calls the client makes
///
/// The backend owns every decision about the run; this trait only starts it
/// and opens the event stream that reports on it.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    /// Ask the backend to start generating for a session
    async fn start_generation(&self, session_id: &str) -> Result<GenerationStarted, ClientError>;

    /// Open the progress stream for a session
    ///
    /// The connection is made when the returned stream is first polled.
    fn open_stream(&self, session_id: &str) -> Result<MessageStream, ClientError>;
}
