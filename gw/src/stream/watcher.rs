//! ProgressWatcher - holds at most one active subscription
//!
//! Starting a generation or attaching to a stream always closes the previous
//! subscription first, so events from two runs never land in one projection.

use std::sync::Arc;

use tracing::{debug, info};

use super::subscription::ProgressSubscription;
use crate::client::{ClientError, GenerationApi};
use crate::config::StreamConfig;

pub struct ProgressWatcher {
    api: Arc<dyn GenerationApi>,
    config: StreamConfig,
    active: Option<ProgressSubscription>,
}

impl ProgressWatcher {
    pub fn new(api: Arc<dyn GenerationApi>, config: StreamConfig) -> Self {
        debug!(?config, "ProgressWatcher::new: called");
        Self {
            api,
            config,
            active: None,
        }
    }

    /// Start a generation and subscribe to its progress
    ///
    /// The stream is opened before the start request is sent. If the start
    /// request fails the new stream is closed and no subscription is left
    /// active.
    pub async fn start(&mut self, session_id: &str) -> Result<&mut ProgressSubscription, ClientError> {
        debug!(%session_id, "ProgressWatcher::start: called");
        self.close();

        let mut subscription = self.subscribe(session_id)?;
        match self.api.start_generation(session_id).await {
            Ok(started) => {
                subscription.set_generation_id(started.generation_id);
                Ok(self.active.insert(subscription))
            }
            Err(e) => {
                debug!(%session_id, error = %e, "ProgressWatcher::start: start request failed");
                subscription.close();
                Err(e)
            }
        }
    }

    /// Subscribe to an already running generation
    pub fn attach(&mut self, session_id: &str) -> Result<&mut ProgressSubscription, ClientError> {
        debug!(%session_id, "ProgressWatcher::attach: called");
        self.close();

        let subscription = self.subscribe(session_id)?;
        Ok(self.active.insert(subscription))
    }

    pub fn active(&self) -> Option<&ProgressSubscription> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut ProgressSubscription> {
        self.active.as_mut()
    }

    /// Close and release the active subscription, if any
    pub fn close(&mut self) {
        if let Some(mut previous) = self.active.take() {
            info!(session_id = %previous.session_id(), "Closing previous progress subscription");
            previous.close();
        }
    }

    fn subscribe(&self, session_id: &str) -> Result<ProgressSubscription, ClientError> {
        let messages = self.api.open_stream(session_id)?;
        Ok(ProgressSubscription::new(
            session_id,
            messages,
            self.config.stall_timeout(),
        ))
    }
}

impl Drop for ProgressWatcher {
    fn drop(&mut self) {
        self.close();
    }
}
