//! Builder pattern for constructing a [`FanoutClient`].

use crate::client::FanoutClient;
use crate::reconnect::ReconnectBackoff;
use crate::types::FanoutClientError;

/// Fluent builder for [`FanoutClient`].
///
/// ```rust,no_run
/// # use sa_fanout_client::FanoutClientBuilder;
/// let client = FanoutClientBuilder::new()
///     .server_ws_url("ws://localhost:4310/v1/stream")
///     .build()
///     .unwrap();
/// ```
pub struct FanoutClientBuilder {
    pub(crate) server_ws_url: String,
    pub(crate) reconnect_backoff: ReconnectBackoff,
}

impl FanoutClientBuilder {
    pub fn new() -> Self {
        Self {
            server_ws_url: "ws://localhost:4310/v1/stream".into(),
            reconnect_backoff: ReconnectBackoff::default(),
        }
    }

    pub fn server_ws_url(mut self, url: impl Into<String>) -> Self {
        self.server_ws_url = url.into();
        self
    }

    pub fn reconnect_backoff(mut self, cfg: ReconnectBackoff) -> Self {
        self.reconnect_backoff = cfg;
        self
    }

    pub fn build(self) -> Result<FanoutClient, FanoutClientError> {
        if self.server_ws_url.is_empty() {
            return Err(FanoutClientError::Config("server_ws_url is required".into()));
        }
        Ok(FanoutClient {
            server_ws_url: self.server_ws_url,
            reconnect_backoff: self.reconnect_backoff,
        })
    }
}

impl Default for FanoutClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
