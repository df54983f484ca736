//! Tunables for the fan-out endpoint.

use std::time::Duration;

/// Heartbeat and buffering knobs for a fan-out server instance.
#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// How often the server sends `ping` on an established connection.
    pub heartbeat_interval: Duration,
    /// How long the server waits for `pong` before closing the connection.
    pub heartbeat_timeout: Duration,
    /// How long a freshly-opened socket has to send `hello` before it is
    /// dropped silently.
    pub hello_timeout: Duration,
    /// Per-subscription replay/live buffer capacity. A subscriber that falls
    /// this far behind during replay trips `BUFFER_OVERFLOW`.
    pub max_buffer_size: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(10),
            hello_timeout: Duration::from_secs(10),
            max_buffer_size: 256,
        }
    }
}
