//! Shared state handed to every WebSocket connection.

use std::sync::Arc;

use sa_domain::StoredEvent;
use sa_event_store::EventStore;

use crate::broadcast::Broadcaster;
use crate::config::FanoutConfig;

#[derive(Clone)]
pub struct FanoutState {
    pub event_store: Arc<dyn EventStore>,
    pub broadcaster: Arc<Broadcaster>,
    pub config: Arc<FanoutConfig>,
}

impl FanoutState {
    pub fn new(event_store: Arc<dyn EventStore>, config: FanoutConfig) -> Self {
        let broadcaster = Arc::new(Broadcaster::new(config.max_buffer_size));
        Self {
            event_store,
            broadcaster,
            config: Arc::new(config),
        }
    }

    /// Entry point for the write path: call after a successful append so
    /// every live subscriber on `stream_id` sees the new events.
    pub fn broadcast(&self, stream_id: &str, events: &[StoredEvent]) {
        self.broadcaster.publish(stream_id, events);
    }
}
