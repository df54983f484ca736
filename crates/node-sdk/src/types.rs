//! Core types exposed to subscribers of the fan-out client.

/// One item delivered to a stream subscriber: either a durable event or the
/// marker that ends the replay phase and begins live delivery.
#[derive(Debug, Clone)]
pub enum SubscriptionEvent {
    Event(sa_domain::StoredEvent),
    ReplayEnd { last_replay_seq: u64 },
}

#[derive(thiserror::Error, Debug)]
pub enum FanoutClientError {
    #[error("config: {0}")]
    Config(String),
    #[error("websocket: {0}")]
    WebSocket(String),
    #[error("handshake: {0}")]
    Handshake(String),
    #[error("reconnect exhausted after {0} attempts")]
    ReconnectExhausted(u32),
    #[error("shutdown")]
    Shutdown,
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
