//! Real-time fan-out: an axum WebSocket endpoint that replays a stream's
//! history then hands a subscriber off to live broadcasts from the write
//! path, with per-connection heartbeat and per-subscription backpressure.

mod broadcast;
mod connection;
mod router;
mod state;

pub mod config;

pub use config::FanoutConfig;
pub use router::router;
pub use state::FanoutState;
