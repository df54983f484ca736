//! Fan-out client: a single multiplexed WebSocket connection with resumable
//! per-stream subscriptions.
//!
//! ```text
//! let client = FanoutClient::builder()
//!     .server_ws_url("ws://localhost:4310/v1/stream")
//!     .build()?;
//! let handle = client.spawn(shutdown_token);
//! let mut events = handle.subscribe("run:r1").await;
//! while let Some(ev) = events.recv().await { ... }
//! ```
//!
//! On reconnect the client resends `subscribe{stream_id, after_seq}` for
//! every live subscription using its `last_seen_seq`, so a consumer sees
//! each stream's seqs exactly once in increasing order across an arbitrary
//! number of disconnect/reconnect cycles.

pub mod builder;
pub mod client;
pub mod reconnect;
pub mod registry;
pub mod types;

pub use builder::FanoutClientBuilder;
pub use client::{FanoutClient, FanoutHandle};
pub use reconnect::ReconnectBackoff;
pub use types::{FanoutClientError, SubscriptionEvent};
