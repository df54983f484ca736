//! Event-stream primitives: the open-world event a caller appends, and the
//! stored record the event store hands back once it has assigned a seq.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An event appended to a stream. `kind` is an open string — the store
/// never closes the enumeration — and `payload` is opaque JSON interpreted
/// only by the accumulator reducer and any per-kind schema registry a host
/// chooses to layer on top.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamEvent {
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl StreamEvent {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// An event after the store has assigned it a place in the stream.
///
/// Invariants enforced by every `EventStore` implementation: `seq` values
/// for a given `stream_id` are strictly increasing, contiguous from 1, and
/// never recycled or mutated once assigned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub stream_id: String,
    pub event: StreamEvent,
}

/// Parameters for `EventStore::replay`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayQuery {
    pub after_seq: u64,
    pub limit: Option<usize>,
}

impl ReplayQuery {
    pub fn from_seq(after_seq: u64) -> Self {
        Self {
            after_seq,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
