//! Tracks live subscriptions: which streams a caller wants, how far each
//! has been delivered (`last_seen_seq`), and where to forward events.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::types::SubscriptionEvent;

struct Subscription {
    last_seen_seq: u64,
    tx: mpsc::Sender<SubscriptionEvent>,
}

/// Shared, thread-safe table of active subscriptions, keyed by `stream_id`.
///
/// One `FanoutClient` multiplexes every stream a caller has subscribed to
/// over a single WebSocket; this table is how the reader task finds the
/// right outbound channel for an inbound `event`/`replay-end` frame, and how
/// the reconnect path rebuilds `subscribe{stream_id, after_seq}` requests.
#[derive(Default)]
pub struct SubscriptionTable {
    subs: Mutex<HashMap<String, Subscription>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, stream_id: String, after_seq: u64, tx: mpsc::Sender<SubscriptionEvent>) {
        self.subs.lock().unwrap().insert(
            stream_id,
            Subscription {
                last_seen_seq: after_seq,
                tx,
            },
        );
    }

    pub fn remove(&self, stream_id: &str) {
        self.subs.lock().unwrap().remove(stream_id);
    }

    /// Every `(stream_id, last_seen_seq)` pair, for resending `subscribe`
    /// requests after a reconnect.
    pub fn resubscribe_plan(&self) -> Vec<(String, u64)> {
        self.subs
            .lock()
            .unwrap()
            .iter()
            .map(|(id, sub)| (id.clone(), sub.last_seen_seq))
            .collect()
    }

    /// Delivers an event to its subscriber and advances `last_seen_seq`.
    /// Drops the subscription silently if the receiver has gone away.
    pub async fn deliver(&self, stream_id: &str, seq: u64, event: SubscriptionEvent) {
        let tx = {
            let mut subs = self.subs.lock().unwrap();
            let Some(sub) = subs.get_mut(stream_id) else {
                return;
            };
            sub.last_seen_seq = sub.last_seen_seq.max(seq);
            sub.tx.clone()
        };
        if tx.send(event).await.is_err() {
            self.remove(stream_id);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subs.lock().unwrap().is_empty()
    }
}
