//! Per-stream broadcast registry.
//!
//! Each `stream_id` gets its own `tokio::sync::broadcast` channel sized to
//! `max_buffer_size`. That channel IS the bounded replay/live buffer a
//! subscription reads from while `REPLAYING`: events published while a
//! subscriber isn't polling its receiver simply accumulate in the channel's
//! ring, and a subscriber that falls behind by more than the capacity gets
//! `RecvError::Lagged` on its next `recv` — the overflow signal.

use std::collections::HashMap;

use parking_lot::Mutex;
use sa_domain::StoredEvent;
use tokio::sync::broadcast;

pub struct Broadcaster {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<StoredEvent>>>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn channel(&self, stream_id: &str) -> broadcast::Sender<StoredEvent> {
        let mut channels = self.channels.lock();
        channels
            .entry(stream_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Called by the write path after a successful append. A no-op if
    /// nobody is currently subscribed to `stream_id` (the broadcast sender
    /// is still created lazily so a subscriber arriving later gets one).
    pub fn publish(&self, stream_id: &str, events: &[StoredEvent]) {
        if events.is_empty() {
            return;
        }
        let tx = self.channel(stream_id);
        for event in events {
            // Err means no receivers are currently attached; that's fine,
            // there's nothing live to deliver to.
            let _ = tx.send(event.clone());
        }
    }

    pub fn subscribe(&self, stream_id: &str) -> broadcast::Receiver<StoredEvent> {
        self.channel(stream_id).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sa_domain::StreamEvent;

    fn event(seq: u64) -> StoredEvent {
        StoredEvent {
            seq,
            timestamp: Utc::now(),
            stream_id: "run:r1".into(),
            event: StreamEvent::new("text-delta", serde_json::json!({})),
        }
    }

    #[tokio::test]
    async fn subscriber_sees_events_published_after_it_subscribes() {
        let bus = Broadcaster::new(8);
        let mut rx = bus.subscribe("run:r1");
        bus.publish("run:r1", &[event(1), event(2)]);
        assert_eq!(rx.recv().await.unwrap().seq, 1);
        assert_eq!(rx.recv().await.unwrap().seq, 2);
    }

    #[tokio::test]
    async fn independent_streams_do_not_cross_deliver() {
        let bus = Broadcaster::new(8);
        let mut rx_a = bus.subscribe("a");
        let mut rx_b = bus.subscribe("b");
        bus.publish("a", &[event(1)]);
        assert_eq!(rx_a.recv().await.unwrap().seq, 1);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn falling_behind_past_capacity_reports_lagged() {
        let bus = Broadcaster::new(2);
        let mut rx = bus.subscribe("run:r1");
        bus.publish("run:r1", &[event(1), event(2), event(3), event(4)]);
        let err = rx.recv().await.unwrap_err();
        assert!(matches!(err, broadcast::error::RecvError::Lagged(_)));
    }
}
