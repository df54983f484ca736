//! In-memory backend: one mutex per stream behind a sharded map, following
//! the per-resource-lock discipline the run index uses for its registry.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use sa_domain::{ReplayQuery, Result, StoredEvent, StreamEvent};

use crate::EventStore;

#[derive(Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<String, Mutex<Vec<StoredEvent>>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures a per-stream mutex exists, then runs `f` against it while
    /// holding only that stream's lock — other streams stay unblocked.
    fn with_stream<T>(&self, stream_id: &str, f: impl FnOnce(&mut Vec<StoredEvent>) -> T) -> T {
        if !self.streams.read().contains_key(stream_id) {
            self.streams
                .write()
                .entry(stream_id.to_string())
                .or_insert_with(|| Mutex::new(Vec::new()));
        }
        let streams = self.streams.read();
        let log = streams.get(stream_id).expect("just inserted");
        f(&mut log.lock())
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&self, stream_id: &str, events: Vec<StreamEvent>) -> Result<Vec<StoredEvent>> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        Ok(self.with_stream(stream_id, |log| {
            let mut head = log.last().map(|e| e.seq).unwrap_or(0);
            let timestamp = Utc::now();
            let mut stored = Vec::with_capacity(events.len());
            for event in events {
                head += 1;
                let entry = StoredEvent {
                    seq: head,
                    timestamp,
                    stream_id: stream_id.to_string(),
                    event,
                };
                log.push(entry.clone());
                stored.push(entry);
            }
            stored
        }))
    }

    fn replay(&self, stream_id: &str, query: ReplayQuery) -> Result<Vec<StoredEvent>> {
        if query.limit == Some(0) {
            return Ok(vec![]);
        }
        let streams = self.streams.read();
        let Some(log) = streams.get(stream_id) else {
            return Ok(vec![]);
        };
        let log = log.lock();
        let mut out: Vec<StoredEvent> = log
            .iter()
            .filter(|e| e.seq > query.after_seq)
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    fn head(&self, stream_id: &str) -> Result<u64> {
        let streams = self.streams.read();
        Ok(streams
            .get(stream_id)
            .map(|log| log.lock().last().map(|e| e.seq).unwrap_or(0))
            .unwrap_or(0))
    }

    fn delete(&self, stream_id: &str) -> Result<()> {
        self.streams.write().remove(stream_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_appends_on_same_stream_do_not_interleave() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryEventStore::new());
        let mut handles = vec![];
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                store
                    .append("s1", vec![StreamEvent::new("x", serde_json::json!(null))])
                    .unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.head("s1").unwrap(), 8);
        let all = store.replay("s1", ReplayQuery::default()).unwrap();
        let seqs: Vec<u64> = all.iter().map(|e| e.seq).collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted);
        assert_eq!(seqs, (1..=8).collect::<Vec<_>>());
    }
}
