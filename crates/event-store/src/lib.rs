//! Append-only per-stream event storage.
//!
//! Two backends share the [`EventStore`] trait: an in-memory store for tests
//! and single-process deployments, and a SQLite-backed store for durable
//! deployments. Both guarantee a stream's `seq` values are strictly
//! increasing, contiguous from 1, and never mutated once assigned.

mod memory;
mod sqlite;

pub use memory::InMemoryEventStore;
pub use sqlite::SqliteEventStore;

use sa_domain::{ReplayQuery, Result, StoredEvent, StreamEvent};

pub trait EventStore: Send + Sync {
    /// Assigns `seq = head+1 ..= head+N` to `events`, stamping one
    /// `timestamp` across the batch. An empty batch is a no-op returning
    /// `[]`. Concurrent appends on the same stream never interleave.
    fn append(&self, stream_id: &str, events: Vec<StreamEvent>) -> Result<Vec<StoredEvent>>;

    /// Events with `seq > query.after_seq`, ascending, up to `query.limit`
    /// if given. Unknown stream returns `[]`; `limit = Some(0)` returns `[]`.
    fn replay(&self, stream_id: &str, query: ReplayQuery) -> Result<Vec<StoredEvent>>;

    /// Last assigned seq for `stream_id`, or 0 if unknown.
    fn head(&self, stream_id: &str) -> Result<u64>;

    /// Removes all events for `stream_id`. Unknown stream is a no-op.
    fn delete(&self, stream_id: &str) -> Result<()>;
}

#[cfg(test)]
mod contract_tests {
    use super::*;
    use sa_domain::StreamEvent;

    fn exercise(store: &dyn EventStore) {
        assert_eq!(store.head("s1").unwrap(), 0);
        assert_eq!(store.replay("s1", ReplayQuery::default()).unwrap(), vec![]);

        let appended = store
            .append(
                "s1",
                vec![
                    StreamEvent::new("a", serde_json::json!(1)),
                    StreamEvent::new("b", serde_json::json!(2)),
                ],
            )
            .unwrap();
        assert_eq!(appended.len(), 2);
        assert_eq!(appended[0].seq, 1);
        assert_eq!(appended[1].seq, 2);
        assert_eq!(appended[0].timestamp, appended[1].timestamp);

        assert_eq!(store.head("s1").unwrap(), 2);

        let empty = store.append("s1", vec![]).unwrap();
        assert_eq!(empty, vec![]);
        assert_eq!(store.head("s1").unwrap(), 2);

        store
            .append("s1", vec![StreamEvent::new("c", serde_json::json!(3))])
            .unwrap();
        let replayed = store.replay("s1", ReplayQuery::from_seq(1)).unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].seq, 2);
        assert_eq!(replayed[1].seq, 3);

        let limited = store
            .replay("s1", ReplayQuery::from_seq(0).with_limit(1))
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].seq, 1);

        let zero_limit = store
            .replay("s1", ReplayQuery::from_seq(0).with_limit(0))
            .unwrap();
        assert_eq!(zero_limit, vec![]);

        store.delete("s1").unwrap();
        assert_eq!(store.head("s1").unwrap(), 0);
        assert_eq!(store.replay("s1", ReplayQuery::default()).unwrap(), vec![]);
        store.delete("s1").unwrap(); // no-op on unknown stream
    }

    #[test]
    fn memory_backend_satisfies_contract() {
        exercise(&InMemoryEventStore::new());
    }

    #[test]
    fn sqlite_backend_satisfies_contract() {
        exercise(&SqliteEventStore::open_in_memory().unwrap());
    }

    #[test]
    fn streams_are_independent() {
        let store = InMemoryEventStore::new();
        store
            .append("a", vec![StreamEvent::new("x", serde_json::json!(null))])
            .unwrap();
        store
            .append("b", vec![StreamEvent::new("y", serde_json::json!(null))])
            .unwrap();
        assert_eq!(store.head("a").unwrap(), 1);
        assert_eq!(store.head("b").unwrap(), 1);
        store.delete("a").unwrap();
        assert_eq!(store.head("a").unwrap(), 0);
        assert_eq!(store.head("b").unwrap(), 1);
    }
}
