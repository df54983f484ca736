//! SQLite-backed event store. Appends run inside an immediate-mode write
//! transaction so the head computation and insert are atomic.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use sa_domain::{Error, ReplayQuery, Result, StoredEvent, StreamEvent};

use crate::EventStore;

pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::Structural(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Structural(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS events (
                    stream_id TEXT NOT NULL,
                    seq INTEGER NOT NULL,
                    timestamp TEXT NOT NULL,
                    event_json TEXT NOT NULL,
                    PRIMARY KEY (stream_id, seq)
                );
                "#,
            )
            .map_err(|e| Error::Structural(e.to_string()))
    }
}

impl EventStore for SqliteEventStore {
    fn append(&self, stream_id: &str, events: Vec<StreamEvent>) -> Result<Vec<StoredEvent>> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
            .map_err(|e| Error::Structural(e.to_string()))?;

        let mut head: u64 = tx
            .query_row(
                "SELECT COALESCE(MAX(seq), 0) FROM events WHERE stream_id = ?1",
                [stream_id],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| Error::Structural(e.to_string()))? as u64;

        let timestamp = Utc::now();
        let mut stored = Vec::with_capacity(events.len());
        for event in events {
            head += 1;
            let event_json = serde_json::to_string(&event)?;
            tx.execute(
                "INSERT INTO events (stream_id, seq, timestamp, event_json) VALUES (?1, ?2, ?3, ?4)",
                params![stream_id, head as i64, timestamp.to_rfc3339(), event_json],
            )
            .map_err(|e| Error::Structural(e.to_string()))?;
            stored.push(StoredEvent {
                seq: head,
                timestamp,
                stream_id: stream_id.to_string(),
                event,
            });
        }
        tx.commit().map_err(|e| Error::Structural(e.to_string()))?;
        Ok(stored)
    }

    fn replay(&self, stream_id: &str, query: ReplayQuery) -> Result<Vec<StoredEvent>> {
        if query.limit == Some(0) {
            return Ok(vec![]);
        }
        let conn = self.conn.lock().unwrap();
        let limit = query.limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn
            .prepare(
                "SELECT seq, timestamp, event_json FROM events \
                 WHERE stream_id = ?1 AND seq > ?2 ORDER BY seq ASC LIMIT ?3",
            )
            .map_err(|e| Error::Structural(e.to_string()))?;

        let rows = stmt
            .query_map(
                params![stream_id, query.after_seq as i64, limit],
                |row| {
                    let seq: i64 = row.get(0)?;
                    let timestamp: String = row.get(1)?;
                    let event_json: String = row.get(2)?;
                    Ok((seq as u64, timestamp, event_json))
                },
            )
            .map_err(|e| Error::Structural(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            let (seq, timestamp, event_json) = row.map_err(|e| Error::Structural(e.to_string()))?;
            let timestamp = parse_rfc3339(&timestamp)?;
            let event: StreamEvent = serde_json::from_str(&event_json)?;
            out.push(StoredEvent {
                seq,
                timestamp,
                stream_id: stream_id.to_string(),
                event,
            });
        }
        Ok(out)
    }

    fn head(&self, stream_id: &str) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let head: Option<i64> = conn
            .query_row(
                "SELECT MAX(seq) FROM events WHERE stream_id = ?1",
                [stream_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::Structural(e.to_string()))?;
        Ok(head.unwrap_or(0) as u64)
    }

    fn delete(&self, stream_id: &str) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute("DELETE FROM events WHERE stream_id = ?1", [stream_id])
            .map_err(|e| Error::Structural(e.to_string()))?;
        Ok(())
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| Utc.from_utc_datetime(&dt.naive_utc()))
        .map_err(|e| Error::structural(format!("corrupt timestamp {s:?}: {e}")))
}
