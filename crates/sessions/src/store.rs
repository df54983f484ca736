//! SQLite-backed ledger: run records, canonical messages, and the atomic
//! finalize path.

use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use sa_domain::{
    CanonicalMessage, CanonicalPart, Checkpoints, Error, FinalizeStatus, IdGenerator,
    NoopCheckpoints, RecoverAction, Result, Role, RunRecord, RunStatus, TraceEvent,
};

pub struct FinalizeResult {
    pub committed: bool,
    pub superseded_run_ids: Vec<String>,
}

pub struct LedgerStore {
    conn: Mutex<Connection>,
}

impl LedgerStore {
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Structural(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::Structural(e.to_string()))?;
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
                CREATE TABLE IF NOT EXISTS runs (
                    run_id TEXT PRIMARY KEY,
                    thread_id TEXT NOT NULL,
                    stream_id TEXT NOT NULL,
                    fork_from_message_id TEXT,
                    status TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    finished_at TEXT,
                    message_count INTEGER NOT NULL DEFAULT 0
                );
                CREATE INDEX IF NOT EXISTS idx_runs_thread ON runs(thread_id);

                CREATE TABLE IF NOT EXISTS messages (
                    id TEXT PRIMARY KEY,
                    run_id TEXT NOT NULL,
                    thread_id TEXT NOT NULL,
                    parent_message_id TEXT,
                    role TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    metadata TEXT NOT NULL,
                    ordinal INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id);
                CREATE INDEX IF NOT EXISTS idx_messages_parent ON messages(parent_message_id);
                CREATE INDEX IF NOT EXISTS idx_messages_run ON messages(run_id);

                CREATE TABLE IF NOT EXISTS parts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    message_id TEXT NOT NULL,
                    ordinal INTEGER NOT NULL,
                    kind TEXT NOT NULL,
                    data TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_parts_message ON parts(message_id);
                "#,
            )
            .map_err(|e| Error::Structural(e.to_string()))
    }

    pub fn begin_run(
        &self,
        id_gen: &dyn IdGenerator,
        thread_id: &str,
        fork_from_message_id: Option<String>,
    ) -> Result<RunRecord> {
        let run_id = id_gen.next_id();
        let stream_id = RunRecord::stream_id_for(&run_id);
        let created_at = Utc::now();
        let record = RunRecord {
            run_id: run_id.clone(),
            thread_id: thread_id.to_string(),
            stream_id,
            fork_from_message_id,
            status: RunStatus::Created,
            created_at,
            finished_at: None,
            message_count: 0,
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO runs (run_id, thread_id, stream_id, fork_from_message_id, status, created_at, finished_at, message_count) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, 0)",
            params![
                record.run_id,
                record.thread_id,
                record.stream_id,
                record.fork_from_message_id,
                record.status.to_string(),
                record.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Structural(e.to_string()))?;
        Ok(record)
    }

    pub fn activate_run(&self, run_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let current = fetch_run(&conn, run_id)?;
        if current.status != RunStatus::Created {
            return Err(Error::illegal_transition(format!(
                "run {run_id} is {} — activate_run requires created",
                current.status
            )));
        }
        conn.execute(
            "UPDATE runs SET status = ?1 WHERE run_id = ?2",
            params![RunStatus::Streaming.to_string(), run_id],
        )
        .map_err(|e| Error::Structural(e.to_string()))?;
        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let conn = self.conn.lock().unwrap();
        fetch_run_opt(&conn, run_id)
    }

    pub fn list_runs(&self, thread_id: &str) -> Result<Vec<RunRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT run_id, thread_id, stream_id, fork_from_message_id, status, created_at, finished_at, message_count \
                 FROM runs WHERE thread_id = ?1 ORDER BY created_at ASC",
            )
            .map_err(|e| Error::Structural(e.to_string()))?;
        let rows = stmt
            .query_map([thread_id], run_from_row)
            .map_err(|e| Error::Structural(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| Error::Structural(e.to_string()))??);
        }
        Ok(out)
    }

    pub fn list_stale_runs(&self, thread_id: Option<&str>, older_than_ms: i64) -> Result<Vec<RunRecord>> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let query = match thread_id {
            Some(_) => {
                "SELECT run_id, thread_id, stream_id, fork_from_message_id, status, created_at, finished_at, message_count \
                 FROM runs WHERE thread_id = ?1 AND status IN ('created', 'streaming')"
            }
            None => {
                "SELECT run_id, thread_id, stream_id, fork_from_message_id, status, created_at, finished_at, message_count \
                 FROM runs WHERE status IN ('created', 'streaming')"
            }
        };
        let mut stmt = conn.prepare(query).map_err(|e| Error::Structural(e.to_string()))?;
        let rows: Vec<Result<RunRecord>> = if let Some(tid) = thread_id {
            stmt.query_map([tid], run_from_row)
                .map_err(|e| Error::Structural(e.to_string()))?
                .map(|r| r.map_err(|e| Error::Structural(e.to_string()))?)
                .collect()
        } else {
            stmt.query_map([], run_from_row)
                .map_err(|e| Error::Structural(e.to_string()))?
                .map(|r| r.map_err(|e| Error::Structural(e.to_string()))?)
                .collect()
        };
        let mut out = Vec::new();
        for row in rows {
            let record = row?;
            let age_ms = now.signed_duration_since(record.created_at).num_milliseconds();
            if age_ms >= older_than_ms {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Forces an active run into `failed` or `cancelled`; idempotent if
    /// already in the target status.
    pub fn recover_run(&self, run_id: &str, action: RecoverAction) -> Result<FinalizeResult> {
        self.finalize_run(run_id, action.into(), vec![], &NoopCheckpoints)
    }

    pub fn get_transcript(&self, thread_id: &str, branch: &crate::transcript::BranchSelector) -> Result<Vec<CanonicalMessage>> {
        let conn = self.conn.lock().unwrap();
        let nodes = load_thread_messages(&conn, thread_id)?;
        let run_status = load_run_statuses(&conn, thread_id)?;
        crate::transcript::resolve_transcript(&nodes, &run_status, branch)
    }

    pub fn get_thread_tree(&self, thread_id: &str, branch: &crate::transcript::BranchSelector) -> Result<crate::transcript::ThreadTree> {
        let conn = self.conn.lock().unwrap();
        let nodes = load_thread_messages(&conn, thread_id)?;
        let run_status = load_run_statuses(&conn, thread_id)?;
        crate::transcript::resolve_thread_tree(&nodes, &run_status, branch)
    }

    pub fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM parts WHERE message_id IN (SELECT id FROM messages WHERE thread_id = ?1)",
            [thread_id],
        )
        .map_err(|e| Error::Structural(e.to_string()))?;
        conn.execute("DELETE FROM messages WHERE thread_id = ?1", [thread_id])
            .map_err(|e| Error::Structural(e.to_string()))?;
        conn.execute("DELETE FROM runs WHERE thread_id = ?1", [thread_id])
            .map_err(|e| Error::Structural(e.to_string()))?;
        Ok(())
    }

    /// Atomically transitions `run_id` to `status`, inserting `messages`
    /// when `status` is `committed`, superseding and pruning conflicting
    /// runs sharing the same fork point. Re-invocation with the same
    /// `(run_id, status)` after a successful commit is a no-op.
    pub fn finalize_run(
        &self,
        run_id: &str,
        status: FinalizeStatus,
        messages: Vec<CanonicalMessage>,
        checkpoints: &dyn Checkpoints,
    ) -> Result<FinalizeResult> {
        checkpoints.hit("pre_begin")?;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
            .map_err(|e| Error::Structural(e.to_string()))?;

        let current = fetch_run(&tx, run_id)?;
        if current.status == RunStatus::from(status) {
            // Idempotent retry after a crash between commit and the caller
            // observing success.
            tx.commit().map_err(|e| Error::Structural(e.to_string()))?;
            return Ok(FinalizeResult {
                committed: true,
                superseded_run_ids: vec![],
            });
        }
        if current.status.is_terminal() {
            return Err(Error::illegal_transition(format!(
                "run {run_id} is already terminal ({})",
                current.status
            )));
        }

        let mut superseded_run_ids = Vec::new();
        let finished_at = Utc::now();

        if status == FinalizeStatus::Committed {
            if let Some(fork_from) = &current.fork_from_message_id {
                superseded_run_ids = supersede_peers(&tx, &current.thread_id, fork_from, run_id, finished_at)?;
                checkpoints.hit("post_supersede")?;
                prune_messages_for_runs(&tx, &superseded_run_ids)?;
                checkpoints.hit("post_prune")?;
            }

            for message in &messages {
                insert_message(&tx, message)?;
            }
            checkpoints.hit("post_insert")?;

            tx.execute(
                "UPDATE runs SET message_count = message_count + ?1 WHERE run_id = ?2",
                params![messages.len() as i64, run_id],
            )
            .map_err(|e| Error::Structural(e.to_string()))?;
        }

        tx.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE run_id = ?3",
            params![RunStatus::from(status).to_string(), finished_at.to_rfc3339(), run_id],
        )
        .map_err(|e| Error::Structural(e.to_string()))?;
        checkpoints.hit("post_status_update")?;

        tx.commit().map_err(|e| Error::Structural(e.to_string()))?;
        checkpoints.hit("post_commit")?;

        if status == FinalizeStatus::Committed {
            TraceEvent::RunCommitted {
                run_id: run_id.to_string(),
                thread_id: current.thread_id.clone(),
                message_count: messages.len() as u32,
                superseded_run_ids: superseded_run_ids.clone(),
            }
            .emit();
        }
        TraceEvent::RunFinalized {
            run_id: run_id.to_string(),
            status: RunStatus::from(status).to_string(),
        }
        .emit();

        Ok(FinalizeResult {
            committed: true,
            superseded_run_ids,
        })
    }
}

fn supersede_peers(
    tx: &Transaction<'_>,
    thread_id: &str,
    fork_from_message_id: &str,
    excluding_run_id: &str,
    finished_at: DateTime<Utc>,
) -> Result<Vec<String>> {
    let mut stmt = tx
        .prepare(
            "SELECT run_id FROM runs WHERE thread_id = ?1 AND fork_from_message_id = ?2 \
             AND status = 'committed' AND run_id != ?3",
        )
        .map_err(|e| Error::Structural(e.to_string()))?;
    let ids: Vec<String> = stmt
        .query_map(params![thread_id, fork_from_message_id, excluding_run_id], |row| row.get(0))
        .map_err(|e| Error::Structural(e.to_string()))?
        .collect::<rusqlite::Result<_>>()
        .map_err(|e| Error::Structural(e.to_string()))?;

    for id in &ids {
        tx.execute(
            "UPDATE runs SET status = 'superseded', finished_at = ?1 WHERE run_id = ?2",
            params![finished_at.to_rfc3339(), id],
        )
        .map_err(|e| Error::Structural(e.to_string()))?;
        TraceEvent::RunSuperseded {
            run_id: id.clone(),
            superseded_by: excluding_run_id.to_string(),
            fork_from_message_id: fork_from_message_id.to_string(),
        }
        .emit();
    }
    Ok(ids)
}

fn prune_messages_for_runs(tx: &Transaction<'_>, run_ids: &[String]) -> Result<()> {
    for run_id in run_ids {
        tx.execute(
            "DELETE FROM parts WHERE message_id IN (SELECT id FROM messages WHERE run_id = ?1)",
            [run_id],
        )
        .map_err(|e| Error::Structural(e.to_string()))?;
        tx.execute("DELETE FROM messages WHERE run_id = ?1", [run_id])
            .map_err(|e| Error::Structural(e.to_string()))?;
    }
    Ok(())
}

fn insert_message(tx: &Transaction<'_>, message: &CanonicalMessage) -> Result<()> {
    tx.execute(
        "INSERT INTO messages (id, run_id, thread_id, parent_message_id, role, created_at, metadata, ordinal) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            message.id,
            message.run_id,
            message.thread_id,
            message.parent_message_id,
            role_str(message.role),
            message.created_at.to_rfc3339(),
            message.metadata.to_string(),
            message.order as i64,
        ],
    )
    .map_err(|e| Error::Structural(e.to_string()))?;

    for (ordinal, part) in message.parts.iter().enumerate() {
        tx.execute(
            "INSERT INTO parts (message_id, ordinal, kind, data) VALUES (?1, ?2, ?3, ?4)",
            params![
                message.id,
                ordinal as i64,
                part.kind(),
                serde_json::to_string(part)?,
            ],
        )
        .map_err(|e| Error::Structural(e.to_string()))?;
    }
    Ok(())
}

pub(crate) fn load_thread_messages(conn: &Connection, thread_id: &str) -> Result<Vec<CanonicalMessage>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, run_id, thread_id, parent_message_id, role, created_at, metadata, ordinal \
             FROM messages WHERE thread_id = ?1 ORDER BY ordinal ASC",
        )
        .map_err(|e| Error::Structural(e.to_string()))?;
    let rows = stmt
        .query_map([thread_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, i64>(7)?,
            ))
        })
        .map_err(|e| Error::Structural(e.to_string()))?;

    let mut out = Vec::new();
    for row in rows {
        let (id, run_id, thread_id, parent_message_id, role, created_at, metadata, order) =
            row.map_err(|e| Error::Structural(e.to_string()))?;
        let metadata: serde_json::Value = serde_json::from_str(&metadata)?;
        if metadata.get("schema_version").is_none() {
            return Err(Error::structural(format!("message {id} missing schema_version")));
        }
        let parts = load_parts(conn, &id)?;
        out.push(CanonicalMessage {
            id,
            run_id,
            thread_id,
            parent_message_id,
            role: role_from_str(&role)?,
            parts,
            created_at: parse_rfc3339(&created_at)?,
            order: order as u64,
            metadata,
        });
    }
    Ok(out)
}

fn load_parts(conn: &Connection, message_id: &str) -> Result<Vec<CanonicalPart>> {
    let mut stmt = conn
        .prepare("SELECT data FROM parts WHERE message_id = ?1 ORDER BY ordinal ASC")
        .map_err(|e| Error::Structural(e.to_string()))?;
    let rows = stmt
        .query_map([message_id], |row| row.get::<_, String>(0))
        .map_err(|e| Error::Structural(e.to_string()))?;
    let mut out = Vec::new();
    for row in rows {
        let data = row.map_err(|e| Error::Structural(e.to_string()))?;
        out.push(serde_json::from_str(&data)?);
    }
    Ok(out)
}

pub(crate) fn load_run_statuses(conn: &Connection, thread_id: &str) -> Result<std::collections::HashMap<String, RunStatus>> {
    let mut stmt = conn
        .prepare("SELECT run_id, status FROM runs WHERE thread_id = ?1")
        .map_err(|e| Error::Structural(e.to_string()))?;
    let rows = stmt
        .query_map([thread_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| Error::Structural(e.to_string()))?;
    let mut out = std::collections::HashMap::new();
    for row in rows {
        let (run_id, status) = row.map_err(|e| Error::Structural(e.to_string()))?;
        out.insert(run_id, status_from_str(&status)?);
    }
    Ok(out)
}

fn fetch_run(conn: &Connection, run_id: &str) -> Result<RunRecord> {
    fetch_run_opt(conn, run_id)?.ok_or_else(|| Error::not_found(format!("run {run_id}")))
}

fn fetch_run_opt(conn: &Connection, run_id: &str) -> Result<Option<RunRecord>> {
    conn.query_row(
        "SELECT run_id, thread_id, stream_id, fork_from_message_id, status, created_at, finished_at, message_count \
         FROM runs WHERE run_id = ?1",
        [run_id],
        run_from_row,
    )
    .optional()
    .map_err(|e| Error::Structural(e.to_string()))?
    .transpose()
}

fn run_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<RunRecord>> {
    let run_id: String = row.get(0)?;
    let thread_id: String = row.get(1)?;
    let stream_id: String = row.get(2)?;
    let fork_from_message_id: Option<String> = row.get(3)?;
    let status: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    let finished_at: Option<String> = row.get(6)?;
    let message_count: i64 = row.get(7)?;

    Ok((|| {
        Ok(RunRecord {
            run_id,
            thread_id,
            stream_id,
            fork_from_message_id,
            status: status_from_str(&status)?,
            created_at: parse_rfc3339(&created_at)?,
            finished_at: finished_at.map(|s| parse_rfc3339(&s)).transpose()?,
            message_count: message_count as u32,
        })
    })())
}

fn status_from_str(s: &str) -> Result<RunStatus> {
    match s {
        "created" => Ok(RunStatus::Created),
        "streaming" => Ok(RunStatus::Streaming),
        "committed" => Ok(RunStatus::Committed),
        "failed" => Ok(RunStatus::Failed),
        "cancelled" => Ok(RunStatus::Cancelled),
        "superseded" => Ok(RunStatus::Superseded),
        other => Err(Error::structural(format!("unknown run status {other:?}"))),
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
        Role::System => "system",
    }
}

fn role_from_str(s: &str) -> Result<Role> {
    match s {
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "tool" => Ok(Role::Tool),
        "system" => Ok(Role::System),
        other => Err(Error::structural(format!("unknown role {other:?}"))),
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| Utc.from_utc_datetime(&dt.naive_utc()))
        .map_err(|e| Error::structural(format!("corrupt timestamp {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::BranchSelector;
    use sa_domain::SequentialIdGenerator;

    fn text_message(run_id: &str, thread_id: &str, parent: Option<&str>, order: u64, text: &str) -> CanonicalMessage {
        CanonicalMessage {
            id: format!("m-{run_id}-{order}"),
            run_id: run_id.to_string(),
            thread_id: thread_id.to_string(),
            parent_message_id: parent.map(str::to_string),
            role: Role::Assistant,
            parts: vec![CanonicalPart::Text { text: text.to_string() }],
            created_at: Utc::now(),
            order,
            metadata: serde_json::json!({"schema_version": 1}),
        }
    }

    #[test]
    fn begin_activate_finalize_happy_path() {
        let store = LedgerStore::open_in_memory().unwrap();
        let gen = SequentialIdGenerator::new();
        let run = store.begin_run(&gen, "t1", None).unwrap();
        assert_eq!(run.status, RunStatus::Created);
        store.activate_run(&run.run_id).unwrap();

        let msg = text_message(&run.run_id, "t1", None, 0, "hi");
        let result = store
            .finalize_run(&run.run_id, FinalizeStatus::Committed, vec![msg], &NoopCheckpoints)
            .unwrap();
        assert!(result.committed);
        assert!(result.superseded_run_ids.is_empty());

        let fetched = store.get_run(&run.run_id).unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Committed);
        assert_eq!(fetched.message_count, 1);
    }

    #[test]
    fn finalize_is_idempotent_on_retry() {
        let store = LedgerStore::open_in_memory().unwrap();
        let gen = SequentialIdGenerator::new();
        let run = store.begin_run(&gen, "t1", None).unwrap();
        store.activate_run(&run.run_id).unwrap();
        let msg = text_message(&run.run_id, "t1", None, 0, "hi");
        store
            .finalize_run(&run.run_id, FinalizeStatus::Committed, vec![msg], &NoopCheckpoints)
            .unwrap();

        let retry = store
            .finalize_run(&run.run_id, FinalizeStatus::Committed, vec![], &NoopCheckpoints)
            .unwrap();
        assert!(retry.committed);
        let fetched = store.get_run(&run.run_id).unwrap().unwrap();
        assert_eq!(fetched.message_count, 1, "retry must not append additional messages");
    }

    #[test]
    fn regeneration_supersedes_prior_commit() {
        let store = LedgerStore::open_in_memory().unwrap();
        let gen = SequentialIdGenerator::new();

        let r1 = store.begin_run(&gen, "t1", Some("u1".into())).unwrap();
        store.activate_run(&r1.run_id).unwrap();
        store
            .finalize_run(
                &r1.run_id,
                FinalizeStatus::Committed,
                vec![text_message(&r1.run_id, "t1", Some("u1"), 0, "m1")],
                &NoopCheckpoints,
            )
            .unwrap();

        let r2 = store.begin_run(&gen, "t1", Some("u1".into())).unwrap();
        store.activate_run(&r2.run_id).unwrap();
        let result = store
            .finalize_run(
                &r2.run_id,
                FinalizeStatus::Committed,
                vec![text_message(&r2.run_id, "t1", Some("u1"), 0, "m2")],
                &NoopCheckpoints,
            )
            .unwrap();

        assert_eq!(result.superseded_run_ids, vec![r1.run_id.clone()]);
        assert_eq!(store.get_run(&r1.run_id).unwrap().unwrap().status, RunStatus::Superseded);
        assert_eq!(store.get_run(&r2.run_id).unwrap().unwrap().status, RunStatus::Committed);

        let transcript = store.get_transcript("t1", &BranchSelector::default()).unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].run_id, r2.run_id);
    }

    #[test]
    fn crash_before_finalize_leaves_run_streaming() {
        let store = LedgerStore::open_in_memory().unwrap();
        let gen = SequentialIdGenerator::new();
        let injector = sa_chaos::FaultInjector::new();
        injector.arm(sa_chaos::POST_INSERT);

        let run = store.begin_run(&gen, "t1", None).unwrap();
        store.activate_run(&run.run_id).unwrap();
        let msg = text_message(&run.run_id, "t1", None, 0, "hi");
        let err = store.finalize_run(&run.run_id, FinalizeStatus::Committed, vec![msg.clone()], &injector);
        assert!(err.is_err());

        let fetched = store.get_run(&run.run_id).unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Streaming, "failed transaction must not persist");

        let retry = store
            .finalize_run(&run.run_id, FinalizeStatus::Committed, vec![msg], &NoopCheckpoints)
            .unwrap();
        assert!(retry.committed);
        let transcript = store.get_transcript("t1", &BranchSelector::default()).unwrap();
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn list_stale_runs_finds_old_active_runs() {
        let store = LedgerStore::open_in_memory().unwrap();
        let gen = SequentialIdGenerator::new();
        let run = store.begin_run(&gen, "t1", None).unwrap();
        store.activate_run(&run.run_id).unwrap();
        let stale = store.list_stale_runs(Some("t1"), 0).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].run_id, run.run_id);
    }

    #[test]
    fn recover_run_forces_terminal_status() {
        let store = LedgerStore::open_in_memory().unwrap();
        let gen = SequentialIdGenerator::new();
        let run = store.begin_run(&gen, "t1", None).unwrap();
        store.activate_run(&run.run_id).unwrap();
        store.recover_run(&run.run_id, RecoverAction::Fail).unwrap();
        assert_eq!(store.get_run(&run.run_id).unwrap().unwrap().status, RunStatus::Failed);
    }
}
