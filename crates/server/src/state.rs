use std::sync::Arc;

use sa_domain::{IdGenerator, UlidGenerator};
use sa_event_store::{EventStore, SqliteEventStore};
use sa_fanout_server::FanoutState;
use sa_ledger::LedgerStore;
use sa_run_manager::RunManager;

/// Everything a CLI subcommand or the WebSocket endpoint needs, built once
/// in `main` from the resolved [`Config`](sa_domain::config::Config).
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerStore>,
    pub events: Arc<dyn EventStore>,
    pub runs: Arc<RunManager>,
    pub fanout: FanoutState,
    /// Prefixes thread ids so one store can serve more than one tenant.
    pub namespace: String,
}

impl AppState {
    pub fn open(config: &sa_domain::config::Config) -> anyhow::Result<Self> {
        let events: Arc<dyn EventStore> = if config.store.database_path == ":memory:" {
            Arc::new(SqliteEventStore::open_in_memory()?)
        } else {
            Arc::new(SqliteEventStore::open(std::path::Path::new(
                &config.store.database_path,
            ))?)
        };
        let ledger = if config.store.database_path == ":memory:" {
            Arc::new(LedgerStore::open_in_memory()?)
        } else {
            Arc::new(LedgerStore::open(std::path::Path::new(
                &config.store.database_path,
            ))?)
        };
        let id_gen: Arc<dyn IdGenerator> = Arc::new(UlidGenerator);
        let runs = Arc::new(RunManager::new(ledger.clone(), events.clone(), id_gen));

        let fanout_config = sa_fanout_server::FanoutConfig {
            heartbeat_interval: std::time::Duration::from_millis(config.fanout.heartbeat_interval_ms),
            heartbeat_timeout: std::time::Duration::from_millis(config.fanout.heartbeat_timeout_ms),
            hello_timeout: std::time::Duration::from_millis(config.fanout.heartbeat_timeout_ms),
            max_buffer_size: config.fanout.max_buffer_size,
        };
        let fanout = FanoutState::new(events.clone(), fanout_config);

        Ok(Self {
            ledger,
            events,
            runs,
            fanout,
            namespace: config.store.namespace.clone(),
        })
    }

    /// Namespaces a thread id for multi-tenant isolation of a shared store.
    pub fn scoped_thread_id(&self, thread_id: &str) -> String {
        format!("{}:{}", self.namespace, thread_id)
    }

    /// Appends events to a run's stream and fans them out to live
    /// subscribers. This is the write path `FanoutState::broadcast` exists
    /// for — every append that reaches storage is visible to subscribers
    /// without them polling.
    pub fn append_events(
        &self,
        run_id: &str,
        events: Vec<sa_domain::StreamEvent>,
    ) -> sa_domain::Result<Vec<sa_domain::StoredEvent>> {
        let run = self
            .ledger
            .get_run(run_id)?
            .ok_or_else(|| sa_domain::Error::not_found(format!("run {run_id}")))?;
        let stored = self.runs.append_events(run_id, events)?;
        self.fanout.broadcast(&run.stream_id, &stored);
        Ok(stored)
    }
}
