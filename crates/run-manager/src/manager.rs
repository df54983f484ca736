//! `RunManager`: the thin layer that wires the event store, accumulator,
//! and ledger into the three operations a caller actually needs.

use std::sync::Arc;

use sa_accumulator::Accumulator;
use sa_domain::{
    Checkpoints, Error, FinalizeStatus, IdGenerator, NoopCheckpoints, ReplayQuery, Result,
    RunRecord, StoredEvent, StreamEvent,
};
use sa_event_store::EventStore;
use sa_ledger::{FinalizeResult, LedgerStore};

/// Inputs to [`RunManager::begin_run`].
#[derive(Debug, Clone, Default)]
pub struct BeginRunOptions {
    pub thread_id: String,
    pub fork_from_message_id: Option<String>,
}

pub struct RunManager {
    ledger: Arc<LedgerStore>,
    events: Arc<dyn EventStore>,
    id_gen: Arc<dyn IdGenerator>,
    checkpoints: Arc<dyn Checkpoints>,
}

impl RunManager {
    pub fn new(ledger: Arc<LedgerStore>, events: Arc<dyn EventStore>, id_gen: Arc<dyn IdGenerator>) -> Self {
        Self {
            ledger,
            events,
            id_gen,
            checkpoints: Arc::new(NoopCheckpoints),
        }
    }

    /// Swaps in a fault-injecting checkpoint seam (tests only — `sa-chaos`
    /// is never a non-dev dependency of a host binary).
    pub fn with_checkpoints(mut self, checkpoints: Arc<dyn Checkpoints>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    pub fn events(&self) -> &dyn EventStore {
        self.events.as_ref()
    }

    /// Begins and immediately activates a run, so the returned record is
    /// always `streaming`.
    pub fn begin_run(&self, opts: BeginRunOptions) -> Result<RunRecord> {
        let record = self
            .ledger
            .begin_run(self.id_gen.as_ref(), &opts.thread_id, opts.fork_from_message_id)?;
        self.ledger.activate_run(&record.run_id)?;
        self.ledger
            .get_run(&record.run_id)?
            .ok_or_else(|| Error::structural(format!("run {} vanished right after activation", record.run_id)))
    }

    /// Appends events to `run_id`'s stream. Rejects appends to a run that
    /// has already reached a terminal status.
    pub fn append_events(&self, run_id: &str, events: Vec<StreamEvent>) -> Result<Vec<StoredEvent>> {
        let run = self.require_run(run_id)?;
        if run.status.is_terminal() {
            return Err(Error::illegal_transition(format!(
                "run {run_id} is {} — cannot append events to a terminal run",
                run.status
            )));
        }
        self.events.append(&run.stream_id, events)
    }

    /// Finalizes `run_id`. On `committed`, replays the run's full stream
    /// and folds it through the accumulator to produce the messages the
    /// ledger persists; `failed`/`cancelled` carry no messages and leave
    /// the partial event log in place.
    pub fn finalize_run(&self, run_id: &str, status: FinalizeStatus) -> Result<FinalizeResult> {
        let run = self.require_run(run_id)?;
        let messages = if status == FinalizeStatus::Committed {
            let stream_events = self.events.replay(&run.stream_id, ReplayQuery::default())?;
            Accumulator::new(
                self.id_gen.as_ref(),
                run.run_id.clone(),
                run.thread_id.clone(),
                run.fork_from_message_id.clone(),
            )
            .fold(&stream_events)
        } else {
            Vec::new()
        };
        self.ledger
            .finalize_run(run_id, status, messages, self.checkpoints.as_ref())
    }

    fn require_run(&self, run_id: &str) -> Result<RunRecord> {
        self.ledger
            .get_run(run_id)?
            .ok_or_else(|| Error::not_found(format!("run {run_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::{RunStatus, SequentialIdGenerator};
    use sa_event_store::InMemoryEventStore;

    fn manager() -> RunManager {
        RunManager::new(
            Arc::new(LedgerStore::open_in_memory().unwrap()),
            Arc::new(InMemoryEventStore::new()),
            Arc::new(SequentialIdGenerator::new()),
        )
    }

    #[test]
    fn begin_run_returns_a_streaming_record() {
        let mgr = manager();
        let run = mgr
            .begin_run(BeginRunOptions {
                thread_id: "t1".into(),
                fork_from_message_id: None,
            })
            .unwrap();
        assert_eq!(run.status, RunStatus::Streaming);
    }

    #[test]
    fn append_then_finalize_committed_produces_messages() {
        let mgr = manager();
        let run = mgr
            .begin_run(BeginRunOptions { thread_id: "t1".into(), fork_from_message_id: None })
            .unwrap();

        mgr.append_events(
            &run.run_id,
            vec![
                StreamEvent::new("step-started", serde_json::json!({})),
                StreamEvent::new("text-delta", serde_json::json!({"delta": "hi"})),
                StreamEvent::new("step-finished", serde_json::json!({})),
            ],
        )
        .unwrap();

        let result = mgr.finalize_run(&run.run_id, FinalizeStatus::Committed).unwrap();
        assert!(result.committed);

        let transcript = mgr
            .ledger()
            .get_transcript("t1", &sa_ledger::BranchSelector::new())
            .unwrap();
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn append_to_terminal_run_is_rejected() {
        let mgr = manager();
        let run = mgr
            .begin_run(BeginRunOptions { thread_id: "t1".into(), fork_from_message_id: None })
            .unwrap();
        mgr.finalize_run(&run.run_id, FinalizeStatus::Cancelled).unwrap();

        let err = mgr
            .append_events(&run.run_id, vec![StreamEvent::new("text-delta", serde_json::json!({}))])
            .unwrap_err();
        assert!(matches!(err, Error::IllegalTransition(_)));
    }

    #[test]
    fn finalize_unknown_run_is_not_found() {
        let mgr = manager();
        let err = mgr.finalize_run("no-such-run", FinalizeStatus::Committed).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn failed_finalize_keeps_partial_events_but_commits_no_messages() {
        let mgr = manager();
        let run = mgr
            .begin_run(BeginRunOptions { thread_id: "t1".into(), fork_from_message_id: None })
            .unwrap();
        mgr.append_events(&run.run_id, vec![StreamEvent::new("text-delta", serde_json::json!({"delta": "partial"}))])
            .unwrap();

        mgr.finalize_run(&run.run_id, FinalizeStatus::Failed).unwrap();

        let transcript = mgr
            .ledger()
            .get_transcript("t1", &sa_ledger::BranchSelector::new())
            .unwrap();
        assert!(transcript.is_empty());
        // the raw event log is untouched — still replayable for debugging.
        assert_eq!(mgr.events().head(&run.stream_id).unwrap(), 1);
    }

    #[test]
    fn checkpoints_seam_propagates_injected_faults() {
        let injector = Arc::new(sa_chaos::FaultInjector::new());
        injector.arm(sa_chaos::POST_INSERT);
        let mgr = manager().with_checkpoints(injector);

        let run = mgr
            .begin_run(BeginRunOptions { thread_id: "t1".into(), fork_from_message_id: None })
            .unwrap();
        mgr.append_events(&run.run_id, vec![StreamEvent::new("text-delta", serde_json::json!({"delta": "x"}))])
            .unwrap();

        let err = mgr.finalize_run(&run.run_id, FinalizeStatus::Committed).unwrap_err();
        assert!(matches!(err, Error::Other(_)));

        // retry succeeds now that the fault has fired once.
        let result = mgr.finalize_run(&run.run_id, FinalizeStatus::Committed).unwrap();
        assert!(result.committed);
    }
}
