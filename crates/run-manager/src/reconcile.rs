//! Fleet-level reconciliation: sweep a thread (or every thread) for runs
//! that were left active by a crashed process and force them terminal.

use sa_domain::{RecoverAction, Result};
use sa_ledger::{FinalizeResult, LedgerStore};

const DEFAULT_STALE_THRESHOLD_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub thread_id: Option<String>,
    pub older_than_ms: i64,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            thread_id: None,
            older_than_ms: DEFAULT_STALE_THRESHOLD_MS,
        }
    }
}

/// Outcome of recovering one stale run. Kept per-run so a caller can report
/// partial failure without losing which run it was.
pub struct ReconcileOutcome {
    pub run_id: String,
    pub result: Result<FinalizeResult>,
}

/// Recovers every run `list_stale_runs` reports. One run's recovery failing
/// does not stop the sweep — every stale run gets an attempt.
pub fn recover_all_stale_runs(
    ledger: &LedgerStore,
    action: RecoverAction,
    opts: ReconcileOptions,
) -> Result<Vec<ReconcileOutcome>> {
    let stale = ledger.list_stale_runs(opts.thread_id.as_deref(), opts.older_than_ms)?;
    Ok(stale
        .into_iter()
        .map(|run| {
            let result = ledger.recover_run(&run.run_id, action);
            if let Err(e) = &result {
                tracing::warn!(run_id = %run.run_id, error = %e, "failed to recover stale run");
            }
            ReconcileOutcome {
                run_id: run.run_id,
                result,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::{RunStatus, SequentialIdGenerator};

    fn begun(ledger: &LedgerStore, thread_id: &str) -> String {
        let id_gen = SequentialIdGenerator::new();
        let run = ledger.begin_run(&id_gen, thread_id, None).unwrap();
        ledger.activate_run(&run.run_id).unwrap();
        run.run_id
    }

    #[test]
    fn zero_threshold_recovers_every_active_run() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let run_id = begun(&ledger, "t1");

        let outcomes = recover_all_stale_runs(
            &ledger,
            RecoverAction::Fail,
            ReconcileOptions { thread_id: None, older_than_ms: 0 },
        )
        .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].run_id, run_id);
        assert!(outcomes[0].result.as_ref().unwrap().committed);
        assert_eq!(ledger.get_run(&run_id).unwrap().unwrap().status, RunStatus::Failed);
    }

    #[test]
    fn freshly_created_run_is_not_stale_under_default_threshold() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        begun(&ledger, "t1");

        let outcomes =
            recover_all_stale_runs(&ledger, RecoverAction::Fail, ReconcileOptions::default()).unwrap();

        assert!(outcomes.is_empty());
    }

    #[test]
    fn thread_id_filter_restricts_the_sweep() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let t1_run = begun(&ledger, "t1");
        let t2_run = begun(&ledger, "t2");

        let outcomes = recover_all_stale_runs(
            &ledger,
            RecoverAction::Cancel,
            ReconcileOptions { thread_id: Some("t1".into()), older_than_ms: 0 },
        )
        .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].run_id, t1_run);
        assert_eq!(ledger.get_run(&t1_run).unwrap().unwrap().status, RunStatus::Cancelled);
        // the other thread's run was never swept.
        assert_eq!(ledger.get_run(&t2_run).unwrap().unwrap().status, RunStatus::Streaming);
    }

    #[test]
    fn cancel_action_sets_cancelled_not_failed() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let run_id = begun(&ledger, "t1");

        recover_all_stale_runs(
            &ledger,
            RecoverAction::Cancel,
            ReconcileOptions { thread_id: None, older_than_ms: 0 },
        )
        .unwrap();

        assert_eq!(ledger.get_run(&run_id).unwrap().unwrap().status, RunStatus::Cancelled);
    }
}
