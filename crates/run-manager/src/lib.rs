//! Thin orchestration over the event store, accumulator, and ledger:
//! begin/append/finalize a run, plus fleet-level stale-run reconciliation.

mod manager;
mod reconcile;

pub use manager::{BeginRunOptions, RunManager};
pub use reconcile::{recover_all_stale_runs, ReconcileOptions, ReconcileOutcome};
