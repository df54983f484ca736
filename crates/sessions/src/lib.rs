//! Run-lifecycle state machine and branch-aware transcript store, with
//! crash-atomic finalization.

pub mod store;
pub mod transcript;

pub use store::{FinalizeResult, LedgerStore};
pub use transcript::{BranchSelector, ForkPoint, ThreadTree};
