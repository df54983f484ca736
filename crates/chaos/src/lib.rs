//! Crash-point injection, grounded in the host's own crash-path testing
//! instinct (partial-persistence edge cases around JSONL pruning/reload).
//!
//! A [`FaultInjector`] is armed with the name of a checkpoint to fail at;
//! the ledger's finalize path consults it (via [`sa_domain::Checkpoints`])
//! at `pre_begin`, `post_prune`, `post_supersede`, `post_insert`,
//! `post_status_update`, and `post_commit`. Never linked into the
//! production path — only constructed from `#[cfg(test)]` code.

use parking_lot::Mutex;
use sa_domain::{Checkpoints, Error, Result};

pub const PRE_BEGIN: &str = "pre_begin";
pub const POST_PRUNE: &str = "post_prune";
pub const POST_SUPERSEDE: &str = "post_supersede";
pub const POST_INSERT: &str = "post_insert";
pub const POST_STATUS_UPDATE: &str = "post_status_update";
pub const POST_COMMIT: &str = "post_commit";

#[derive(Default)]
pub struct FaultInjector {
    armed: Mutex<Option<String>>,
    hits: Mutex<Vec<String>>,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `hit(checkpoint)` call that matches `checkpoint`.
    pub fn arm(&self, checkpoint: &str) {
        *self.armed.lock() = Some(checkpoint.to_string());
    }

    /// Checkpoints observed so far, in call order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().clone()
    }
}

impl Checkpoints for FaultInjector {
    fn hit(&self, name: &str) -> Result<()> {
        self.hits.lock().push(name.to_string());
        let mut armed = self.armed.lock();
        if armed.as_deref() == Some(name) {
            armed.take();
            return Err(Error::Other(format!("injected fault at checkpoint {name}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unarmed_injector_never_fails() {
        let injector = FaultInjector::new();
        assert!(injector.hit(POST_INSERT).is_ok());
        assert_eq!(injector.hits(), vec![POST_INSERT.to_string()]);
    }

    #[test]
    fn armed_checkpoint_fails_exactly_once() {
        let injector = FaultInjector::new();
        injector.arm(POST_COMMIT);
        assert!(injector.hit(POST_INSERT).is_ok());
        assert!(injector.hit(POST_COMMIT).is_err());
        assert!(injector.hit(POST_COMMIT).is_ok()); // disarmed after first trip
    }
}
