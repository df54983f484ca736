//! Time-ordered identifier generation.
//!
//! Identifiers are 26-character Crockford base32 ULIDs: a 10-char
//! millisecond timestamp prefix followed by a 16-char random suffix, so
//! lexicographic sort tracks creation order. The generator is injectable —
//! tests pin it to a deterministic sequence (`"id-1"`, `"id-2"`, …) instead
//! of real ULIDs so fixtures stay stable.

use std::sync::atomic::{AtomicU64, Ordering};

use ulid::Ulid;

/// Generates identifiers for runs, messages, and streams.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Default generator: a real ULID per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct UlidGenerator;

impl IdGenerator for UlidGenerator {
    fn next_id(&self) -> String {
        Ulid::new().to_string()
    }
}

/// Deterministic generator for tests: `"id-1"`, `"id-2"`, … in call order.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("id-{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ulid_is_26_chars_and_sortable() {
        let gen = UlidGenerator;
        let a = gen.next_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = gen.next_id();
        assert_eq!(a.len(), 26);
        assert_eq!(b.len(), 26);
        assert!(a < b);
    }

    #[test]
    fn sequential_generator_is_deterministic() {
        let gen = SequentialIdGenerator::new();
        assert_eq!(gen.next_id(), "id-1");
        assert_eq!(gen.next_id(), "id-2");
        assert_eq!(gen.next_id(), "id-3");
    }
}
