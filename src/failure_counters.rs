//! Two bounded, independently guarded counters (C3): accountant failures and
//! consecutive missed exchange messages.
//!
//! Grounded in the teacher's `pending_nonce_manager.rs`, which uses a bare
//! `AtomicUsize` for its analogous single-purpose concurrent counter rather
//! than a mutex-guarded integer.

use std::sync::atomic::{AtomicU64, Ordering};

/// A single bounded counter. No component other than its owner
/// ([`crate::accountant`] or [`crate::tracker`]) touches the atomic directly.
#[derive(Debug, Default)]
pub struct FailureCounter {
    count: AtomicU64,
}

impl FailureCounter {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
        }
    }

    /// Increments and returns the new value.
    pub fn inc_and_get(&self) -> u64 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

/// The two counters the tracker needs: `accountant_failure_count` resets on
/// any accountant success, `not_received_count` resets on any valid payment.
#[derive(Debug, Default)]
pub struct FailureCounters {
    pub accountant_failure_count: FailureCounter,
    pub not_received_count: FailureCounter,
}

impl FailureCounters {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inc_and_get_then_reset() {
        let c = FailureCounter::new();
        assert_eq!(c.inc_and_get(), 1);
        assert_eq!(c.inc_and_get(), 2);
        c.reset();
        assert_eq!(c.get(), 0);
    }
}
