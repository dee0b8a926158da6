//! Admission control: a cap on concurrently live pairs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts live pairs and refuses new ones past `max_pairs`.
pub struct PairLimiter {
    max_pairs: usize,
    active: Arc<AtomicUsize>,
}

impl PairLimiter {
    pub fn new(max_pairs: usize) -> Self {
        Self {
            max_pairs,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Reserve a slot. Returns `None` when the limit has been reached.
    ///
    /// The returned guard is `Send` so it can live in the pair's task;
    /// the slot is released when the guard drops.
    pub fn try_acquire(&self) -> Option<PairGuard> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_pairs).then_some(n + 1)
            })
            .ok()?;
        Some(PairGuard {
            counter: self.active.clone(),
        })
    }

    /// Current number of live pairs.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn max_pairs(&self) -> usize {
        self.max_pairs
    }
}

/// RAII guard that releases a pair slot on drop.
pub struct PairGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for PairGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}
