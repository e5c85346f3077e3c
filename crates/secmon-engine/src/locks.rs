//! # Pair Locks
//!
//! At most one worker runs a given (account, technology) pair at a time.
//! [`PairLocks::try_acquire`] never waits: a pair that is already running
//! is skipped by the caller rather than queued behind the running worker.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use secmon_core::Pair;

/// Table of pairs currently being run.
#[derive(Debug, Clone, Default)]
pub struct PairLocks {
    held: Arc<Mutex<HashSet<Pair>>>,
}

impl PairLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `pair`, or `None` if another worker holds it.
    pub fn try_acquire(&self, pair: &Pair) -> Option<PairGuard> {
        let mut held = self.held.lock();
        if !held.insert(pair.clone()) {
            return None;
        }
        Some(PairGuard {
            pair: pair.clone(),
            held: Arc::clone(&self.held),
        })
    }

    /// Whether `pair` is currently locked.
    pub fn is_held(&self, pair: &Pair) -> bool {
        self.held.lock().contains(pair)
    }

    /// Number of pairs currently locked.
    pub fn len(&self) -> usize {
        self.held.lock().len()
    }

    /// Whether no pair is locked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases its pair when dropped.
#[derive(Debug)]
pub struct PairGuard {
    pair: Pair,
    held: Arc<Mutex<HashSet<Pair>>>,
}

impl PairGuard {
    /// The locked pair.
    pub fn pair(&self) -> &Pair {
        &self.pair
    }
}

impl Drop for PairGuard {
    fn drop(&mut self) {
        self.held.lock().remove(&self.pair);
    }
}
