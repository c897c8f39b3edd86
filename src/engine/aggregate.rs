//! Values shared by every worker of a run.
//!
//! These are the only objects many vertices mutate concurrently. Every
//! operation holds its critical section for a handful of instructions and
//! never performs I/O while holding it.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::types::{GraphError, Result, VertexId};

/// Monotonic running maximum.
#[derive(Debug, Default)]
pub struct GlobalMax {
    value: AtomicU64,
}

impl GlobalMax {
    pub fn new(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
        }
    }

    /// Installs `candidate` iff it is strictly greater than the current value.
    ///
    /// Returns whether this call installed it. A caller racing with a larger
    /// update observes the larger value and leaves it untouched.
    pub fn update(&self, candidate: u64) -> bool {
        let mut current = self.value.load(Ordering::Acquire);
        while candidate > current {
            match self.value.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(seen) => current = seen,
            }
        }
        false
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Overwrites the value; only the driver calls this, between runs.
    pub fn reset(&self, value: u64) {
        self.value.store(value, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct Scores {
    entries: Vec<(VertexId, u64)>,
    sorted: bool,
}

impl Scores {
    fn ensure_sorted(&mut self) {
        if !self.sorted {
            self.entries
                .sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            self.sorted = true;
        }
    }
}

/// Collection of `(vertex, score)` pairs sorted on demand.
///
/// Order is by score descending, then id ascending. Sorting happens on the
/// first read after an `add`.
#[derive(Debug, Default)]
pub struct TopKCollection {
    inner: Mutex<Scores>,
}

impl TopKCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: VertexId, score: u64) {
        let mut scores = self.inner.lock();
        scores.entries.push((id, score));
        scores.sorted = false;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `k`-th largest entry, 0-indexed.
    pub fn kth_largest(&self, k: usize) -> Result<(VertexId, u64)> {
        let mut scores = self.inner.lock();
        scores.ensure_sorted();
        scores
            .entries
            .get(k)
            .copied()
            .ok_or(GraphError::Contract("fewer than k+1 scores collected"))
    }

    /// Up to `k` largest entries in order.
    pub fn top(&self, k: usize) -> Vec<(VertexId, u64)> {
        let mut scores = self.inner.lock();
        scores.ensure_sorted();
        scores.entries.iter().take(k).copied().collect()
    }

    pub fn clear(&self) {
        let mut scores = self.inner.lock();
        scores.entries.clear();
        scores.sorted = true;
    }
}
