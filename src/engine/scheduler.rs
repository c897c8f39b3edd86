use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::engine::vertex::ComputeVertex;
use crate::graph::{GraphIndex, VertexMeta};
use crate::types::{EdgeDir, VertexId};

/// Orders the active set before dispatch.
pub trait VertexScheduler: Send + Sync {
    /// Reorders `active` in place. `active` arrives sorted by id.
    fn schedule(&self, graph: &GraphIndex, active: &mut [VertexId]);

    fn name(&self) -> &'static str;
}

/// Keeps ascending id order.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityScheduler;

impl VertexScheduler for IdentityScheduler {
    fn schedule(&self, _graph: &GraphIndex, _active: &mut [VertexId]) {}

    fn name(&self) -> &'static str {
        "identity"
    }
}

/// Largest degree first, ties by ascending id.
#[derive(Clone, Copy, Debug, Default)]
pub struct DegreeScheduler {
    pub dir: EdgeDir,
}

impl VertexScheduler for DegreeScheduler {
    fn schedule(&self, graph: &GraphIndex, active: &mut [VertexId]) {
        active.sort_by_cached_key(|&id| (std::cmp::Reverse(graph.degree(id, self.dir)), id));
    }

    fn name(&self) -> &'static str {
        "degree-desc"
    }
}

/// Decides whether an active vertex runs in the current superstep.
///
/// Consulted right before each `run` call with the vertex's state locked.
pub trait VertexFilter<V: ComputeVertex>: Send + Sync {
    fn keep(&self, id: VertexId, meta: &VertexMeta, state: &V) -> bool;
}

/// Runs every active vertex.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeepAll;

impl<V: ComputeVertex> VertexFilter<V> for KeepAll {
    fn keep(&self, _id: VertexId, _meta: &VertexMeta, _state: &V) -> bool {
        true
    }
}

/// Keeps vertices with at least `min_edges` edges in both directions combined.
#[derive(Clone, Copy, Debug)]
pub struct MinEdgesFilter {
    pub min_edges: u32,
}

impl<V: ComputeVertex> VertexFilter<V> for MinEdgesFilter {
    fn keep(&self, _id: VertexId, meta: &VertexMeta, _state: &V) -> bool {
        meta.num_edges() >= self.min_edges
    }
}

impl<V, F> VertexFilter<V> for F
where
    V: ComputeVertex,
    F: Fn(VertexId, &VertexMeta, &V) -> bool + Send + Sync,
{
    fn keep(&self, id: VertexId, meta: &VertexMeta, state: &V) -> bool {
        self(id, meta, state)
    }
}

/// How the first active set of a run is chosen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Seed {
    /// Every vertex of the graph.
    #[default]
    All,
    /// Exactly these vertices.
    Subset(Vec<VertexId>),
}

/// Vertices scheduled for the next dispatch, at most once each.
pub struct ActivationSet {
    words: Box<[AtomicU64]>,
    count: AtomicUsize,
    len: usize,
}

impl ActivationSet {
    pub fn new(len: usize) -> Self {
        Self {
            words: (0..len.div_ceil(64)).map(|_| AtomicU64::new(0)).collect(),
            count: AtomicUsize::new(0),
            len,
        }
    }

    /// Marks `id`; returns false if it was already marked.
    pub fn activate(&self, id: VertexId) -> bool {
        let idx = id.index();
        assert!(idx < self.len, "activation of vertex {id} out of range");
        let bit = 1u64 << (idx % 64);
        let prev = self.words[idx / 64].fetch_or(bit, Ordering::AcqRel);
        let fresh = prev & bit == 0;
        if fresh {
            self.count.fetch_add(1, Ordering::AcqRel);
        }
        fresh
    }

    pub fn activate_all(&self) {
        for id in 0..self.len as u32 {
            self.activate(VertexId(id));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count.load(Ordering::Acquire) == 0
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Clears the set and returns its members in ascending order.
    pub fn drain(&self) -> Vec<VertexId> {
        let mut out = Vec::with_capacity(self.len());
        for (w, word) in self.words.iter().enumerate() {
            let mut bits = word.swap(0, Ordering::AcqRel);
            while bits != 0 {
                let bit = bits.trailing_zeros() as usize;
                out.push(VertexId((w * 64 + bit) as u32));
                bits &= bits - 1;
            }
        }
        self.count.fetch_sub(out.len(), Ordering::AcqRel);
        out
    }
}
