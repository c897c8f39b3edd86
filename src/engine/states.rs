use parking_lot::{Mutex, MutexGuard};

use crate::graph::GraphIndex;
use crate::graph::VertexMeta;
use crate::types::VertexId;

struct Partition<V> {
    slots: Box<[Mutex<V>]>,
}

/// Per-vertex compute state split across NUMA partitions.
///
/// Vertex `id` lives in partition `id % partitions` at slot `id / partitions`.
/// Each slot has its own lock; the engine only ever takes the lock of the
/// vertex whose callback is running, so a vertex never runs on two threads
/// at once.
pub struct VertexIndex<V> {
    partitions: Box<[Partition<V>]>,
    len: usize,
}

impl<V> VertexIndex<V> {
    /// Creates one state per vertex of `graph` with `init`.
    pub fn build<F>(graph: &GraphIndex, partitions: usize, mut init: F) -> Self
    where
        F: FnMut(VertexId, &VertexMeta) -> V,
    {
        let partitions = partitions.max(1);
        let len = graph.vertex_count();
        let mut parts: Vec<Vec<Mutex<V>>> = (0..partitions)
            .map(|p| Vec::with_capacity(len / partitions + usize::from(p < len % partitions)))
            .collect();
        for id in graph.vertices() {
            let meta = graph.meta(id);
            parts[id.index() % partitions].push(Mutex::new(init(id, &meta)));
        }
        Self {
            partitions: parts
                .into_iter()
                .map(|slots| Partition {
                    slots: slots.into_boxed_slice(),
                })
                .collect(),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Partition holding `id`.
    #[inline]
    pub fn partition_of(&self, id: VertexId) -> usize {
        id.index() % self.partitions.len()
    }

    /// Locks the state of `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    #[inline]
    pub fn get(&self, id: VertexId) -> MutexGuard<'_, V> {
        assert!(
            id.index() < self.len,
            "vertex {id} out of range (index holds {} vertices)",
            self.len
        );
        let n = self.partitions.len();
        self.partitions[id.index() % n].slots[id.index() / n].lock()
    }
}
