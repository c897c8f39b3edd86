use crate::types::{EdgeDir, VertexId};

/// Read-only view of one vertex's adjacency lists.
///
/// The lists borrow a worker-local buffer filled from cached pages and live
/// only as long as the callback that receives them. Lists outside the
/// requested direction are empty; [`PageVertex::loaded`] tells which were read.
#[derive(Clone, Copy, Debug)]
pub struct PageVertex<'a> {
    id: VertexId,
    loaded: EdgeDir,
    in_edges: &'a [VertexId],
    out_edges: &'a [VertexId],
}

impl<'a> PageVertex<'a> {
    pub fn new(
        id: VertexId,
        loaded: EdgeDir,
        in_edges: &'a [VertexId],
        out_edges: &'a [VertexId],
    ) -> Self {
        Self {
            id,
            loaded,
            in_edges,
            out_edges,
        }
    }

    pub fn id(&self) -> VertexId {
        self.id
    }

    /// Which lists were read for this view.
    pub fn loaded(&self) -> EdgeDir {
        self.loaded
    }

    pub fn in_edges(&self) -> &'a [VertexId] {
        self.in_edges
    }

    pub fn out_edges(&self) -> &'a [VertexId] {
        self.out_edges
    }

    pub fn num_edges(&self, dir: EdgeDir) -> usize {
        match dir {
            EdgeDir::In => self.in_edges.len(),
            EdgeDir::Out => self.out_edges.len(),
            EdgeDir::Both => self.in_edges.len() + self.out_edges.len(),
        }
    }

    /// Edges in `dir`; `Both` yields the in-edges first.
    pub fn edges(&self, dir: EdgeDir) -> impl Iterator<Item = VertexId> + 'a {
        let (first, second): (&'a [VertexId], &'a [VertexId]) = match dir {
            EdgeDir::In => (self.in_edges, &[]),
            EdgeDir::Out => (self.out_edges, &[]),
            EdgeDir::Both => (self.in_edges, self.out_edges),
        };
        first.iter().chain(second.iter()).copied()
    }

    /// Sorted set of distinct neighbours over both directions.
    pub fn neighbors(&self) -> Vec<VertexId> {
        unique_merge(self.in_edges, self.out_edges)
    }
}

/// Merges two ascending lists into one ascending list without duplicates.
pub fn unique_merge(a: &[VertexId], b: &[VertexId]) -> Vec<VertexId> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        let next = match (a.get(i), b.get(j)) {
            (Some(&x), Some(&y)) if x < y => {
                i += 1;
                x
            }
            (Some(&x), Some(&y)) if y < x => {
                j += 1;
                y
            }
            (Some(&x), Some(_)) => {
                i += 1;
                j += 1;
                x
            }
            (Some(&x), None) => {
                i += 1;
                x
            }
            (None, Some(&y)) => {
                j += 1;
                y
            }
            (None, None) => break,
        };
        if out.last() != Some(&next) {
            out.push(next);
        }
    }
    out
}

/// Counts ids present in both ascending, duplicate-free lists.
pub fn count_common(a: &[VertexId], b: &[VertexId]) -> usize {
    let (mut i, mut j, mut common) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                common += 1;
                i += 1;
                j += 1;
            }
        }
    }
    common
}
