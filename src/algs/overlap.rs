//! Neighbourhood overlap of a chosen vertex set.
//!
//! Each chosen vertex reads its own edges and publishes its closed
//! neighbourhood (itself plus its distinct neighbours) to a shared table.
//! The union and intersection of all published neighbourhoods are folded in
//! as they arrive. After the run the driver compares every pair.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::info;

use crate::engine::{ComputeVertex, GraphEngine, KeepAll, RunSummary, Seed, VertexContext};
use crate::graph::{count_common, PageVertex, VertexMeta};
use crate::types::{GraphError, Result, VertexId};

/// Neighbourhoods published by the chosen vertices.
#[derive(Default)]
pub struct OverlapShared {
    neighborhoods: Mutex<FxHashMap<VertexId, Arc<Vec<VertexId>>>>,
    union: Mutex<FxHashSet<VertexId>>,
    intersection: Mutex<Option<Vec<VertexId>>>,
}

impl OverlapShared {
    fn publish(&self, id: VertexId, closed: Vec<VertexId>) {
        self.union.lock().extend(closed.iter().copied());
        {
            let mut inter = self.intersection.lock();
            *inter = Some(match inter.take() {
                None => closed.clone(),
                Some(current) => intersect(&current, &closed),
            });
        }
        self.neighborhoods.lock().insert(id, Arc::new(closed));
    }

    /// Closed neighbourhood of `id`, if it was published.
    pub fn neighborhood(&self, id: VertexId) -> Option<Arc<Vec<VertexId>>> {
        self.neighborhoods.lock().get(&id).cloned()
    }

    pub fn union_size(&self) -> usize {
        self.union.lock().len()
    }

    /// Vertices present in every published neighbourhood, ascending.
    pub fn intersection(&self) -> Vec<VertexId> {
        self.intersection.lock().clone().unwrap_or_default()
    }

    fn clear(&self) {
        self.neighborhoods.lock().clear();
        self.union.lock().clear();
        *self.intersection.lock() = None;
    }
}

fn intersect(a: &[VertexId], b: &[VertexId]) -> Vec<VertexId> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::new();
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Per-vertex overlap state; the work happens in the shared table.
#[derive(Debug, Default)]
pub struct OverlapVertex;

impl ComputeVertex for OverlapVertex {
    type Message = ();
    type Stage = ();
    type Shared = OverlapShared;

    fn new(_id: VertexId, _meta: &VertexMeta) -> Self {
        OverlapVertex
    }

    fn run(&mut self, ctx: &mut VertexContext<'_, Self>) {
        ctx.request_self();
    }

    fn run_on_vertex(&mut self, ctx: &mut VertexContext<'_, Self>, vertex: &PageVertex<'_>) {
        let mut closed = vertex.neighbors();
        let id = ctx.id();
        if let Err(pos) = closed.binary_search(&id) {
            closed.insert(pos, id);
        }
        ctx.shared().publish(id, closed);
    }
}

/// Overlap of one pair of chosen vertices.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PairOverlap {
    pub a: VertexId,
    pub b: VertexId,
    pub common: usize,
    pub union: usize,
    /// `common / union`.
    pub overlap: f64,
}

/// Result of [`compute_overlap`].
#[derive(Clone, Debug)]
pub struct OverlapReport {
    /// Every unordered pair, in the order the vertices were given.
    pub pairs: Vec<PairOverlap>,
    /// Vertices shared by all neighbourhoods.
    pub intersection: Vec<VertexId>,
    /// Size of the union of all neighbourhoods.
    pub union_size: usize,
    pub summary: RunSummary,
}

/// Computes pairwise neighbourhood overlap for `vertices`.
pub fn compute_overlap(
    engine: &mut GraphEngine<OverlapVertex>,
    vertices: &[VertexId],
) -> Result<OverlapReport> {
    let mut chosen = vertices.to_vec();
    chosen.sort_unstable();
    chosen.dedup();
    if chosen.len() != vertices.len() {
        return Err(GraphError::Invalid("overlap vertices must be distinct"));
    }
    engine.shared().clear();
    let summary = engine.run(Seed::Subset(vertices.to_vec()), Arc::new(KeepAll), ())?;

    let shared = engine.shared();
    let mut hoods = Vec::with_capacity(vertices.len());
    for &v in vertices {
        let hood = shared
            .neighborhood(v)
            .ok_or(GraphError::Contract("neighbourhood missing after run"))?;
        hoods.push(hood);
    }
    let mut pairs = Vec::new();
    for i in 0..vertices.len() {
        for j in i + 1..vertices.len() {
            let common = count_common(&hoods[i], &hoods[j]);
            let union = hoods[i].len() + hoods[j].len() - common;
            pairs.push(PairOverlap {
                a: vertices[i],
                b: vertices[j],
                common,
                union,
                overlap: common as f64 / union as f64,
            });
        }
    }
    let report = OverlapReport {
        pairs,
        intersection: shared.intersection(),
        union_size: shared.union_size(),
        summary,
    };
    info!(
        vertices = vertices.len(),
        common = report.intersection.len(),
        covered = report.union_size,
        "overlap.done"
    );
    Ok(report)
}
