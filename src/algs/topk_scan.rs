//! Top-K local scan.
//!
//! The local scan of `v` is the number of distinct undirected edges inside
//! its closed neighbourhood: the `|N(v)|` edges to its neighbours plus every
//! edge between two neighbours. Computing it needs the edge list of every
//! neighbour, so most of the work goes into not computing it: a vertex only
//! reads its own edges while `degree²` could still beat the running maximum,
//! and only reads its neighbours' edges while a cheaper estimate still can.
//!
//! The driver first collects at least `k` exact scans from high-degree
//! vertices, then repeats passes bounded by the current k-th best scan until
//! that value stops changing.

use std::sync::Arc;

use tracing::{debug, info};

use crate::engine::{
    ComputeVertex, DegreeScheduler, GlobalMax, GraphEngine, KeepAll, MinEdgesFilter, RunSummary,
    Seed, TopKCollection, VertexContext, VertexFilter,
};
use crate::graph::{count_common, GraphIndex, PageVertex, VertexMeta};
use crate::types::{GraphError, Result, VertexId};

/// Upper bound on the local scan of a vertex, computed from metadata only.
pub trait ScanEstimator: Send + Sync {
    /// `neighbors` is the sorted, duplicate-free neighbour set of the vertex.
    fn estimate(&self, graph: &GraphIndex, neighbors: &[VertexId]) -> u64;
}

/// `|N| + Σ min(edges(u), |N|) / 2` over the neighbours `u`.
///
/// Every edge among neighbours is counted from both ends, and a neighbour
/// cannot share more than `|N|` vertices with `N` nor more than it has edges.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeighborDegreeEstimator;

impl ScanEstimator for NeighborDegreeEstimator {
    fn estimate(&self, graph: &GraphIndex, neighbors: &[VertexId]) -> u64 {
        let n = neighbors.len() as u64;
        let capped: u64 = neighbors
            .iter()
            .map(|&u| (graph.num_edges(u) as u64).min(n))
            .sum();
        n + capped / 2
    }
}

/// Never prunes.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnboundedEstimator;

impl ScanEstimator for UnboundedEstimator {
    fn estimate(&self, _graph: &GraphIndex, _neighbors: &[VertexId]) -> u64 {
        u64::MAX
    }
}

/// Aggregates shared by all top-K vertices.
pub struct TopKShared {
    /// Largest scan found since the last reset; the pruning bound.
    pub max: GlobalMax,
    /// Every exact scan found so far.
    pub known: TopKCollection,
    estimator: Box<dyn ScanEstimator>,
}

impl TopKShared {
    /// Empty aggregates pruned with `estimator`.
    pub fn new(estimator: Box<dyn ScanEstimator>) -> Self {
        Self {
            max: GlobalMax::default(),
            known: TopKCollection::new(),
            estimator,
        }
    }
}

impl Default for TopKShared {
    fn default() -> Self {
        Self::new(Box::new(NeighborDegreeEstimator))
    }
}

#[derive(Debug)]
struct PendingScan {
    neighbors: Vec<VertexId>,
    remaining: usize,
    common: u64,
}

/// Per-vertex top-K state.
#[derive(Debug)]
pub struct TopKVertex {
    num_edges: u32,
    estimate: Option<u64>,
    scan: Option<u64>,
    pending: Option<PendingScan>,
}

impl TopKVertex {
    /// Exact local scan, once computed.
    pub fn scan(&self) -> Option<u64> {
        self.scan
    }

    /// Cached upper bound, once computed.
    pub fn estimate(&self) -> Option<u64> {
        self.estimate
    }

    fn finish(&mut self, ctx: &mut VertexContext<'_, Self>, scan: u64) {
        self.scan = Some(scan);
        self.pending = None;
        let shared = ctx.shared();
        if shared.max.update(scan) {
            debug!(vertex = ctx.id().0, scan, "topk.new_max");
        }
        shared.known.add(ctx.id(), scan);
    }
}

impl ComputeVertex for TopKVertex {
    type Message = ();
    type Stage = ();
    type Shared = TopKShared;

    fn new(_id: VertexId, meta: &VertexMeta) -> Self {
        Self {
            num_edges: meta.num_edges(),
            estimate: None,
            scan: None,
            pending: None,
        }
    }

    fn run(&mut self, ctx: &mut VertexContext<'_, Self>) {
        if self.scan.is_some() {
            return;
        }
        let max = ctx.shared().max.get();
        let worth_reading = match self.estimate {
            Some(est) => est > max,
            None => {
                let deg = self.num_edges as u64;
                deg.saturating_mul(deg) >= max
            }
        };
        if worth_reading {
            ctx.request_self();
        }
    }

    fn run_on_vertex(&mut self, ctx: &mut VertexContext<'_, Self>, vertex: &PageVertex<'_>) {
        if vertex.id() == ctx.id() {
            let neighbors = vertex.neighbors();
            if neighbors.is_empty() {
                self.scan = Some(0);
                return;
            }
            let est = *self.estimate.get_or_insert_with(|| {
                ctx.shared().estimator.estimate(ctx.graph(), &neighbors)
            });
            if est < ctx.shared().max.get() {
                return;
            }
            ctx.request_vertices(&neighbors);
            self.pending = Some(PendingScan {
                remaining: neighbors.len(),
                neighbors,
                common: 0,
            });
            return;
        }

        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        pending.common += count_common(&vertex.neighbors(), &pending.neighbors) as u64;
        pending.remaining -= 1;
        if pending.remaining == 0 {
            let scan = pending.neighbors.len() as u64 + pending.common / 2;
            self.finish(ctx, scan);
        }
    }
}

/// Parameters of a top-K run.
#[derive(Clone, Copy, Debug)]
pub struct TopKConfig {
    /// Number of vertices to report.
    pub k: usize,
    /// Edge threshold for the first discovery pass.
    pub min_edges: u32,
}

impl Default for TopKConfig {
    fn default() -> Self {
        Self {
            k: 1,
            min_edges: 1000,
        }
    }
}

/// Result of [`run_topk_scan`].
#[derive(Clone, Debug)]
pub struct TopKOutput {
    /// The `k` largest scans, largest first, ties by id.
    pub top: Vec<(VertexId, u64)>,
    /// One summary per engine run, discovery passes first.
    pub passes: Vec<RunSummary>,
}

/// Finds the `k` vertices with the largest local scan.
pub fn run_topk_scan(
    engine: &mut GraphEngine<TopKVertex>,
    config: TopKConfig,
) -> Result<TopKOutput> {
    if config.k == 0 {
        return Err(GraphError::Invalid("k must be at least 1"));
    }
    engine.set_scheduler(Arc::new(DegreeScheduler::default()));
    let mut passes = Vec::new();

    let mut min_edges = config.min_edges;
    while engine.shared().known.len() < config.k {
        let before = engine.shared().known.len();
        let filter: Arc<dyn VertexFilter<TopKVertex>> = if min_edges > 0 {
            Arc::new(MinEdgesFilter { min_edges })
        } else {
            Arc::new(KeepAll)
        };
        let summary = engine.run(Seed::All, filter, ())?;
        engine.shared().max.reset(0);
        let known = engine.shared().known.len();
        info!(
            min_edges,
            ran = summary.vertices_run,
            known,
            "topk.discovery_pass"
        );
        passes.push(summary);
        if known == before {
            if min_edges == 0 {
                return Err(GraphError::Invalid(
                    "graph has fewer than k vertices with a non-zero local scan",
                ));
            }
            min_edges = 0;
        }
    }

    loop {
        let (_, prev) = engine.shared().known.kth_largest(config.k - 1)?;
        engine.shared().max.reset(prev);
        let filter = move |_id: VertexId, meta: &VertexMeta, state: &TopKVertex| {
            let deg = meta.num_edges() as u64;
            state.scan.is_none() && deg.saturating_mul(deg) >= prev
        };
        let summary = engine.run(Seed::All, Arc::new(filter), ())?;
        passes.push(summary);
        let (_, now) = engine.shared().known.kth_largest(config.k - 1)?;
        info!(bound = prev, kth = now, ran = summary.vertices_run, "topk.refine_pass");
        // A pass that found nothing above the bound pruned only with the bound
        // itself, so no unscanned vertex can beat the k-th score.
        if engine.shared().max.get() == prev {
            break;
        }
    }

    let top = engine.shared().known.top(config.k);
    Ok(TopKOutput { top, passes })
}
