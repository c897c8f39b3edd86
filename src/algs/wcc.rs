//! Weakly connected components by label propagation.
//!
//! Every vertex starts labelled with its own id. While its label keeps
//! changing it reads its edges and multicasts the label to all neighbours;
//! receivers keep the smallest label seen. Labels only ever decrease, so the
//! propagation reaches a fixed point. A second pass marks vertices without
//! edges as unlabelled.

use std::sync::Arc;

use tracing::info;

use crate::engine::{
    ComputeVertex, GraphEngine, KeepAll, RunSummary, Seed, VertexContext, VertexQuery,
};
use crate::graph::{PageVertex, VertexMeta};
use crate::types::{Result, VertexId};

/// Phase of a WCC computation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WccStage {
    /// Propagate minimum labels to a fixed point.
    FindComponents,
    /// Flag vertices that have no edges at all.
    RemoveEmpty,
}

/// Per-vertex WCC state.
#[derive(Debug)]
pub struct WccVertex {
    label: VertexId,
    updated: bool,
    empty: bool,
}

impl WccVertex {
    pub fn label(&self) -> VertexId {
        self.label
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }
}

impl ComputeVertex for WccVertex {
    type Message = VertexId;
    type Stage = WccStage;
    type Shared = ();

    fn new(id: VertexId, _meta: &VertexMeta) -> Self {
        Self {
            label: id,
            updated: true,
            empty: false,
        }
    }

    fn run(&mut self, ctx: &mut VertexContext<'_, Self>) {
        match ctx.stage() {
            WccStage::FindComponents => {
                if self.updated {
                    self.updated = false;
                    ctx.request_self();
                }
            }
            WccStage::RemoveEmpty => {
                let id = ctx.id();
                ctx.request_num_edges(&[id]);
            }
        }
    }

    fn run_on_vertex(&mut self, ctx: &mut VertexContext<'_, Self>, vertex: &PageVertex<'_>) {
        let label = self.label;
        ctx.multicast(vertex.neighbors(), &label);
    }

    fn run_on_message(&mut self, _ctx: &mut VertexContext<'_, Self>, msg: &VertexId) {
        if *msg < self.label {
            self.label = *msg;
            self.updated = true;
        }
    }

    fn run_on_num_edges(&mut self, _ctx: &mut VertexContext<'_, Self>, _id: VertexId, n: u32) {
        self.empty = n == 0;
    }
}

/// Final label of a vertex, `None` for vertices without edges.
#[derive(Clone, Copy, Debug, Default)]
pub struct ComponentLabel;

impl VertexQuery<WccVertex> for ComponentLabel {
    type Output = Option<VertexId>;

    fn query(&self, _id: VertexId, state: &WccVertex) -> Option<VertexId> {
        (!state.empty).then_some(state.label)
    }
}

/// Result of [`compute_wcc`].
#[derive(Clone, Debug)]
pub struct WccOutput {
    /// Component label per vertex, indexed by id.
    pub labels: Vec<Option<VertexId>>,
    /// Number of distinct labels among vertices with edges.
    pub components: usize,
    pub find: RunSummary,
    pub remove_empty: RunSummary,
}

/// Runs both WCC stages on a fresh engine.
pub fn compute_wcc(engine: &mut GraphEngine<WccVertex>) -> Result<WccOutput> {
    let find = engine.run(Seed::All, Arc::new(KeepAll), WccStage::FindComponents)?;
    info!(
        supersteps = find.supersteps,
        messages = find.messages,
        "wcc.components_found"
    );
    let remove_empty = engine.run(Seed::All, Arc::new(KeepAll), WccStage::RemoveEmpty)?;
    let labels = engine.query_on_all(&ComponentLabel)?;

    let mut roots: Vec<VertexId> = labels.iter().flatten().copied().collect();
    roots.sort_unstable();
    roots.dedup();
    info!(components = roots.len(), "wcc.done");
    Ok(WccOutput {
        labels,
        components: roots.len(),
        find,
        remove_empty,
    })
}
