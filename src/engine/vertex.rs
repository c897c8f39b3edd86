use crate::engine::context::VertexContext;
use crate::graph::{PageVertex, VertexMeta};
use crate::types::{GraphError, Result, VertexId};

/// Per-vertex program run by the engine.
///
/// The engine owns one value of the implementing type per vertex and calls
/// these methods only from that vertex's own callbacks, one at a time.
/// Anything a vertex wants to know about another vertex must arrive through
/// an edge request or a message.
pub trait ComputeVertex: Send + Sized + 'static {
    /// Payload exchanged between vertices.
    type Message: Clone + Send + Sync + 'static;
    /// Driver-selected phase, passed to every callback of a run.
    type Stage: Copy + Send + Sync + 'static;
    /// State shared by all vertices, usually global aggregates.
    type Shared: Send + Sync + 'static;

    fn new(id: VertexId, meta: &VertexMeta) -> Self;

    /// Called once per superstep while the vertex is active.
    fn run(&mut self, ctx: &mut VertexContext<'_, Self>);

    /// Called once for every accepted edge request, with the requested lists.
    fn run_on_vertex(&mut self, ctx: &mut VertexContext<'_, Self>, vertex: &PageVertex<'_>);

    /// Called for each message sent to this vertex during the previous superstep.
    fn run_on_message(&mut self, ctx: &mut VertexContext<'_, Self>, msg: &Self::Message) {
        let _ = (ctx, msg);
    }

    /// Called for every accepted edge count request.
    fn run_on_num_edges(
        &mut self,
        ctx: &mut VertexContext<'_, Self>,
        id: VertexId,
        num_edges: u32,
    ) {
        let _ = (ctx, id, num_edges);
    }

    /// Called when reading the edges of `target` failed.
    ///
    /// Returning an error aborts the run with it; the default does so.
    fn run_on_io_error(
        &mut self,
        ctx: &mut VertexContext<'_, Self>,
        target: VertexId,
        err: GraphError,
    ) -> Result<()> {
        let _ = (ctx, target);
        Err(err)
    }
}
