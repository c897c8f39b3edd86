use smallvec::SmallVec;

use crate::engine::bridge::RequestKind;
use crate::engine::vertex::ComputeVertex;
use crate::graph::{GraphIndex, VertexMeta};
use crate::types::{EdgeDir, VertexId};

/// Everything one callback produced; drained by the worker after the callback returns.
pub(crate) struct CallbackOutput<M> {
    pub requests: SmallVec<[(VertexId, RequestKind); 4]>,
    pub messages: Vec<(VertexId, M)>,
    pub activations: SmallVec<[VertexId; 4]>,
}

impl<M> Default for CallbackOutput<M> {
    fn default() -> Self {
        Self {
            requests: SmallVec::new(),
            messages: Vec::new(),
            activations: SmallVec::new(),
        }
    }
}

impl<M> CallbackOutput<M> {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.messages.is_empty() && self.activations.is_empty()
    }
}

/// Handle given to every [`ComputeVertex`] callback.
///
/// Requests, messages and activations are buffered and only take effect once
/// the callback returns. Messages become visible in the next superstep.
pub struct VertexContext<'a, V: ComputeVertex> {
    id: VertexId,
    stage: V::Stage,
    superstep: u64,
    shared: &'a V::Shared,
    graph: &'a GraphIndex,
    out: &'a mut CallbackOutput<V::Message>,
}

impl<'a, V: ComputeVertex> VertexContext<'a, V> {
    pub(crate) fn new(
        id: VertexId,
        stage: V::Stage,
        superstep: u64,
        shared: &'a V::Shared,
        graph: &'a GraphIndex,
        out: &'a mut CallbackOutput<V::Message>,
    ) -> Self {
        Self {
            id,
            stage,
            superstep,
            shared,
            graph,
            out,
        }
    }

    /// The vertex this callback runs for.
    pub fn id(&self) -> VertexId {
        self.id
    }

    pub fn stage(&self) -> V::Stage {
        self.stage
    }

    /// Zero-based superstep within the current run.
    pub fn superstep(&self) -> u64 {
        self.superstep
    }

    pub fn shared(&self) -> &'a V::Shared {
        self.shared
    }

    /// Static vertex index of the graph.
    pub fn graph(&self) -> &'a GraphIndex {
        self.graph
    }

    /// Metadata of any vertex; never performs I/O.
    pub fn meta(&self, id: VertexId) -> VertexMeta {
        self.graph.meta(id)
    }

    pub fn num_edges(&self, id: VertexId) -> u32 {
        self.graph.num_edges(id)
    }

    /// Asks for this vertex's own edges in both directions.
    pub fn request_self(&mut self) {
        let id = self.id;
        self.push_request(id, RequestKind::Edges(EdgeDir::Both));
    }

    /// Asks for the edges of other vertices in both directions.
    pub fn request_vertices(&mut self, ids: &[VertexId]) {
        self.request_edges(ids, EdgeDir::Both);
    }

    pub fn request_edges(&mut self, ids: &[VertexId], dir: EdgeDir) {
        for &id in ids {
            self.push_request(id, RequestKind::Edges(dir));
        }
    }

    /// Asks only for edge counts; answered through `run_on_num_edges`.
    pub fn request_num_edges(&mut self, ids: &[VertexId]) {
        for &id in ids {
            self.push_request(id, RequestKind::NumEdges);
        }
    }

    fn push_request(&mut self, target: VertexId, kind: RequestKind) {
        assert!(
            target.index() < self.graph.vertex_count(),
            "request for vertex {target} out of range"
        );
        self.out.requests.push((target, kind));
    }

    /// Queues `msg` for `dest`; it is delivered in the next superstep.
    pub fn send(&mut self, dest: VertexId, msg: V::Message) {
        assert!(
            dest.index() < self.graph.vertex_count(),
            "message for vertex {dest} out of range"
        );
        self.out.messages.push((dest, msg));
    }

    /// Queues one copy of `msg` per destination.
    pub fn multicast<I>(&mut self, dests: I, msg: &V::Message)
    where
        I: IntoIterator<Item = VertexId>,
    {
        for dest in dests {
            self.send(dest, msg.clone());
        }
    }

    /// Schedules `id` to run.
    ///
    /// From a message callback the vertex joins the current superstep's
    /// dispatch; from any other callback it runs in the next superstep.
    pub fn activate(&mut self, id: VertexId) {
        assert!(
            id.index() < self.graph.vertex_count(),
            "activation of vertex {id} out of range"
        );
        self.out.activations.push(id);
    }
}
