//! Turns vertex data requests into page reads and deferred callbacks.
//!
//! A callback never blocks on I/O: its requests are queued here and the
//! engine resolves them in waves after the dispatch phase. Each wave hands
//! out requests grouped by requester, in the order that requester issued
//! them, with groups ordered by the file position of their first target so
//! neighbouring vertices hit the same cached pages.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::engine::cancel::CancellationToken;
use crate::engine::profile::EngineProfile;
use crate::graph::format::EDGE_ID_LEN;
use crate::graph::{GraphIndex, PageVertex};
use crate::primitives::pager::PageCache;
use crate::types::{EdgeDir, Result, VertexId};

/// What a request asks for.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RequestKind {
    /// Adjacency lists in the given direction.
    Edges(EdgeDir),
    /// Only the in+out edge count.
    NumEdges,
}

/// One accepted request.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct IoRequest {
    pub requester: VertexId,
    pub target: VertexId,
    pub kind: RequestKind,
}

/// Requests of one requester, in issue order.
pub(crate) struct RequestGroup {
    pub requester: VertexId,
    pub requests: Vec<IoRequest>,
}

/// Worker-local buffers that back [`PageVertex`] views.
#[derive(Default)]
pub(crate) struct EdgeScratch {
    bytes: Vec<u8>,
    ids: Vec<VertexId>,
}

pub(crate) struct IoBridge {
    cache: Arc<PageCache>,
    graph: Arc<GraphIndex>,
    pending: Mutex<Vec<IoRequest>>,
    seen: Mutex<FxHashSet<IoRequest>>,
}

impl IoBridge {
    pub fn new(cache: Arc<PageCache>, graph: Arc<GraphIndex>) -> Self {
        Self {
            cache,
            graph,
            pending: Mutex::new(Vec::new()),
            seen: Mutex::new(FxHashSet::default()),
        }
    }

    /// Queues the requests of one callback.
    ///
    /// Repeats of a (requester, target, kind) already accepted this superstep
    /// are dropped. Nothing is queued once the run is cancelled.
    pub fn submit<I>(
        &self,
        requester: VertexId,
        requests: I,
        cancel: &CancellationToken,
        profile: &EngineProfile,
    ) where
        I: IntoIterator<Item = (VertexId, RequestKind)>,
    {
        if cancel.is_cancelled() {
            return;
        }
        let mut accepted = Vec::new();
        let mut repeats = 0u64;
        {
            let mut seen = self.seen.lock();
            for (target, kind) in requests {
                let req = IoRequest {
                    requester,
                    target,
                    kind,
                };
                if seen.insert(req) {
                    accepted.push(req);
                } else {
                    repeats += 1;
                }
            }
        }
        EngineProfile::add(&profile.requests_issued, accepted.len() as u64);
        EngineProfile::add(&profile.requests_deduplicated, repeats);
        if !accepted.is_empty() {
            self.pending.lock().append(&mut accepted);
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Takes everything queued so far as one wave.
    pub fn take_wave(&self) -> Vec<RequestGroup> {
        let pending = std::mem::take(&mut *self.pending.lock());
        let mut slots: FxHashMap<VertexId, usize> = FxHashMap::default();
        let mut groups: Vec<RequestGroup> = Vec::new();
        for req in pending {
            let slot = *slots.entry(req.requester).or_insert_with(|| {
                groups.push(RequestGroup {
                    requester: req.requester,
                    requests: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].requests.push(req);
        }
        groups.sort_by_cached_key(|g| {
            g.requests
                .first()
                .map(|r| self.graph.meta(r.target).offset)
                .unwrap_or(0)
        });
        groups
    }

    /// Forgets which requests were accepted; called at every superstep barrier.
    pub fn end_superstep(&self) {
        self.seen.lock().clear();
    }

    /// Drops queued requests and the dedup memory.
    pub fn clear(&self) {
        self.pending.lock().clear();
        self.seen.lock().clear();
    }

    /// Reads the `dir` lists of `target` into `scratch` and returns a view over them.
    pub fn load<'s>(
        &self,
        target: VertexId,
        dir: EdgeDir,
        scratch: &'s mut EdgeScratch,
    ) -> Result<PageVertex<'s>> {
        let meta = self.graph.meta(target);
        let (start, len) = self
            .graph
            .location(target, dir, self.cache.page_size());
        scratch.bytes.resize(len as usize, 0);
        self.cache.read_range(start, &mut scratch.bytes)?;
        scratch.ids.clear();
        scratch.ids.extend(
            scratch
                .bytes
                .chunks_exact(EDGE_ID_LEN as usize)
                .map(|raw| VertexId(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))),
        );
        let split = match dir {
            EdgeDir::In => scratch.ids.len(),
            EdgeDir::Out => 0,
            EdgeDir::Both => meta.in_degree as usize,
        };
        let (ins, outs) = scratch.ids.split_at(split);
        Ok(PageVertex::new(target, dir, ins, outs))
    }
}
