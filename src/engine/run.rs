//! Superstep loop executed on the driver thread.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};

use rayon::BroadcastContext;
use tracing::{debug, info, warn};

use crate::engine::bridge::{EdgeScratch, RequestGroup, RequestKind};
use crate::engine::context::{CallbackOutput, VertexContext};
use crate::engine::messaging::Inbox;
use crate::engine::profile::{write_profile, EngineProfile, RunSummary};
use crate::engine::scheduler::{VertexFilter, VertexScheduler};
use crate::engine::vertex::ComputeVertex;
use crate::engine::EngineCore;
use crate::types::{GraphError, Result, VertexId};

/// Vertices handed to a worker at a time.
const CHUNK: usize = 64;

pub(crate) struct RunPlan<V: ComputeVertex> {
    pub filter: Arc<dyn VertexFilter<V>>,
    pub scheduler: Arc<dyn VertexScheduler>,
    pub stage: V::Stage,
}

/// Per-worker buffers and counters for one phase.
struct WorkerLocal<M> {
    worker: usize,
    out: CallbackOutput<M>,
    scratch: EdgeScratch,
    ran: u64,
    filtered: u64,
    delivered: u64,
    deliveries: u64,
    io_errors: u64,
}

impl<M> WorkerLocal<M> {
    fn new(worker: usize) -> Self {
        Self {
            worker,
            out: CallbackOutput::default(),
            scratch: EdgeScratch::default(),
            ran: 0,
            filtered: 0,
            delivered: 0,
            deliveries: 0,
            io_errors: 0,
        }
    }
}

/// Work split into lists with one shared cursor each.
///
/// A worker drains its home list first and then helps with the others.
struct WorkQueue<T> {
    lists: Vec<Vec<T>>,
    cursors: Vec<AtomicUsize>,
}

impl<T> WorkQueue<T> {
    fn new(lists: Vec<Vec<T>>) -> Self {
        let cursors = lists.iter().map(|_| AtomicUsize::new(0)).collect();
        Self { lists, cursors }
    }

    fn next(&self, home: usize) -> Option<&[T]> {
        let n = self.lists.len();
        for k in 0..n {
            let p = (home + k) % n;
            let list = &self.lists[p];
            if self.cursors[p].load(Ordering::Relaxed) >= list.len() {
                continue;
            }
            let start = self.cursors[p].fetch_add(CHUNK, Ordering::Relaxed);
            if start < list.len() {
                return Some(&list[start..(start + CHUNK).min(list.len())]);
            }
        }
        None
    }
}

/// Runs one full run to quiescence, then reports and cleans up.
pub(crate) fn execute<V: ComputeVertex>(core: &EngineCore<V>, plan: RunPlan<V>) -> Result<RunSummary> {
    let started = Instant::now();
    let before = core.profile.snapshot(false);
    debug!(scheduler = plan.scheduler.name(), "engine.run.start");

    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| run_supersteps(core, &plan))) {
        Ok(result) => result,
        Err(payload) => Err(GraphError::VertexFault(panic_message(payload.as_ref()))),
    };

    core.messages.clear();
    core.bridge.clear();
    core.activations.drain();
    core.reset_fault();

    let delta = core.profile.snapshot(false).since(&before);
    let summary = RunSummary::from_delta(&delta, started.elapsed());
    let status = match &outcome {
        Ok(()) => "completed",
        Err(GraphError::Cancelled) => "cancelled",
        Err(_) => "failed",
    };
    report(core, status, &summary);
    outcome.map(|()| summary)
}

fn report<V: ComputeVertex>(core: &EngineCore<V>, status: &str, summary: &RunSummary) {
    info!(
        status,
        supersteps = summary.supersteps,
        activated = summary.vertices_activated,
        ran = summary.vertices_run,
        filtered = summary.vertices_filtered,
        requests = summary.requests,
        deliveries = summary.deliveries,
        messages = summary.messages,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "engine.run.done"
    );
    let cache = core.cache.stats();
    if core.config.print_io_stats {
        info!(
            hits = cache.hits,
            misses = cache.misses,
            evictions = cache.evictions,
            bytes_read = cache.bytes_read,
            resident = core.cache.resident(),
            "cache.stats"
        );
    }
    if let Some(path) = core.config.profile_path.as_deref() {
        if let Err(err) = write_profile(path, status, core.profile.snapshot(false), cache) {
            warn!(path = %path.display(), error = %err, "engine.profile.write_failed");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "vertex callback panicked".to_string()
    }
}

fn run_supersteps<V: ComputeVertex>(core: &EngineCore<V>, plan: &RunPlan<V>) -> Result<()> {
    let mut inbox: Inbox<V::Message> = Inbox::default();
    let mut superstep = 0u64;
    loop {
        if core.cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        if inbox.is_empty() && core.activations.is_empty() {
            debug!(superstep, "engine.quiescent");
            return Ok(());
        }
        if let Some(limit) = core.config.max_supersteps {
            if superstep >= limit {
                warn!(limit, "engine.max_supersteps_reached");
                return Err(GraphError::Invalid("run did not quiesce within max_supersteps"));
            }
        }

        let messages = inbox.len();
        deliver(core, plan, &inbox, superstep);
        drop(inbox);
        core.check_fault()?;

        let mut active = core.activations.drain();
        plan.scheduler.schedule(&core.graph, &mut active);
        EngineProfile::add(&core.profile.vertices_activated, active.len() as u64);
        let activated = active.len();
        dispatch(core, plan, active, superstep);
        core.check_fault()?;

        let mut waves = 0u64;
        while core.bridge.has_pending() {
            if core.cancel.is_cancelled() {
                return Err(GraphError::Cancelled);
            }
            let wave = core.bridge.take_wave();
            resolve(core, plan, wave, superstep);
            core.check_fault()?;
            waves += 1;
        }

        core.bridge.end_superstep();
        inbox = core.messages.drain();
        EngineProfile::add(&core.profile.supersteps, 1);
        debug!(
            superstep,
            activated,
            delivered = messages,
            io_waves = waves,
            queued = inbox.len(),
            "engine.superstep"
        );
        superstep += 1;
    }
}

/// Runs `body` on every pool worker, each with its own [`WorkerLocal`].
fn broadcast<V, F>(core: &EngineCore<V>, body: F)
where
    V: ComputeVertex,
    F: Fn(&mut WorkerLocal<V::Message>, usize) + Sync,
{
    core.pool.broadcast(|ctx: BroadcastContext<'_>| {
        let mut local = WorkerLocal::new(ctx.index());
        body(&mut local, ctx.index());
        let profile = &core.profile;
        EngineProfile::add(&profile.vertices_run, local.ran);
        EngineProfile::add(&profile.vertices_filtered, local.filtered);
        EngineProfile::add(&profile.messages_delivered, local.delivered);
        EngineProfile::add(&profile.deliveries, local.deliveries);
        EngineProfile::add(&profile.io_errors, local.io_errors);
    });
}

/// Calls `f` with a fresh context for `id`, then publishes what the callback produced.
fn with_context<V, F>(
    core: &EngineCore<V>,
    plan: &RunPlan<V>,
    local: &mut WorkerLocal<V::Message>,
    id: VertexId,
    superstep: u64,
    f: F,
) where
    V: ComputeVertex,
    F: FnOnce(&mut VertexContext<'_, V>, &mut EdgeScratch),
{
    let result = {
        let WorkerLocal { out, scratch, .. } = local;
        let mut ctx = VertexContext::new(id, plan.stage, superstep, &core.shared, &core.graph, out);
        panic::catch_unwind(AssertUnwindSafe(|| f(&mut ctx, scratch)))
    };
    if let Err(payload) = result {
        local.out = CallbackOutput::default();
        core.fail(GraphError::VertexFault(format!(
            "vertex {id}: {}",
            panic_message(payload.as_ref())
        )));
        return;
    }
    flush(core, local, id);
}

fn flush<V: ComputeVertex>(core: &EngineCore<V>, local: &mut WorkerLocal<V::Message>, id: VertexId) {
    let out = &mut local.out;
    if out.is_empty() {
        return;
    }
    if !out.requests.is_empty() {
        core.bridge
            .submit(id, out.requests.drain(..), &core.cancel, &core.profile);
    }
    if !out.messages.is_empty() {
        EngineProfile::add(&core.profile.messages_sent, out.messages.len() as u64);
        core.messages.post(local.worker, &mut out.messages);
    }
    for target in out.activations.drain(..) {
        core.activations.activate(target);
    }
}

fn deliver<V: ComputeVertex>(
    core: &EngineCore<V>,
    plan: &RunPlan<V>,
    inbox: &Inbox<V::Message>,
    superstep: u64,
) {
    if inbox.is_empty() {
        return;
    }
    let groups: Vec<usize> = (0..inbox.destinations()).collect();
    let queue = WorkQueue::new(vec![groups]);
    broadcast(core, |local, _worker| {
        while let Some(chunk) = queue.next(0) {
            if core.is_aborted() {
                return;
            }
            for &g in chunk {
                let (dest, msgs) = inbox.group(g);
                let mut state = core.states.get(dest);
                for msg in msgs {
                    with_context(core, plan, local, dest, superstep, |ctx, _| {
                        state.run_on_message(ctx, msg)
                    });
                    local.delivered += 1;
                }
                drop(state);
                core.activations.activate(dest);
            }
        }
    });
}

fn dispatch<V: ComputeVertex>(
    core: &EngineCore<V>,
    plan: &RunPlan<V>,
    active: Vec<VertexId>,
    superstep: u64,
) {
    if active.is_empty() {
        return;
    }
    let partitions = core.states.partitions();
    let mut lists = vec![Vec::new(); partitions];
    for id in active {
        lists[core.states.partition_of(id)].push(id);
    }
    let queue = WorkQueue::new(lists);
    broadcast(core, |local, worker| {
        let home = worker % partitions;
        while let Some(chunk) = queue.next(home) {
            if core.is_aborted() {
                return;
            }
            for &id in chunk {
                let mut state = core.states.get(id);
                let meta = core.graph.meta(id);
                if !plan.filter.keep(id, &meta, &state) {
                    local.filtered += 1;
                    continue;
                }
                with_context(core, plan, local, id, superstep, |ctx, _| state.run(ctx));
                local.ran += 1;
            }
        }
    });
}

fn resolve<V: ComputeVertex>(
    core: &EngineCore<V>,
    plan: &RunPlan<V>,
    wave: Vec<RequestGroup>,
    superstep: u64,
) {
    let queue = WorkQueue::new(vec![wave]);
    broadcast(core, |local, _worker| {
        while let Some(chunk) = queue.next(0) {
            if core.is_aborted() {
                return;
            }
            for group in chunk {
                let requester = group.requester;
                let mut state = core.states.get(requester);
                for req in &group.requests {
                    local.deliveries += 1;
                    let mut io_failed = false;
                    with_context(core, plan, local, requester, superstep, |ctx, scratch| {
                        match req.kind {
                            RequestKind::NumEdges => {
                                let n = core.graph.num_edges(req.target);
                                state.run_on_num_edges(ctx, req.target, n);
                            }
                            RequestKind::Edges(dir) => {
                                match core.bridge.load(req.target, dir, scratch) {
                                    Ok(view) => state.run_on_vertex(ctx, &view),
                                    Err(err) => {
                                        io_failed = true;
                                        warn!(
                                            requester = requester.0,
                                            target = req.target.0,
                                            error = %err,
                                            "engine.io.error"
                                        );
                                        if let Err(fatal) =
                                            state.run_on_io_error(ctx, req.target, err)
                                        {
                                            core.fail(fatal);
                                        }
                                    }
                                }
                            }
                        }
                    });
                    if io_failed {
                        local.io_errors += 1;
                    }
                }
            }
        }
    });
}
