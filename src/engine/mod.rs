//! Vertex-centric execution engine.
//!
//! A [`GraphEngine`] owns one [`ComputeVertex`] value per vertex and runs
//! supersteps over them until nothing is left to do. Every superstep:
//!
//! 1. messages queued during the previous superstep are delivered and their
//!    receivers activated,
//! 2. the active set is ordered by the [`VertexScheduler`],
//! 3. each active vertex that passes the [`VertexFilter`] runs on the worker pool,
//! 4. edge requests are resolved through the page cache in waves until none remain,
//! 5. queued messages are handed over at the barrier.
//!
//! A run ends when no vertex is active and no message is queued.

pub mod aggregate;
pub mod bridge;
pub mod cancel;
pub mod config;
pub mod context;
pub mod messaging;
pub mod profile;
pub mod query;
mod run;
pub mod scheduler;
pub mod states;
pub mod vertex;

pub use aggregate::{GlobalMax, TopKCollection};
pub use bridge::{IoRequest, RequestKind};
pub use cancel::CancellationToken;
pub use config::EngineConfig;
pub use context::VertexContext;
pub use profile::{EngineProfileSnapshot, RunSummary};
pub use query::VertexQuery;
pub use scheduler::{
    ActivationSet, DegreeScheduler, IdentityScheduler, KeepAll, MinEdgesFilter, Seed,
    VertexFilter, VertexScheduler,
};
pub use states::VertexIndex;
pub use vertex::ComputeVertex;

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
};

use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info};

use crate::graph::format::DATA_START_PAGE;
use crate::graph::{self, GraphHeader, GraphIndex};
use crate::primitives::pager::{CacheStats, PageCache};
use crate::primitives::partition::PartitionedFile;
use crate::types::{GraphError, Result, VertexId};

use bridge::IoBridge;
use messaging::MessageQueues;
use profile::EngineProfile;
use run::RunPlan;

/// State shared between the engine handle, its driver thread and the workers.
pub(crate) struct EngineCore<V: ComputeVertex> {
    config: EngineConfig,
    graph: Arc<GraphIndex>,
    header: GraphHeader,
    cache: Arc<PageCache>,
    bridge: IoBridge,
    states: VertexIndex<V>,
    shared: V::Shared,
    messages: MessageQueues<V::Message>,
    activations: ActivationSet,
    pool: rayon::ThreadPool,
    profile: EngineProfile,
    cancel: CancellationToken,
    aborted: AtomicBool,
    fault: Mutex<Option<GraphError>>,
}

impl<V: ComputeVertex> EngineCore<V> {
    /// Records the first fatal error of the run and stops the workers.
    fn fail(&self, err: GraphError) {
        let mut fault = self.fault.lock();
        if fault.is_none() {
            *fault = Some(err);
        }
        self.aborted.store(true, Ordering::Release);
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }

    fn check_fault(&self) -> Result<()> {
        if let Some(err) = self.fault.lock().take() {
            return Err(err);
        }
        if self.cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        Ok(())
    }

    fn reset_fault(&self) {
        self.fault.lock().take();
        self.aborted.store(false, Ordering::Release);
    }
}

/// Out-of-core engine over one graph.
///
/// Dropping the engine cancels any run in flight and waits for it.
pub struct GraphEngine<V: ComputeVertex> {
    core: Arc<EngineCore<V>>,
    scheduler: Arc<dyn VertexScheduler>,
    driver: Option<JoinHandle<Result<RunSummary>>>,
    last: Option<RunSummary>,
    last_failed: bool,
}

impl<V: ComputeVertex> GraphEngine<V> {
    /// Opens the graph files and builds the per-vertex state.
    ///
    /// Fails before any run when the configuration is invalid, a file is
    /// missing or the graph header disagrees with the index.
    pub fn create<P: AsRef<Path>>(
        graph_paths: &[P],
        graph: Arc<GraphIndex>,
        config: &EngineConfig,
        shared: V::Shared,
    ) -> Result<Self> {
        config.validate()?;
        let first = graph_paths
            .first()
            .ok_or(GraphError::Invalid("no graph files given"))?;
        let header = graph::read_header(first)?;
        if header.file_count as usize != graph_paths.len() {
            return Err(GraphError::Invalid(
                "number of graph files does not match the graph header",
            ));
        }
        if header.vertex_count as usize != graph.vertex_count()
            || header.edge_count != graph.edge_count()
        {
            return Err(GraphError::Corruption("graph header and index disagree"));
        }
        if graph.data_len() > header.data_pages * header.page_size as u64 {
            return Err(GraphError::Corruption("index points past the graph data"));
        }
        let view = PartitionedFile::open(
            graph_paths,
            header.page_size as usize,
            header.stripe_pages as u64,
        )?;
        if view.total_pages()? < DATA_START_PAGE + header.data_pages {
            return Err(GraphError::Corruption("graph files are shorter than the header says"));
        }
        let cache = Arc::new(PageCache::new(view, config.cache_pages));
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("pagegraph-worker-{i}"))
            .build()
            .map_err(|err| GraphError::Config(format!("failed to build worker pool: {err}")))?;
        let states = VertexIndex::build(&graph, config.numa_nodes, |id, meta| V::new(id, meta));
        let activations = ActivationSet::new(graph.vertex_count());
        info!(
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            files = graph_paths.len(),
            page_size = header.page_size,
            threads = config.threads,
            numa_nodes = config.numa_nodes,
            "engine.created"
        );
        let core = EngineCore {
            config: config.clone(),
            bridge: IoBridge::new(Arc::clone(&cache), Arc::clone(&graph)),
            graph,
            header,
            cache,
            states,
            shared,
            messages: MessageQueues::new(config.threads),
            activations,
            pool,
            profile: EngineProfile::default(),
            cancel: CancellationToken::new(),
            aborted: AtomicBool::new(false),
            fault: Mutex::new(None),
        };
        Ok(Self {
            core: Arc::new(core),
            scheduler: Arc::new(IdentityScheduler),
            driver: None,
            last: None,
            last_failed: false,
        })
    }

    /// Replaces the ordering policy for subsequent runs.
    pub fn set_scheduler(&mut self, scheduler: Arc<dyn VertexScheduler>) {
        self.scheduler = scheduler;
    }

    /// Seeds the active set and starts a run on a driver thread.
    ///
    /// Returns immediately. Use [`GraphEngine::wait_for_completion`] to
    /// collect the outcome.
    pub fn start(
        &mut self,
        seed: Seed,
        filter: Arc<dyn VertexFilter<V>>,
        stage: V::Stage,
    ) -> Result<()> {
        if self.driver.is_some() {
            return Err(GraphError::Busy);
        }
        if self.core.cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        let vertex_count = self.core.graph.vertex_count();
        match seed {
            Seed::All => self.core.activations.activate_all(),
            Seed::Subset(ids) => {
                if ids.iter().any(|id| id.index() >= vertex_count) {
                    return Err(GraphError::Invalid("seed vertex out of range"));
                }
                for id in ids {
                    self.core.activations.activate(id);
                }
            }
        }
        self.last = None;
        self.last_failed = false;
        let core = Arc::clone(&self.core);
        let plan = RunPlan {
            filter,
            scheduler: Arc::clone(&self.scheduler),
            stage,
        };
        let handle = std::thread::Builder::new()
            .name("pagegraph-driver".into())
            .spawn(move || run::execute(&core, plan));
        match handle {
            Ok(handle) => {
                self.driver = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.core.activations.drain();
                Err(GraphError::Io(err))
            }
        }
    }

    /// Blocks until the current run reaches quiescence.
    ///
    /// Once a run has completed, further calls return its summary without
    /// waiting. A run's error is returned once; later calls report that the
    /// run failed.
    pub fn wait_for_completion(&mut self) -> Result<RunSummary> {
        if let Some(handle) = self.driver.take() {
            let outcome = match handle.join() {
                Ok(outcome) => outcome,
                Err(_) => Err(GraphError::VertexFault("engine driver thread panicked".into())),
            };
            self.last = outcome.as_ref().ok().copied();
            self.last_failed = outcome.is_err();
            return outcome;
        }
        if self.last_failed {
            return Err(GraphError::Contract("previous run failed"));
        }
        self.last
            .ok_or(GraphError::Contract("wait_for_completion called before start"))
    }

    /// `start` followed by `wait_for_completion`.
    pub fn run(
        &mut self,
        seed: Seed,
        filter: Arc<dyn VertexFilter<V>>,
        stage: V::Stage,
    ) -> Result<RunSummary> {
        self.start(seed, filter, stage)?;
        self.wait_for_completion()
    }

    /// True while a started run has not been waited for.
    pub fn is_running(&self) -> bool {
        self.driver.is_some()
    }

    /// Evaluates `query` on every vertex, returning results indexed by id.
    pub fn query_on_all<Q: VertexQuery<V>>(&self, query: &Q) -> Result<Vec<Q::Output>> {
        if self.driver.is_some() {
            return Err(GraphError::Busy);
        }
        let core = &self.core;
        Ok(core.pool.install(|| {
            (0..core.graph.vertex_count() as u32)
                .into_par_iter()
                .map(|raw| {
                    let id = VertexId(raw);
                    query.query(id, &core.states.get(id))
                })
                .collect()
        }))
    }

    /// Reads every data page into the cache; returns how many pages were read.
    pub fn preload(&self) -> Result<u64> {
        let pages = DATA_START_PAGE..DATA_START_PAGE + self.core.header.data_pages;
        let loaded = self.core.cache.preload(pages)?;
        debug!(pages = loaded, "engine.preload");
        Ok(loaded)
    }

    /// Token that stops the current and every later run.
    pub fn cancel_token(&self) -> CancellationToken {
        self.core.cancel.clone()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.core.cache.stats()
    }

    /// Cumulative engine counters.
    pub fn profile(&self) -> EngineProfileSnapshot {
        self.core.profile.snapshot(false)
    }

    /// Values shared by every vertex, such as global aggregates.
    pub fn shared(&self) -> &V::Shared {
        &self.core.shared
    }

    pub fn graph(&self) -> &Arc<GraphIndex> {
        &self.core.graph
    }

    pub fn header(&self) -> &GraphHeader {
        &self.core.header
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }
}

impl<V: ComputeVertex> Drop for GraphEngine<V> {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.take() {
            self.core.cancel.cancel();
            let _ = handle.join();
        }
    }
}
