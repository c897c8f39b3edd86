#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Once;

use pagegraph::{ComputeVertex, EngineConfig, GraphBuilder, GraphEngine, GraphIndex, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

static INIT: Once = Once::new();

/// Routes engine logs through the test harness; `RUST_LOG=debug` shows supersteps.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Graph files written into a scratch directory.
pub struct TestGraph {
    pub dir: TempDir,
    pub graphs: Vec<PathBuf>,
    pub index: PathBuf,
}

impl TestGraph {
    pub fn index(&self) -> Result<std::sync::Arc<GraphIndex>> {
        GraphIndex::open(&self.index)
    }
}

/// Writes `edges` with small pages striped over `files` files.
pub fn build_graph(
    edges: &[(u32, u32)],
    vertex_count: u32,
    undirected: bool,
    files: usize,
) -> Result<TestGraph> {
    let dir = TempDir::new()?;
    let graphs: Vec<PathBuf> = (0..files)
        .map(|i| dir.path().join(format!("graph.{i}")))
        .collect();
    let index = dir.path().join("graph.idx");
    let mut builder = GraphBuilder::new()
        .vertex_count(vertex_count)
        .undirected(undirected)
        .page_size(512)
        .stripe_pages(2);
    builder.extend_edges(edges.iter().copied());
    builder.finish(&graphs, &index)?;
    Ok(TestGraph { dir, graphs, index })
}

/// Four workers over two partitions and a cache far smaller than the test graphs.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        threads: 4,
        numa_nodes: 2,
        cache_pages: 8,
        ..EngineConfig::default()
    }
}

pub fn open_engine<V: ComputeVertex>(
    graph: &TestGraph,
    config: &EngineConfig,
    shared: V::Shared,
) -> Result<GraphEngine<V>> {
    init_tracing();
    GraphEngine::create(&graph.graphs, graph.index()?, config, shared)
}

/// `edges` random directed edges over `n` vertices, reproducible from `seed`.
pub fn random_edges(seed: u64, n: u32, edges: usize) -> Vec<(u32, u32)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..edges)
        .map(|_| (rng.gen_range(0..n), rng.gen_range(0..n)))
        .collect()
}
