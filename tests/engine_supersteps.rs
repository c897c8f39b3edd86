#![allow(missing_docs)]

mod common;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{build_graph, open_engine, random_edges, test_config};
use pagegraph::engine::{KeepAll, VertexQuery};
use pagegraph::{
    ComputeVertex, EdgeDir, GraphError, PageVertex, Result, Seed, VertexContext, VertexId,
    VertexMeta,
};
use parking_lot::Mutex;

/// Forwards a token along the path 0 -> 1 -> 2 -> ... and records when it arrived.
#[derive(Debug, Default)]
struct Relay {
    received_at: Option<u64>,
}

impl ComputeVertex for Relay {
    type Message = u64;
    type Stage = ();
    type Shared = ();

    fn new(_id: VertexId, _meta: &VertexMeta) -> Self {
        Relay::default()
    }

    fn run(&mut self, ctx: &mut VertexContext<'_, Self>) {
        if ctx.id() == VertexId(0) && ctx.superstep() == 0 {
            ctx.send(VertexId(1), 0);
        }
    }

    fn run_on_vertex(&mut self, _ctx: &mut VertexContext<'_, Self>, _vertex: &PageVertex<'_>) {}

    fn run_on_message(&mut self, ctx: &mut VertexContext<'_, Self>, sent_at: &u64) {
        assert_eq!(ctx.superstep(), sent_at + 1);
        self.received_at = Some(ctx.superstep());
        let next = ctx.id().0 + 1;
        if (next as usize) < ctx.graph().vertex_count() {
            ctx.send(VertexId(next), ctx.superstep());
        }
    }
}

#[test]
fn messages_arrive_in_the_next_superstep() -> Result<()> {
    let graph = build_graph(&[(0, 1), (1, 2), (2, 3)], 4, false, 1)?;
    let mut engine = open_engine::<Relay>(&graph, &test_config(), ())?;
    let summary = engine.run(Seed::Subset(vec![VertexId(0)]), Arc::new(KeepAll), ())?;

    let arrivals = engine.query_on_all(&|_id: VertexId, v: &Relay| v.received_at)?;
    assert_eq!(arrivals, vec![None, Some(1), Some(2), Some(3)]);
    assert_eq!(summary.supersteps, 4);
    assert_eq!(summary.messages, 3);
    assert_eq!(summary.vertices_run, 4);
    Ok(())
}

/// Counts in-edges by multicasting along out-edges.
#[derive(Debug, Default)]
struct InCounter {
    received: u32,
    deliveries: u32,
    out_edges: Vec<VertexId>,
}

impl ComputeVertex for InCounter {
    type Message = u32;
    type Stage = ();
    type Shared = ();

    fn new(_id: VertexId, _meta: &VertexMeta) -> Self {
        InCounter::default()
    }

    fn run(&mut self, ctx: &mut VertexContext<'_, Self>) {
        if ctx.superstep() == 0 {
            let id = ctx.id();
            ctx.request_edges(&[id], EdgeDir::Out);
            // Repeats within a superstep are dropped.
            ctx.request_edges(&[id], EdgeDir::Out);
        }
    }

    fn run_on_vertex(&mut self, ctx: &mut VertexContext<'_, Self>, vertex: &PageVertex<'_>) {
        assert_eq!(vertex.id(), ctx.id());
        assert_eq!(vertex.loaded(), EdgeDir::Out);
        assert!(vertex.in_edges().is_empty());
        self.deliveries += 1;
        self.out_edges = vertex.out_edges().to_vec();
        ctx.multicast(vertex.out_edges().iter().copied(), &1);
    }

    fn run_on_message(&mut self, _ctx: &mut VertexContext<'_, Self>, msg: &u32) {
        self.received += msg;
    }
}

#[test]
fn multicast_reaches_every_out_neighbor_across_files() -> Result<()> {
    let n = 300;
    let edges = random_edges(7, n, 4000);
    let graph = build_graph(&edges, n, false, 3)?;
    let index = graph.index()?;
    let mut engine = open_engine::<InCounter>(&graph, &test_config(), ())?;
    let summary = engine.run(Seed::All, Arc::new(KeepAll), ())?;

    let mut expected_out = vec![Vec::new(); n as usize];
    for &(s, d) in &edges {
        if s != d {
            expected_out[s as usize].push(VertexId(d));
        }
    }
    for list in &mut expected_out {
        list.sort_unstable();
        list.dedup();
    }

    let seen = engine.query_on_all(&|_id: VertexId, v: &InCounter| {
        (v.received, v.deliveries, v.out_edges.clone())
    })?;
    for (i, (received, deliveries, out)) in seen.into_iter().enumerate() {
        let id = VertexId(i as u32);
        assert_eq!(received, index.degree(id, EdgeDir::In), "in-degree of {id}");
        assert_eq!(deliveries, 1, "deliveries to {id}");
        assert_eq!(out, expected_out[i], "out-edges of {id}");
    }
    assert_eq!(summary.requests, n as u64);
    assert_eq!(summary.deliveries, n as u64);
    assert_eq!(summary.messages, index.edge_count());
    assert_eq!(engine.profile().requests_deduplicated, n as u64);
    Ok(())
}

/// Records which vertices ran.
#[derive(Default)]
struct Visits {
    ran: Mutex<Vec<VertexId>>,
}

#[derive(Debug)]
struct Visitor;

impl ComputeVertex for Visitor {
    type Message = ();
    type Stage = ();
    type Shared = Visits;

    fn new(_id: VertexId, _meta: &VertexMeta) -> Self {
        Visitor
    }

    fn run(&mut self, ctx: &mut VertexContext<'_, Self>) {
        ctx.shared().ran.lock().push(ctx.id());
    }

    fn run_on_vertex(&mut self, _ctx: &mut VertexContext<'_, Self>, _vertex: &PageVertex<'_>) {}
}

#[test]
fn filter_excludes_vertices_from_the_run() -> Result<()> {
    let graph = build_graph(&random_edges(3, 50, 200), 50, false, 1)?;
    let mut engine = open_engine::<Visitor>(&graph, &test_config(), Visits::default())?;
    let evens = |id: VertexId, _meta: &VertexMeta, _state: &Visitor| id.0 % 2 == 0;
    let summary = engine.run(Seed::All, Arc::new(evens), ())?;

    let mut ran = engine.shared().ran.lock().clone();
    ran.sort_unstable();
    let expected: Vec<VertexId> = (0..50).step_by(2).map(VertexId).collect();
    assert_eq!(ran, expected);
    assert_eq!(summary.vertices_activated, 50);
    assert_eq!(summary.vertices_run, 25);
    assert_eq!(summary.vertices_filtered, 25);
    assert_eq!(summary.supersteps, 1);
    Ok(())
}

#[test]
fn seed_subset_runs_only_the_given_vertices() -> Result<()> {
    let graph = build_graph(&[(0, 1)], 10, false, 1)?;
    let mut engine = open_engine::<Visitor>(&graph, &test_config(), Visits::default())?;
    engine.run(Seed::Subset(vec![VertexId(7), VertexId(2)]), Arc::new(KeepAll), ())?;
    let mut ran = engine.shared().ran.lock().clone();
    ran.sort_unstable();
    assert_eq!(ran, vec![VertexId(2), VertexId(7)]);

    let err = engine
        .start(Seed::Subset(vec![VertexId(10)]), Arc::new(KeepAll), ())
        .unwrap_err();
    assert!(matches!(err, GraphError::Invalid(_)));
    Ok(())
}

#[test]
fn wait_for_completion_is_idempotent() -> Result<()> {
    let graph = build_graph(&[(0, 1), (1, 2)], 3, false, 1)?;
    let mut engine = open_engine::<Visitor>(&graph, &test_config(), Visits::default())?;
    assert!(matches!(
        engine.wait_for_completion(),
        Err(GraphError::Contract(_))
    ));

    engine.start(Seed::All, Arc::new(KeepAll), ())?;
    let first = engine.wait_for_completion()?;
    let second = engine.wait_for_completion()?;
    assert_eq!(first, second);
    assert!(!engine.is_running());
    assert_eq!(engine.shared().ran.lock().len(), 3);
    Ok(())
}

/// Keeps vertex 0 active forever.
#[derive(Debug)]
struct Spinner;

impl ComputeVertex for Spinner {
    type Message = ();
    type Stage = ();
    type Shared = AtomicU64;

    fn new(_id: VertexId, _meta: &VertexMeta) -> Self {
        Spinner
    }

    fn run(&mut self, ctx: &mut VertexContext<'_, Self>) {
        ctx.shared().fetch_add(1, Ordering::Relaxed);
        let id = ctx.id();
        ctx.activate(id);
    }

    fn run_on_vertex(&mut self, _ctx: &mut VertexContext<'_, Self>, _vertex: &PageVertex<'_>) {}
}

#[test]
fn a_second_start_while_running_is_busy() -> Result<()> {
    let graph = build_graph(&[(0, 1)], 2, false, 1)?;
    let mut engine = open_engine::<Spinner>(&graph, &test_config(), AtomicU64::new(0))?;
    engine.start(Seed::Subset(vec![VertexId(0)]), Arc::new(KeepAll), ())?;
    assert!(engine.is_running());
    assert!(matches!(
        engine.start(Seed::All, Arc::new(KeepAll), ()),
        Err(GraphError::Busy)
    ));
    assert!(matches!(
        engine.query_on_all(&|_id: VertexId, _v: &Spinner| ()),
        Err(GraphError::Busy)
    ));
    engine.cancel_token().cancel();
    assert!(matches!(
        engine.wait_for_completion(),
        Err(GraphError::Cancelled)
    ));
    Ok(())
}

#[test]
fn cancellation_stops_an_endless_run() -> Result<()> {
    let graph = build_graph(&[(0, 1)], 2, false, 1)?;
    let profile = graph.dir.path().join("profile.json");
    let config = pagegraph::EngineConfig {
        profile_path: Some(profile.clone()),
        ..test_config()
    };
    let mut engine = open_engine::<Spinner>(&graph, &config, AtomicU64::new(0))?;
    let token = engine.cancel_token();
    engine.start(Seed::Subset(vec![VertexId(0)]), Arc::new(KeepAll), ())?;
    while engine.shared().load(Ordering::Relaxed) < 10 {
        thread::sleep(Duration::from_millis(1));
    }
    token.cancel();
    assert!(matches!(
        engine.wait_for_completion(),
        Err(GraphError::Cancelled)
    ));
    assert!(matches!(
        engine.start(Seed::All, Arc::new(KeepAll), ()),
        Err(GraphError::Cancelled)
    ));

    let text = std::fs::read_to_string(&profile)?;
    let json: serde_json::Value = serde_json::from_str(&text).expect("profile is JSON");
    assert_eq!(json["status"], "cancelled");
    assert!(json["engine"]["vertices_run"].as_u64().unwrap_or(0) >= 10);
    Ok(())
}

#[test]
fn max_supersteps_stops_a_run_that_never_quiesces() -> Result<()> {
    let graph = build_graph(&[(0, 1)], 2, false, 1)?;
    let config = pagegraph::EngineConfig {
        max_supersteps: Some(5),
        ..test_config()
    };
    let mut engine = open_engine::<Spinner>(&graph, &config, AtomicU64::new(0))?;
    let err = engine
        .run(Seed::Subset(vec![VertexId(0)]), Arc::new(KeepAll), ())
        .unwrap_err();
    assert!(matches!(err, GraphError::Invalid(_)), "{err}");
    assert_eq!(engine.shared().load(Ordering::Relaxed), 5);
    Ok(())
}

/// Panics in vertex 3 when the stage says so.
#[derive(Debug)]
struct Fragile;

impl ComputeVertex for Fragile {
    type Message = ();
    type Stage = bool;
    type Shared = ();

    fn new(_id: VertexId, _meta: &VertexMeta) -> Self {
        Fragile
    }

    fn run(&mut self, ctx: &mut VertexContext<'_, Self>) {
        if ctx.stage() && ctx.id() == VertexId(3) {
            panic!("boom");
        }
    }

    fn run_on_vertex(&mut self, _ctx: &mut VertexContext<'_, Self>, _vertex: &PageVertex<'_>) {}
}

#[test]
fn a_panicking_vertex_fails_the_run_and_the_engine_recovers() -> Result<()> {
    let graph = build_graph(&[(0, 1), (2, 3)], 8, false, 1)?;
    let mut engine = open_engine::<Fragile>(&graph, &test_config(), ())?;
    match engine.run(Seed::All, Arc::new(KeepAll), true) {
        Err(GraphError::VertexFault(msg)) => {
            assert!(msg.contains("boom"), "{msg}");
            assert!(msg.contains("v3"), "{msg}");
        }
        other => panic!("expected a vertex fault, got {other:?}"),
    }
    match engine.wait_for_completion() {
        Err(GraphError::Contract(msg)) => assert_eq!(msg, "previous run failed"),
        other => panic!("expected a contract error, got {other:?}"),
    }
    let summary = engine.run(Seed::All, Arc::new(KeepAll), false)?;
    assert_eq!(summary.vertices_run, 8);
    Ok(())
}

/// Activates its successor, which therefore runs one superstep later.
#[derive(Debug, Default)]
struct Chain {
    ran_at: Option<u64>,
}

impl ComputeVertex for Chain {
    type Message = ();
    type Stage = ();
    type Shared = ();

    fn new(_id: VertexId, _meta: &VertexMeta) -> Self {
        Chain::default()
    }

    fn run(&mut self, ctx: &mut VertexContext<'_, Self>) {
        self.ran_at = Some(ctx.superstep());
        let next = ctx.id().0 + 1;
        if (next as usize) < ctx.graph().vertex_count() {
            ctx.activate(VertexId(next));
        }
    }

    fn run_on_vertex(&mut self, _ctx: &mut VertexContext<'_, Self>, _vertex: &PageVertex<'_>) {}
}

struct RanAt;

impl VertexQuery<Chain> for RanAt {
    type Output = Option<u64>;

    fn query(&self, _id: VertexId, state: &Chain) -> Option<u64> {
        state.ran_at
    }
}

#[test]
fn activations_from_run_join_the_next_superstep() -> Result<()> {
    let graph = build_graph(&[], 5, false, 1)?;
    let mut engine = open_engine::<Chain>(&graph, &test_config(), ())?;
    let summary = engine.run(Seed::Subset(vec![VertexId(0)]), Arc::new(KeepAll), ())?;
    let ran = engine.query_on_all(&RanAt)?;
    assert_eq!(ran, vec![Some(0), Some(1), Some(2), Some(3), Some(4)]);
    assert_eq!(summary.supersteps, 5);
    Ok(())
}

#[test]
fn profile_is_written_after_each_run() -> Result<()> {
    let graph = build_graph(&[(0, 1), (1, 2)], 3, false, 1)?;
    let profile = graph.dir.path().join("profile.json");
    let config = pagegraph::EngineConfig {
        profile_path: Some(profile.clone()),
        print_io_stats: true,
        ..test_config()
    };
    let mut engine = open_engine::<InCounter>(&graph, &config, ())?;
    engine.run(Seed::All, Arc::new(KeepAll), ())?;

    let text = std::fs::read_to_string(&profile)?;
    let json: serde_json::Value = serde_json::from_str(&text).expect("profile is JSON");
    assert_eq!(json["status"], "completed");
    assert_eq!(json["engine"]["requests_issued"], 3);
    assert!(json["cache"]["misses"].as_u64().unwrap_or(0) >= 1);
    Ok(())
}

/// Reads its own edges; the stage decides whether read failures are tolerated.
#[derive(Debug)]
struct Reader;

impl ComputeVertex for Reader {
    type Message = ();
    type Stage = bool;
    type Shared = AtomicU64;

    fn new(_id: VertexId, _meta: &VertexMeta) -> Self {
        Reader
    }

    fn run(&mut self, ctx: &mut VertexContext<'_, Self>) {
        ctx.request_self();
    }

    fn run_on_vertex(&mut self, _ctx: &mut VertexContext<'_, Self>, _vertex: &PageVertex<'_>) {}

    fn run_on_io_error(
        &mut self,
        ctx: &mut VertexContext<'_, Self>,
        _target: VertexId,
        err: GraphError,
    ) -> Result<()> {
        if !ctx.stage() {
            return Err(err);
        }
        ctx.shared().fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[test]
fn io_failures_abort_unless_the_vertex_handles_them() -> Result<()> {
    let graph = build_graph(&random_edges(5, 60, 600), 60, false, 1)?;
    let mut engine = open_engine::<Reader>(&graph, &test_config(), AtomicU64::new(0))?;
    // Only the header page survives.
    std::fs::OpenOptions::new()
        .write(true)
        .open(&graph.graphs[0])?
        .set_len(512)?;

    match engine.run(Seed::All, Arc::new(KeepAll), false) {
        Err(GraphError::Io(err)) => assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("expected an I/O error, got {other:?}"),
    }
    let failed_reads = engine.profile().io_errors;
    assert!(failed_reads > 0);

    let summary = engine.run(Seed::All, Arc::new(KeepAll), true)?;
    assert_eq!(summary.vertices_run, 60);
    let handled = engine.shared().load(Ordering::Relaxed);
    assert!(handled > 0);
    assert_eq!(engine.profile().io_errors - failed_reads, handled);
    Ok(())
}

/// Vertex 0 asks for several edge lists and records the order they arrive in.
#[derive(Debug, Default)]
struct Ordered {
    arrivals: Vec<VertexId>,
}

const ASKED: [VertexId; 4] = [VertexId(250), VertexId(10), VertexId(120), VertexId(5)];

impl ComputeVertex for Ordered {
    type Message = ();
    type Stage = ();
    type Shared = ();

    fn new(_id: VertexId, _meta: &VertexMeta) -> Self {
        Ordered::default()
    }

    fn run(&mut self, ctx: &mut VertexContext<'_, Self>) {
        if ctx.id() == VertexId(0) {
            ctx.request_vertices(&ASKED);
        } else {
            let id = ctx.id();
            ctx.request_vertices(&[id]);
        }
    }

    fn run_on_vertex(&mut self, _ctx: &mut VertexContext<'_, Self>, vertex: &PageVertex<'_>) {
        self.arrivals.push(vertex.id());
    }
}

#[test]
fn one_vertex_sees_its_requests_in_issue_order() -> Result<()> {
    let n = 300;
    let graph = build_graph(&random_edges(13, n, 4000), n, false, 3)?;
    let mut engine = open_engine::<Ordered>(&graph, &test_config(), ())?;
    engine.run(Seed::All, Arc::new(KeepAll), ())?;

    let arrivals = engine.query_on_all(&|_id: VertexId, v: &Ordered| v.arrivals.clone())?;
    assert_eq!(arrivals[0], ASKED.to_vec());
    for (i, seen) in arrivals.iter().enumerate().skip(1) {
        assert_eq!(seen, &vec![VertexId(i as u32)]);
    }
    Ok(())
}
