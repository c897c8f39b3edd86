#![allow(missing_docs)]

mod common;

use std::collections::BTreeSet;

use common::{build_graph, open_engine, random_edges, test_config};
use pagegraph::algs::{run_topk_scan, TopKConfig, TopKShared, TopKVertex, UnboundedEstimator};
use pagegraph::{GraphError, Result, VertexId};

/// Hub 0 joined to every rim vertex 1..=rim, rim vertices in a cycle.
fn wheel(rim: u32) -> Vec<(u32, u32)> {
    let mut edges: Vec<(u32, u32)> = (1..=rim).map(|v| (0, v)).collect();
    edges.extend((1..=rim).map(|v| (v, v % rim + 1)));
    edges
}

#[test]
fn wheel_hub_has_the_largest_scan() -> Result<()> {
    let graph = build_graph(&wheel(60), 61, true, 2)?;
    let mut engine = open_engine::<TopKVertex>(&graph, &test_config(), TopKShared::default())?;
    let out = run_topk_scan(
        &mut engine,
        TopKConfig {
            k: 1,
            min_edges: 10,
        },
    )?;
    assert_eq!(out.top, vec![(VertexId(0), 120)]);
    // One discovery pass over the hub alone, then one refinement pass that runs nobody.
    assert_eq!(out.passes.len(), 2);
    assert_eq!(out.passes[0].vertices_run, 1);
    assert_eq!(out.passes[1].vertices_run, 0);
    Ok(())
}

#[test]
fn zero_k_is_rejected() -> Result<()> {
    let graph = build_graph(&wheel(5), 6, true, 1)?;
    let mut engine = open_engine::<TopKVertex>(&graph, &test_config(), TopKShared::default())?;
    let err = run_topk_scan(&mut engine, TopKConfig { k: 0, min_edges: 0 }).unwrap_err();
    assert!(matches!(err, GraphError::Invalid(_)));
    Ok(())
}

#[test]
fn more_k_than_scannable_vertices_fails() -> Result<()> {
    // Two edges, four vertices with a non-zero scan, two isolated ones.
    let graph = build_graph(&[(0, 1), (2, 3)], 6, true, 1)?;
    let mut engine = open_engine::<TopKVertex>(&graph, &test_config(), TopKShared::default())?;
    let err = run_topk_scan(&mut engine, TopKConfig { k: 5, min_edges: 4 }).unwrap_err();
    assert!(matches!(err, GraphError::Invalid(_)), "{err}");
    Ok(())
}

fn brute_force_scans(n: u32, edges: &[(u32, u32)]) -> Vec<u64> {
    let mut adj = vec![BTreeSet::new(); n as usize];
    for &(s, d) in edges {
        if s != d {
            adj[s as usize].insert(d);
            adj[d as usize].insert(s);
        }
    }
    (0..n as usize)
        .map(|v| {
            let hood: Vec<u32> = adj[v].iter().copied().collect();
            let mut inner = 0u64;
            for (i, &a) in hood.iter().enumerate() {
                for &b in &hood[i + 1..] {
                    if adj[a as usize].contains(&b) {
                        inner += 1;
                    }
                }
            }
            hood.len() as u64 + inner
        })
        .collect()
}

fn check_random_graph(shared: TopKShared, k: usize) -> Result<()> {
    let n = 200;
    let edges = random_edges(11, n, 1500);
    let graph = build_graph(&edges, n, true, 3)?;
    let mut engine = open_engine::<TopKVertex>(&graph, &test_config(), shared)?;
    let out = run_topk_scan(&mut engine, TopKConfig { k, min_edges: 40 })?;

    let scans = brute_force_scans(n, &edges);
    let mut expected: Vec<u64> = scans.clone();
    expected.sort_unstable_by(|a, b| b.cmp(a));
    expected.truncate(k);

    let got: Vec<u64> = out.top.iter().map(|&(_, s)| s).collect();
    assert_eq!(got, expected);
    for &(v, s) in &out.top {
        assert_eq!(scans[v.0 as usize], s, "scan of {v}");
    }
    Ok(())
}

#[test]
fn random_graph_top_scores_match_brute_force() -> Result<()> {
    check_random_graph(TopKShared::default(), 8)
}

#[test]
fn unbounded_estimator_gives_the_same_answer() -> Result<()> {
    check_random_graph(TopKShared::new(Box::new(UnboundedEstimator)), 8)
}
