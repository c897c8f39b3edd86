#![allow(missing_docs)]

mod common;

use common::{build_graph, open_engine, random_edges, test_config};
use pagegraph::algs::{compute_wcc, WccVertex};
use pagegraph::{Result, VertexId};

#[test]
fn two_cliques_and_an_isolated_vertex() -> Result<()> {
    let edges = [(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3)];
    let graph = build_graph(&edges, 7, false, 1)?;
    let mut engine = open_engine::<WccVertex>(&graph, &test_config(), ())?;
    let out = compute_wcc(&mut engine)?;

    let zero = Some(VertexId(0));
    let three = Some(VertexId(3));
    assert_eq!(
        out.labels,
        vec![zero, zero, zero, three, three, three, None]
    );
    assert_eq!(out.components, 2);
    assert!(out.find.supersteps >= 2);
    assert_eq!(out.remove_empty.messages, 0);
    Ok(())
}

#[test]
fn direction_is_ignored() -> Result<()> {
    // 5 -> 4 -> 3 only reaches 3 from 5 against the edge direction.
    let graph = build_graph(&[(5, 4), (4, 3), (1, 0)], 6, false, 2)?;
    let mut engine = open_engine::<WccVertex>(&graph, &test_config(), ())?;
    let out = compute_wcc(&mut engine)?;
    let labels: Vec<_> = out.labels.iter().map(|l| l.map(|v| v.0)).collect();
    assert_eq!(
        labels,
        vec![Some(0), Some(0), None, Some(3), Some(3), Some(3)]
    );
    Ok(())
}

fn find(parent: &mut [u32], mut x: u32) -> u32 {
    while parent[x as usize] != x {
        let up = parent[parent[x as usize] as usize];
        parent[x as usize] = up;
        x = up;
    }
    x
}

#[test]
fn random_graph_matches_union_find() -> Result<()> {
    let n = 2000;
    // Sparse enough to leave many components and isolated vertices.
    let edges = random_edges(42, n, 1200);
    let graph = build_graph(&edges, n, false, 3)?;
    let mut engine = open_engine::<WccVertex>(&graph, &test_config(), ())?;
    let out = compute_wcc(&mut engine)?;

    let mut parent: Vec<u32> = (0..n).collect();
    let mut has_edge = vec![false; n as usize];
    for &(s, d) in &edges {
        if s == d {
            continue;
        }
        has_edge[s as usize] = true;
        has_edge[d as usize] = true;
        let (a, b) = (find(&mut parent, s), find(&mut parent, d));
        // Keep the smallest id as the root so roots equal component minima.
        if a < b {
            parent[b as usize] = a;
        } else if b < a {
            parent[a as usize] = b;
        }
    }
    let mut expected_components = 0;
    for v in 0..n {
        let expected = has_edge[v as usize].then(|| VertexId(find(&mut parent, v)));
        assert_eq!(out.labels[v as usize], expected, "label of vertex {v}");
        if has_edge[v as usize] && find(&mut parent, v) == v {
            expected_components += 1;
        }
    }
    assert_eq!(out.components, expected_components);
    Ok(())
}
