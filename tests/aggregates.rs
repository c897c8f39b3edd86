#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;

use pagegraph::engine::{GlobalMax, TopKCollection};
use pagegraph::VertexId;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn concurrent_updates_keep_the_maximum(
        batches in prop::collection::vec(prop::collection::vec(any::<u64>(), 0..50), 1..8)
    ) {
        let max = Arc::new(GlobalMax::new(0));
        let handles: Vec<_> = batches
            .iter()
            .cloned()
            .map(|batch| {
                let max = Arc::clone(&max);
                thread::spawn(move || {
                    batch.into_iter().filter(|&v| max.update(v)).count()
                })
            })
            .collect();
        let installed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        let expected = batches.iter().flatten().copied().max().unwrap_or(0);
        prop_assert_eq!(max.get(), expected);
        if expected > 0 {
            prop_assert!(installed >= 1);
        }
        // Every successful install strictly raised the value.
        let distinct_positive = {
            let mut all: Vec<u64> = batches.iter().flatten().copied().filter(|&v| v > 0).collect();
            all.sort_unstable();
            all.dedup();
            all.len()
        };
        prop_assert!(installed <= distinct_positive);
    }

    #[test]
    fn topk_matches_a_full_sort(
        scores in prop::collection::vec((0u32..1000, 0u64..100), 1..200),
        k in 1usize..20
    ) {
        let topk = TopKCollection::new();
        for &(id, score) in &scores {
            topk.add(VertexId(id), score);
        }
        let mut sorted: Vec<(VertexId, u64)> =
            scores.iter().map(|&(id, s)| (VertexId(id), s)).collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        prop_assert_eq!(topk.len(), scores.len());
        prop_assert_eq!(topk.top(k), sorted.iter().take(k).copied().collect::<Vec<_>>());
        if k <= sorted.len() {
            prop_assert_eq!(topk.kth_largest(k - 1).unwrap(), sorted[k - 1]);
        } else {
            prop_assert!(topk.kth_largest(k - 1).is_err());
        }
    }
}

#[test]
fn reset_lowers_the_bound_between_runs() {
    let max = GlobalMax::default();
    assert!(max.update(40));
    assert!(!max.update(40));
    max.reset(10);
    assert_eq!(max.get(), 10);
    assert!(max.update(11));
}

#[test]
fn topk_collection_accepts_concurrent_adds() {
    let topk = Arc::new(TopKCollection::new());
    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let topk = Arc::clone(&topk);
            thread::spawn(move || {
                for i in 0..250u32 {
                    topk.add(VertexId(t * 250 + i), u64::from(i));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(topk.len(), 1000);
    assert_eq!(topk.kth_largest(0).unwrap(), (VertexId(249), 249));
    assert_eq!(topk.kth_largest(3).unwrap(), (VertexId(999), 249));
    topk.clear();
    assert!(topk.is_empty());
}
