// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Property-based tests for graph ordering and cycle detection.

use proptest::prelude::*;
use ragkit::{Error, NodeInput, Pipeline};
use std::collections::HashSet;

fn pipeline_with_nodes(n: usize) -> Pipeline {
    let mut pipeline = Pipeline::new();
    for i in 0..n {
        pipeline
            .add_node(format!("n{i}"), |input: NodeInput, _ctx| async move {
                Ok(input.into_value())
            })
            .unwrap();
    }
    pipeline
}

proptest! {
    /// For any acyclic graph (edges only run from lower to higher index),
    /// the topological order places every node after all of its inputs.
    #[test]
    fn topo_order_respects_dependencies(
        n in 2usize..12,
        edges in proptest::collection::vec((0usize..12, 0usize..12), 0..40),
    ) {
        let mut pipeline = pipeline_with_nodes(n);
        let mut kept = HashSet::new();
        for (a, b) in edges {
            let (a, b) = (a % n, b % n);
            if a < b && kept.insert((a, b)) {
                pipeline.connect(&format!("n{a}"), &format!("n{b}")).unwrap();
            }
        }

        let order = pipeline.topo_sort().unwrap();
        prop_assert_eq!(order.len(), n);
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        for (a, b) in &kept {
            let id_a = format!("n{a}");
            let id_b = format!("n{b}");
            prop_assert!(pos(&id_a) < pos(&id_b));
        }
    }

    /// Injecting one backward edge that closes a path always fails with a
    /// Cycle whose path is a real cycle in the graph.
    #[test]
    fn cycle_paths_are_valid_cycles(
        n in 3usize..10,
        edges in proptest::collection::vec((0usize..10, 0usize..10), 0..30),
        back in (1usize..10, 0usize..9),
    ) {
        let mut pipeline = pipeline_with_nodes(n);
        let mut kept = HashSet::new();
        for (a, b) in edges {
            let (a, b) = (a % n, b % n);
            if a < b && kept.insert((a, b)) {
                pipeline.connect(&format!("n{a}"), &format!("n{b}")).unwrap();
            }
        }
        // Close a guaranteed cycle: i -> j forward plus j -> i backward.
        let j = (back.0 % n).max(1);
        let i = back.1 % j;
        if kept.insert((i, j)) {
            pipeline.connect(&format!("n{i}"), &format!("n{j}")).unwrap();
        }
        pipeline.connect(&format!("n{j}"), &format!("n{i}")).unwrap();
        kept.insert((j, i));

        let err = pipeline.topo_sort().unwrap_err();
        let Error::Cycle { path } = err else {
            panic!("expected Cycle, got {err:?}");
        };
        prop_assert!(path.len() >= 3);
        prop_assert_eq!(path.first(), path.last());
        for pair in path.windows(2) {
            let from: usize = pair[0][1..].parse().unwrap();
            let to: usize = pair[1][1..].parse().unwrap();
            prop_assert!(
                kept.contains(&(from, to)),
                "cycle step {} -> {} is not an edge",
                pair[0].clone(),
                pair[1].clone()
            );
        }
    }
}
