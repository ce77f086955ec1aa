mod common;

use common::{block, output, probe_graph};
use proptest::prelude::*;
use spinplay::{NodePlayer, PlayerConfig, ProcessContext, WorkerCount};

/// Random DAG over `n` nodes: edges only go from lower to higher index, and
/// every node feeds the last one so the whole graph is reachable.
fn dag() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..24).prop_flat_map(|n| {
        let pairs = proptest::collection::vec((0..n, 0..n), 0..n * 2);
        (Just(n), pairs)
    })
}

fn edges_for(n: usize, pairs: &[(usize, usize)]) -> Vec<(usize, usize)> {
    let mut edges = Vec::new();
    for &(a, b) in pairs {
        let (from, to) = (a.min(b), a.max(b));
        if from != to && !edges.contains(&(from, to)) {
            edges.push((from, to));
        }
    }
    for node in 0..n - 1 {
        if !edges.iter().any(|&(from, _)| from == node) {
            edges.push((node, n - 1));
        }
    }
    edges
}

/// Value a probe graph's root produces: `1 + sum of inputs` per node,
/// evaluated in index order, which is a valid topological order here.
fn expected_root(n: usize, edges: &[(usize, usize)]) -> f32 {
    let mut values = vec![0.0f32; n];
    for node in 0..n {
        let value = 1.0
            + edges
                .iter()
                .filter(|&&(_, to)| to == node)
                .map(|&(from, _)| values[from])
                .sum::<f32>();
        values[node] = value;
    }
    values[n - 1]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn every_node_runs_exactly_once_per_block(
        (n, pairs) in dag(),
        workers in 0usize..4,
        blocks in 1usize..6,
    ) {
        let edges = edges_for(n, &pairs);
        let (graph, _, stats) = probe_graph(n, &edges);
        let mut player = NodePlayer::new(
            PlayerConfig::default()
                .with_workers(WorkerCount::Fixed(workers))
                .with_block_size(16),
        );
        player.set_graph(graph).unwrap();

        let mut out = output(16);
        let mut range = block(0, 16);
        for done in 1..=blocks {
            prop_assert!(player.process(&mut ProcessContext::new(range, &mut out)).is_processed());
            for s in &stats {
                prop_assert_eq!(s.calls(), done);
                prop_assert_eq!(s.early(), 0);
            }
            for &(from, to) in &edges {
                prop_assert!(stats[from].finished() < stats[to].started());
            }
            range = range.following();
        }
        prop_assert_eq!(out.audio.channel(0)[0], expected_root(n, &edges));
    }
}
