use spinplay::graph::Graph;
use spinplay::nodes::{Gain, Mix, Passthrough, Sine};
use spinplay::plan::{prepare, PlanError};
use proptest::prelude::*;

fn build(edges: &[(usize, usize)], nodes: usize) -> Graph {
    let mut graph = Graph::new();
    let ids: Vec<_> = (0..nodes).map(|_| graph.add_node(Passthrough::new())).collect();
    for &(from, to) in edges {
        let _ = graph.connect(ids[from], ids[to]);
    }
    graph.set_root(ids[nodes - 1]).unwrap();
    graph
}

#[test]
fn plan_deterministic_preparation() {
    let make = || {
        let mut graph = Graph::new();
        let osc = graph.add_node(Sine::new(440.0));
        let gain = graph.add_node(Gain::new(0.5));
        let mix = graph.add_node(Mix::new(2));
        graph.connect(osc, gain).unwrap();
        graph.connect(gain, mix).unwrap();
        graph.connect(osc, mix).unwrap();
        graph.set_root(mix).unwrap();
        graph
    };
    let plan1 = prepare(make(), None, 44_100.0, 64).unwrap();
    let plan2 = prepare(make(), None, 44_100.0, 64).unwrap();
    assert_eq!(plan1.node_ids(), plan2.node_ids());
    for index in 0..plan1.len() {
        assert_eq!(plan1.inputs_of(index), plan2.inputs_of(index));
    }
}

#[test]
fn plan_rejects_zero_block_size() {
    let graph = build(&[(0, 1)], 2);
    assert_eq!(
        prepare(graph, None, 44_100.0, 0).unwrap_err(),
        PlanError::InvalidBlockSize
    );
}

#[test]
fn independent_sources_order_by_id() {
    let graph = build(&[(2, 3), (0, 3), (1, 3)], 4);
    let plan = prepare(graph, None, 44_100.0, 64).unwrap();
    let order: Vec<usize> = plan.node_ids().iter().map(|id| id.0).collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
    // Inputs keep connection order, not id order.
    assert_eq!(plan.inputs_of(3), &[2, 0, 1]);
}

proptest! {
    #[test]
    fn inputs_always_precede_consumers(
        nodes in 2usize..20,
        pairs in proptest::collection::vec((0usize..20, 0usize..20), 0..40),
    ) {
        let edges: Vec<_> = pairs
            .into_iter()
            .map(|(a, b)| (a % nodes, b % nodes))
            .filter(|(a, b)| a != b)
            .collect();
        let graph = build(&edges, nodes);
        let plan = prepare(graph, None, 44_100.0, 32).unwrap();
        prop_assert_eq!(plan.root_index(), plan.len() - 1);
        for index in 0..plan.len() {
            prop_assert!(plan.inputs_of(index).iter().all(|&input| input < index));
        }
        let again = prepare(build(&edges, nodes), None, 44_100.0, 32).unwrap();
        prop_assert_eq!(plan.node_ids(), again.node_ids());
    }
}
