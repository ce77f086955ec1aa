//! Graph hand-off between the control side and the audio thread.
//!
//! The control side prepares a graph and publishes it into a single
//! pending slot. The audio thread takes it at the start of its next
//! callback. Publishing over an unconsumed graph replaces it, and the
//! replaced graph is dropped on the publishing thread.

use crate::graph::Graph;
use crate::invariant_ppt::{
    assert_invariant, HANDOFF_PUBLISHED, HANDOFF_SUPERSEDED, RETIRED_RECLAIMED,
};
use crate::node::StateCarry;
use crate::plan::{self, PlanError, PreparedGraph};
use arc_swap::ArcSwapOption;
use rtrb::Consumer;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub(crate) struct Handoff {
    pending: ArcSwapOption<PreparedGraph>,
    /// Carry of the most recently published graph.
    carry: ArcSwapOption<StateCarry>,
    sample_rate: AtomicU64,
    block_size: AtomicUsize,
    published: AtomicUsize,
    superseded: AtomicUsize,
}

impl Handoff {
    pub(crate) fn new(sample_rate: f64, block_size: usize) -> Self {
        Self {
            pending: ArcSwapOption::empty(),
            carry: ArcSwapOption::empty(),
            sample_rate: AtomicU64::new(sample_rate.to_bits()),
            block_size: AtomicUsize::new(block_size),
            published: AtomicUsize::new(0),
            superseded: AtomicUsize::new(0),
        }
    }

    /// Make `graph` the next graph the audio thread adopts.
    pub(crate) fn publish(&self, graph: PreparedGraph) {
        let nodes = graph.len();
        assert_invariant(
            HANDOFF_PUBLISHED,
            nodes > 0 && graph.root_index() == nodes - 1,
            "Published graph ends with its root",
            Some("publish"),
        );
        self.carry.store(Some(Arc::clone(graph.carry())));
        let published = self.published.fetch_add(1, Ordering::AcqRel) + 1;
        let replaced = self.pending.swap(Some(Arc::new(graph)));
        if let Some(replaced) = replaced {
            let superseded = self.superseded.fetch_add(1, Ordering::AcqRel) + 1;
            assert_invariant(
                HANDOFF_SUPERSEDED,
                superseded < published,
                "Unconsumed graph replaced by a newer one",
                Some("publish"),
            );
            debug!(nodes = replaced.len(), "dropping superseded pending graph");
        }
        debug!(nodes, published, "published graph");
    }

    /// Take the pending graph, if any. Called on the audio thread.
    #[inline]
    pub(crate) fn take_pending(&self) -> Option<Arc<PreparedGraph>> {
        self.pending.swap(None)
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.pending.load().is_some()
    }

    pub(crate) fn previous_carry(&self) -> Option<Arc<StateCarry>> {
        self.carry.load_full()
    }

    pub(crate) fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate.load(Ordering::Relaxed))
    }

    pub(crate) fn block_size(&self) -> usize {
        self.block_size.load(Ordering::Relaxed)
    }

    pub(crate) fn set_settings(&self, sample_rate: f64, block_size: usize) {
        self.sample_rate
            .store(sample_rate.to_bits(), Ordering::Relaxed);
        self.block_size.store(block_size, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn published_count(&self) -> usize {
        self.published.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn superseded_count(&self) -> usize {
        self.superseded.load(Ordering::Relaxed)
    }
}

/// Prepare `graph` against the carry of the last published graph and
/// publish it. The settings are only adopted if preparation succeeds.
pub(crate) fn prepare_and_publish(
    handoff: &Handoff,
    graph: Graph,
    sample_rate: f64,
    block_size: usize,
) -> Result<(), PlanError> {
    let previous = handoff.previous_carry();
    let prepared = plan::prepare(graph, previous.as_deref(), sample_rate, block_size)?;
    handoff.set_settings(sample_rate, block_size);
    handoff.publish(prepared);
    Ok(())
}

/// Prepare an already prepared graph again for new playback settings.
///
/// Its own carry is handed to the new preparation so keyed nodes keep their
/// state.
pub(crate) fn reprepare(
    graph: PreparedGraph,
    sample_rate: f64,
    block_size: usize,
) -> Result<PreparedGraph, PlanError> {
    info!(
        from_sample_rate = graph.sample_rate(),
        from_block_size = graph.block_size(),
        sample_rate,
        block_size,
        "re-preparing active graph"
    );
    let carry = Arc::clone(graph.carry());
    plan::prepare(graph.into_graph(), Some(&carry), sample_rate, block_size)
}

/// Drop every graph the audio thread has retired. Returns how many.
pub(crate) fn drain_retired(retired: &mut Consumer<Arc<PreparedGraph>>) -> usize {
    let mut count = 0;
    while let Ok(graph) = retired.pop() {
        drop(graph);
        count += 1;
    }
    if count > 0 {
        assert_invariant(
            RETIRED_RECLAIMED,
            retired.is_empty(),
            "Retire queue drained",
            Some("collect_garbage"),
        );
        debug!(count, "reclaimed retired graphs");
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::Sine;
    use rtrb::RingBuffer;

    fn graph(key: u64) -> Graph {
        let mut graph = Graph::new();
        let osc = graph.add_node(Sine::new(440.0).with_key(key));
        graph.set_root(osc).unwrap();
        graph
    }

    #[test]
    fn last_writer_wins() {
        let handoff = Handoff::new(44_100.0, 64);
        prepare_and_publish(&handoff, graph(1), 44_100.0, 64).unwrap();
        prepare_and_publish(&handoff, graph(2), 44_100.0, 64).unwrap();
        assert_eq!(handoff.published_count(), 2);
        assert_eq!(handoff.superseded_count(), 1);

        let adopted = handoff.take_pending().unwrap();
        assert!(adopted.carry().contains(2));
        assert!(!adopted.carry().contains(1));
        assert!(handoff.take_pending().is_none());
        assert!(!handoff.has_pending());
    }

    #[test]
    fn publish_remembers_carry() {
        let handoff = Handoff::new(44_100.0, 64);
        assert!(handoff.previous_carry().is_none());
        prepare_and_publish(&handoff, graph(5), 44_100.0, 64).unwrap();
        assert!(handoff.previous_carry().unwrap().contains(5));
    }

    #[test]
    fn settings_round_trip() {
        let handoff = Handoff::new(44_100.0, 64);
        handoff.set_settings(96_000.0, 32);
        assert_eq!(handoff.sample_rate(), 96_000.0);
        assert_eq!(handoff.block_size(), 32);
    }

    #[test]
    fn settings_follow_successful_preparation_only() {
        let handoff = Handoff::new(44_100.0, 64);
        assert!(prepare_and_publish(&handoff, Graph::new(), 96_000.0, 4096).is_err());
        assert_eq!(handoff.sample_rate(), 44_100.0);
        assert_eq!(handoff.block_size(), 64);
        assert!(!handoff.has_pending());

        prepare_and_publish(&handoff, graph(1), 48_000.0, 128).unwrap();
        assert_eq!(handoff.block_size(), 128);
    }

    #[test]
    fn reprepare_keeps_nodes() {
        let prepared = plan::prepare(graph(3), None, 44_100.0, 64).unwrap();
        let ids = prepared.node_ids().to_vec();
        let again = reprepare(prepared, 48_000.0, 128).unwrap();
        assert_eq!(again.node_ids(), &ids[..]);
        assert_eq!(again.block_size(), 128);
        assert_eq!(again.sample_rate(), 48_000.0);
    }

    #[test]
    fn drain_empties_queue() {
        let (mut tx, mut rx) = RingBuffer::new(4);
        for key in 0..3 {
            let prepared = plan::prepare(graph(key), None, 44_100.0, 8).unwrap();
            tx.push(Arc::new(prepared)).unwrap();
        }
        assert_eq!(drain_retired(&mut rx), 3);
        assert_eq!(drain_retired(&mut rx), 0);
    }
}
