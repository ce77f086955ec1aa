//! Plan module: flatten a graph into a prepared, dependency-ordered snapshot.
//!
//! A [`PreparedGraph`] is an immutable arena of node slots. The slot list is
//! ordered so that every node comes after all of its inputs, which lets
//! threads claim slots front to back without ever waiting on a node that
//! has not been handed out yet. Each slot carries a completion flag; a slot
//! is ready once the flags of all its inputs are set.

use crate::buffers::Buffers;
use crate::claim::MAX_CLAIMABLE;
use crate::control::EVENT_CAPACITY;
use crate::graph::{Edge, Graph, NodeData, NodeId};
use crate::invariant_ppt::{
    assert_invariant, PLAN_ROOT_LAST, PLAN_SOUNDNESS, PLAN_STATE_CARRY, PLAN_TOPOLOGICAL,
};
use crate::node::{Inputs, Node, PlaybackInit, ProcessArgs, SampleRange, StateCarry};
use std::cell::UnsafeCell;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors during graph preparation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("graph has no root node")]
    NoRoot,
    #[error("root {0:?} is not a node of the graph")]
    InvalidRoot(NodeId),
    #[error("node {0:?} is referenced but missing")]
    MissingNode(NodeId),
    #[error("block size must be greater than zero")]
    InvalidBlockSize,
    #[error("sample rate {0} is not a positive finite number")]
    InvalidSampleRate(f64),
    #[error("graph contains a cycle")]
    CycleDetected,
    #[error("graph has {0} nodes, more than can be scheduled")]
    TooManyNodes(usize),
}

/// One node of a prepared graph together with its output and dependencies.
pub(crate) struct NodeSlot {
    id: NodeId,
    node: UnsafeCell<Box<dyn Node>>,
    output: UnsafeCell<Buffers>,
    inputs: Box<[usize]>,
    processed: AtomicBool,
}

impl NodeSlot {
    fn new(id: NodeId, node: Box<dyn Node>, output: Buffers, inputs: Box<[usize]>) -> Self {
        Self {
            id,
            node: UnsafeCell::new(node),
            output: UnsafeCell::new(output),
            inputs,
            processed: AtomicBool::new(false),
        }
    }

    pub(crate) fn has_processed(&self) -> bool {
        self.processed.load(Ordering::Acquire)
    }

    /// Output of this slot, if it completed in the current block.
    pub(crate) fn completed_output(&self) -> Option<&Buffers> {
        if self.has_processed() {
            // SAFETY: the flag was set with Release after the last write to
            // the output, and the output is not written again until the
            // driver resets every flag at the start of the next block.
            Some(unsafe { &*self.output.get() })
        } else {
            None
        }
    }
}

/// A graph flattened for playback: the unit handed from the control side to
/// the audio thread.
pub struct PreparedGraph {
    slots: Box<[NodeSlot]>,
    root: usize,
    ids: Box<[NodeId]>,
    sample_rate: f64,
    block_size: usize,
    carry: Arc<StateCarry>,
}

// SAFETY: node and output cells are only touched by the thread that claimed
// the slot during a block, or by the driver between blocks. Readers of an
// output first observe the slot's completion flag with Acquire.
unsafe impl Sync for PreparedGraph {}

impl PreparedGraph {
    /// Number of nodes, i.e. the work count of one block.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn root_index(&self) -> usize {
        self.root
    }

    /// Original graph ids, in processing order.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.ids
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// States exported by this graph's nodes when it was prepared.
    pub fn carry(&self) -> &Arc<StateCarry> {
        &self.carry
    }

    /// Slot indices `index` reads from, in connection order.
    pub fn inputs_of(&self, index: usize) -> &[usize] {
        self.slots.get(index).map_or(&[][..], |slot| &slot.inputs[..])
    }

    /// Whether every input of `index` has completed this block.
    pub fn is_ready_to_process(&self, index: usize) -> bool {
        self.slots[index]
            .inputs
            .iter()
            .all(|&input| self.slots[input].has_processed())
    }

    pub fn has_processed(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .map_or(false, NodeSlot::has_processed)
    }

    pub fn root_has_processed(&self) -> bool {
        self.slots[self.root].has_processed()
    }

    /// Output of the root node, once it has completed.
    pub fn root_output(&self) -> Option<&Buffers> {
        self.slots[self.root].completed_output()
    }

    /// Clear every completion flag and run each node's per-block hook.
    ///
    /// # Safety
    /// No node of this graph may be processing, and no reference obtained
    /// from [`root_output`](Self::root_output) or [`root_node`](Self::root_node)
    /// may be alive.
    pub(crate) unsafe fn prepare_for_next_block(&self, range: SampleRange) {
        for slot in self.slots.iter() {
            slot.processed.store(false, Ordering::Relaxed);
            (*slot.output.get()).events.clear();
            (*slot.node.get()).prepare_for_next_block(range);
        }
    }

    /// Process the slot at `index` and mark it complete.
    ///
    /// # Safety
    /// The caller must have exclusively claimed `index` for this block, and
    /// every input of the slot must have completed.
    pub(crate) unsafe fn process_claimed(&self, index: usize, range: SampleRange) {
        let slot = &self.slots[index];
        let node = &mut *slot.node.get();
        let mut args = ProcessArgs {
            range,
            inputs: Inputs::new(&self.slots, &slot.inputs),
            output: &mut *slot.output.get(),
        };
        node.process(&mut args);
        slot.processed.store(true, Ordering::Release);
    }

    /// The root node.
    ///
    /// # Safety
    /// No block of this graph may be in progress.
    pub(crate) unsafe fn root_node(&self) -> &dyn Node {
        (*self.slots[self.root].node.get()).as_ref()
    }

    /// Turn the snapshot back into an editable graph with its original ids.
    pub fn into_graph(self) -> Graph {
        let len = self.ids.iter().map(|id| id.0 + 1).max().unwrap_or(0);
        let mut graph = Graph::new();
        graph.nodes.resize_with(len, || None);
        for slot in self.slots.into_vec() {
            for &input in slot.inputs.iter() {
                graph.edges.push(Edge {
                    from: self.ids[input],
                    to: slot.id,
                });
            }
            graph.nodes[slot.id.0] = Some(NodeData {
                id: slot.id,
                node: slot.node.into_inner(),
            });
        }
        graph.root = self.ids.get(self.root).copied();
        graph
    }
}

impl std::fmt::Debug for PreparedGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedGraph")
            .field("ids", &self.ids)
            .field("root", &self.root)
            .field("sample_rate", &self.sample_rate)
            .field("block_size", &self.block_size)
            .field("carry", &self.carry)
            .finish()
    }
}

/// Validate playback settings.
pub fn check_settings(sample_rate: f64, block_size: usize) -> Result<(), PlanError> {
    if block_size == 0 {
        return Err(PlanError::InvalidBlockSize);
    }
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(PlanError::InvalidSampleRate(sample_rate));
    }
    Ok(())
}

/// Prepare `graph` for playback.
///
/// Only nodes the root depends on are kept. Every kept node is initialised
/// with the playback settings and `previous`, the carry of the graph being
/// replaced.
pub fn prepare(
    mut graph: Graph,
    previous: Option<&StateCarry>,
    sample_rate: f64,
    block_size: usize,
) -> Result<PreparedGraph, PlanError> {
    check_settings(sample_rate, block_size)?;
    let root = graph.root.ok_or(PlanError::NoRoot)?;
    if !graph.contains(root) {
        return Err(PlanError::InvalidRoot(root));
    }

    let order = execution_order(&graph, root)?;
    if order.len() > MAX_CLAIMABLE {
        return Err(PlanError::TooManyNodes(order.len()));
    }

    let mut index_of = vec![usize::MAX; graph.nodes.len()];
    for (index, id) in order.iter().enumerate() {
        index_of[id.0] = index;
    }
    let inputs: Vec<Box<[usize]>> = order
        .iter()
        .map(|&id| graph.inputs_of(id).map(|from| index_of[from.0]).collect())
        .collect();

    for (index, slot_inputs) in inputs.iter().enumerate() {
        assert_invariant(
            PLAN_TOPOLOGICAL,
            slot_inputs.iter().all(|&input| input < index),
            "Every input precedes its consumer",
            Some("prepare"),
        );
    }

    let init = PlaybackInit {
        sample_rate,
        block_size,
        previous,
    };
    let mut carry = StateCarry::default();
    let mut slots = Vec::with_capacity(order.len());
    for (&id, slot_inputs) in order.iter().zip(inputs) {
        let mut node = graph.nodes[id.0]
            .take()
            .ok_or(PlanError::MissingNode(id))?
            .node;
        node.initialise(&init);
        if let (Some(key), Some(state)) = (node.stable_key(), node.export_state()) {
            if carry.insert(key, state) {
                debug!(key, node = node.name(), "stable key exported twice, last one kept");
            }
        }
        let output = Buffers::new(node.output_channels(), block_size, EVENT_CAPACITY);
        slots.push(NodeSlot::new(id, node, output, slot_inputs));
    }

    let root_index = order.len() - 1;
    assert_invariant(
        PLAN_ROOT_LAST,
        order[root_index] == root,
        "Root is the last node in processing order",
        Some("prepare"),
    );
    assert_invariant(
        PLAN_SOUNDNESS,
        slots.len() == order.len(),
        "Every ordered node has a slot",
        Some("prepare"),
    );
    assert_invariant(
        PLAN_STATE_CARRY,
        carry.len() <= slots.len(),
        "At most one carried state per node",
        Some("prepare"),
    );

    debug!(
        nodes = slots.len(),
        root = root.0,
        sample_rate,
        block_size,
        carried = carry.len(),
        "prepared graph"
    );

    Ok(PreparedGraph {
        slots: slots.into_boxed_slice(),
        root: root_index,
        ids: order.into_boxed_slice(),
        sample_rate,
        block_size,
        carry: Arc::new(carry),
    })
}

/// Nodes the root depends on (root included), inputs first, ties broken
/// by id.
fn execution_order(graph: &Graph, root: NodeId) -> Result<Vec<NodeId>, PlanError> {
    let count = graph.nodes.len();
    let mut reachable = vec![false; count];
    let mut stack = vec![root];
    reachable[root.0] = true;
    while let Some(id) = stack.pop() {
        for from in graph.inputs_of(id) {
            if !graph.contains(from) {
                return Err(PlanError::MissingNode(from));
            }
            if !reachable[from.0] {
                reachable[from.0] = true;
                stack.push(from);
            }
        }
    }

    let mut in_degree = vec![0usize; count];
    let mut successors: Vec<Vec<NodeId>> = vec![Vec::new(); count];
    for edge in graph.edges.iter() {
        if reachable[edge.to.0] {
            in_degree[edge.to.0] += 1;
            successors[edge.from.0].push(edge.to);
        }
    }

    let mut ready: BinaryHeap<Reverse<NodeId>> = (0..count)
        .filter(|&i| reachable[i] && in_degree[i] == 0)
        .map(|i| Reverse(NodeId(i)))
        .collect();

    let total = reachable.iter().filter(|&&r| r).count();
    let mut order = Vec::with_capacity(total);
    while let Some(Reverse(id)) = ready.pop() {
        order.push(id);
        for &to in &successors[id.0] {
            in_degree[to.0] -= 1;
            if in_degree[to.0] == 0 {
                ready.push(Reverse(to));
            }
        }
    }

    if order.len() == total {
        Ok(order)
    } else {
        Err(PlanError::CycleDetected)
    }
}
