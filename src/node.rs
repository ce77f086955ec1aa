//! The node contract: what the player needs from a processing unit.

#![forbid(unsafe_code)]

use crate::buffers::Buffers;
use crate::plan::NodeSlot;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// State a node hands over to its successor when the graph is replaced.
pub type SharedState = Arc<dyn Any + Send + Sync>;

/// Reference sample range of one block, `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SampleRange {
    pub start: i64,
    pub end: i64,
}

impl SampleRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn with_length(start: i64, frames: usize) -> Self {
        Self {
            start,
            end: start + frames as i64,
        }
    }

    /// Number of frames in the range; an inverted range is empty.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The range of the same length directly after this one.
    pub fn following(&self) -> Self {
        Self::with_length(self.end, self.len())
    }
}

/// States exported by the nodes of a prepared graph, keyed by
/// [`Node::stable_key`]. Immutable once built.
#[derive(Default)]
pub struct StateCarry {
    states: HashMap<u64, SharedState>,
}

impl StateCarry {
    pub(crate) fn insert(&mut self, key: u64, state: SharedState) -> bool {
        self.states.insert(key, state).is_some()
    }

    pub fn get(&self, key: u64) -> Option<&SharedState> {
        self.states.get(&key)
    }

    pub fn contains(&self, key: u64) -> bool {
        self.states.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl std::fmt::Debug for StateCarry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.states.keys().collect();
        keys.sort();
        f.debug_struct("StateCarry").field("keys", &keys).finish()
    }
}

/// Settings handed to every node when its graph is prepared.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackInit<'a> {
    pub sample_rate: f64,
    pub block_size: usize,
    /// States exported by the graph being replaced, if any.
    pub previous: Option<&'a StateCarry>,
}

impl<'a> PlaybackInit<'a> {
    /// State the previous graph exported under `key`.
    pub fn previous_state(&self, key: u64) -> Option<&'a SharedState> {
        self.previous.and_then(|carry| carry.get(key))
    }
}

/// Read-only view of the outputs of a node's inputs, in connection order.
///
/// Only completed inputs are visible, and a node is never processed before
/// all of its inputs have completed.
#[derive(Clone, Copy)]
pub struct Inputs<'a> {
    slots: &'a [NodeSlot],
    indices: &'a [usize],
}

impl<'a> Inputs<'a> {
    pub(crate) fn new(slots: &'a [NodeSlot], indices: &'a [usize]) -> Self {
        Self { slots, indices }
    }

    /// A view with no inputs.
    pub fn none() -> Inputs<'static> {
        Inputs {
            slots: Default::default(),
            indices: Default::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Output of the `index`-th input.
    pub fn get(&self, index: usize) -> Option<&'a Buffers> {
        let slot = *self.indices.get(index)?;
        self.slots.get(slot)?.completed_output()
    }

    pub fn first(&self) -> Option<&'a Buffers> {
        self.get(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Buffers> + 'a {
        let slots = self.slots;
        self.indices
            .iter()
            .filter_map(move |&slot| slots.get(slot).and_then(NodeSlot::completed_output))
    }
}

/// Arguments of one [`Node::process`] call.
pub struct ProcessArgs<'a> {
    pub range: SampleRange,
    pub inputs: Inputs<'a>,
    /// Holds the previous block's samples; the node overwrites the first
    /// `range.len()` frames. Events are cleared before every block.
    pub output: &'a mut Buffers,
}

impl ProcessArgs<'_> {
    /// Frames to produce this block.
    pub fn frames(&self) -> usize {
        self.range.len()
    }
}

/// A unit of audio/control processing.
///
/// Nodes are owned by the graph they belong to and processed by whichever
/// thread claims them, one thread per node per block; hence `Send` but not
/// `Sync`.
pub trait Node: Send {
    /// Name for diagnostics.
    fn name(&self) -> &str {
        "node"
    }

    /// Audio channels in this node's output.
    fn output_channels(&self) -> usize {
        1
    }

    /// Called once when the containing graph is prepared, before it can
    /// become active. Allocation is fine here.
    fn initialise(&mut self, _init: &PlaybackInit<'_>) {}

    /// Called on the audio thread at the start of every block, before any
    /// node of the graph is processed.
    fn prepare_for_next_block(&mut self, _range: SampleRange) {}

    /// Produce this block's output. Must not block or allocate.
    fn process(&mut self, args: &mut ProcessArgs<'_>);

    /// Identity that survives graph edits, used to match this node with
    /// its counterpart in the previous graph.
    fn stable_key(&self) -> Option<u64> {
        None
    }

    /// State to hand to the node with the same key in the next graph.
    fn export_state(&self) -> Option<SharedState> {
        None
    }
}
