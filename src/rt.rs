//! RT module: the multi-threaded graph player.
//!
//! The audio thread drives one block per [`NodePlayer::process`] call. It
//! adopts any newly published graph, arms the shared work counter and then
//! claims nodes alongside the worker pool until the counter runs dry. It
//! finally waits for the root to complete and copies the root's output.

// IMPORTANT: Do not call assert_invariant or any logging in this module.
// Everything here may run on the audio thread; diagnostics go through
// invariant_rt signals instead.

use crate::buffers::Buffers;
use crate::claim::WorkCounter;
use crate::config::PlayerConfig;
use crate::graph::{Graph, NodeId};
use crate::handoff::{self, Handoff};
use crate::invariant_rt::{
    self, signal_invariant, signal_queue, INV_BLOCK_PROCESSED, INV_BLOCK_TOO_LARGE,
    INV_EVENTS_DROPPED, INV_GRAPH_ADOPTED, INV_NOT_PREPARED, INV_NO_GRAPH, INV_OUTPUT_COPIED,
    INV_RETIRE_OVERFLOW,
};
use crate::node::{Node, SampleRange};
use crate::plan::{self, PlanError, PreparedGraph};
use crate::pool::WorkerPool;
use crate::spin::spin_until;
use arc_swap::ArcSwapOption;
use rtrb::{Consumer, Producer, PushError, RingBuffer};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors from setting up or feeding the player.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("failed to spawn worker thread {index}")]
    ThreadSpawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("the control handle was already taken")]
    ControlTaken,
}

/// Outcome of one [`NodePlayer::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Every node ran and the root output was copied.
    Processed,
    /// No graph has been published. Nothing was copied.
    NoGraph,
    /// The constructor's graph still awaits `prepare_for_playback`.
    NotPrepared,
    /// The range is longer than the prepared block size. Nothing ran.
    BlockTooLarge,
}

impl ProcessStatus {
    pub fn is_processed(self) -> bool {
        self == ProcessStatus::Processed
    }
}

/// Per-callback arguments: the block's sample range and where the root's
/// output goes.
pub struct ProcessContext<'a> {
    pub range: SampleRange,
    pub output: &'a mut Buffers,
}

impl<'a> ProcessContext<'a> {
    pub fn new(range: SampleRange, output: &'a mut Buffers) -> Self {
        Self { range, output }
    }
}

/// State shared by the driver and the workers.
pub(crate) struct Shared {
    work: WorkCounter,
    active: ArcSwapOption<PreparedGraph>,
    block_start: AtomicI64,
    block_end: AtomicI64,
    should_exit: AtomicBool,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            work: WorkCounter::new(),
            active: ArcSwapOption::empty(),
            block_start: AtomicI64::new(0),
            block_end: AtomicI64::new(0),
            should_exit: AtomicBool::new(false),
        }
    }

    pub(crate) fn should_exit(&self) -> bool {
        self.should_exit.load(Ordering::Acquire)
    }

    pub(crate) fn request_exit(&self) {
        self.should_exit.store(true, Ordering::Release);
    }

    pub(crate) fn clear_exit(&self) {
        self.should_exit.store(false, Ordering::Release);
    }

    /// Must be followed by `work.reset`, which publishes the range.
    fn set_block_range(&self, range: SampleRange) {
        self.block_start.store(range.start, Ordering::Relaxed);
        self.block_end.store(range.end, Ordering::Relaxed);
    }

    fn block_range(&self) -> SampleRange {
        SampleRange::new(
            self.block_start.load(Ordering::Relaxed),
            self.block_end.load(Ordering::Relaxed),
        )
    }

    /// Claim one node of the active graph, wait until its inputs are done
    /// and process it. Returns `false` if there was nothing to claim.
    pub(crate) fn process_next_free_node(&self) -> bool {
        let Some(index) = self.work.claim() else {
            return false;
        };
        // The claim synchronised with the driver's reset, so this is the
        // graph the claimed index belongs to.
        let guard = self.active.load();
        let Some(graph) = guard.as_deref() else {
            return true;
        };
        if index >= graph.len() {
            return true;
        }
        spin_until(|| graph.is_ready_to_process(index));
        // SAFETY: `index` was handed out exactly once by the counter for
        // this block, and all of its inputs have completed.
        unsafe { graph.process_claimed(index, self.block_range()) };
        true
    }
}

/// Plays a node graph across a pool of worker threads.
///
/// `process` is the real-time entry point; everything else is meant for a
/// non-real-time thread. Publishing from another thread goes through the
/// [`PlayerControl`] returned by [`control`](Self::control).
pub struct NodePlayer {
    config: PlayerConfig,
    workers: usize,
    shared: Arc<Shared>,
    handoff: Arc<Handoff>,
    pool: Option<WorkerPool>,
    stopped: bool,
    current: Option<Arc<PreparedGraph>>,
    unprepared: Option<Graph>,
    retire_tx: Producer<Arc<PreparedGraph>>,
    retire_rx: Option<Consumer<Arc<PreparedGraph>>>,
    signal_tx: Producer<u8>,
    signal_rx: Option<Consumer<u8>>,
}

impl NodePlayer {
    /// A player with no graph. Worker threads start with the first graph.
    pub fn new(config: PlayerConfig) -> Self {
        let (retire_tx, retire_rx) = RingBuffer::new(config.retire_capacity.max(1));
        let (signal_tx, signal_rx) = signal_queue(config.signal_capacity);
        Self {
            workers: config.workers.resolve(),
            shared: Arc::new(Shared::new()),
            handoff: Arc::new(Handoff::new(config.sample_rate, config.block_size)),
            config,
            pool: None,
            stopped: false,
            current: None,
            unprepared: None,
            retire_tx,
            retire_rx: Some(retire_rx),
            signal_tx,
            signal_rx: Some(signal_rx),
        }
    }

    /// A player holding `graph` unprepared; call
    /// [`prepare_for_playback`](Self::prepare_for_playback) before the
    /// first `process`.
    pub fn with_graph(graph: Graph, config: PlayerConfig) -> Self {
        let mut player = Self::new(config);
        player.unprepared = Some(graph);
        player
    }

    /// Prepare `graph` with the current settings and publish it.
    pub fn set_graph(&mut self, graph: Graph) -> Result<(), PlayerError> {
        let (sample_rate, block_size) = (self.handoff.sample_rate(), self.handoff.block_size());
        self.set_graph_with(graph, sample_rate, block_size)
    }

    /// Prepare `graph` with the given settings and publish it. The next
    /// `process` call plays it.
    pub fn set_graph_with(
        &mut self,
        graph: Graph,
        sample_rate: f64,
        block_size: usize,
    ) -> Result<(), PlayerError> {
        plan::check_settings(sample_rate, block_size)?;
        self.ensure_pool()?;
        self.collect_garbage();
        handoff::prepare_and_publish(&self.handoff, graph, sample_rate, block_size)?;
        self.unprepared = None;
        Ok(())
    }

    /// Prepare the constructor's graph, or prepare the current graph again
    /// for new settings.
    pub fn prepare_for_playback(
        &mut self,
        sample_rate: f64,
        block_size: usize,
    ) -> Result<(), PlayerError> {
        plan::check_settings(sample_rate, block_size)?;
        self.ensure_pool()?;
        self.collect_garbage();

        self.adopt_pending();
        let prepared = if let Some(current) = self.current.take() {
            self.unprepared = None;
            self.shared.active.store(None);
            let graph = into_sole_owner(current);
            handoff::reprepare(graph, sample_rate, block_size)?
        } else if let Some(graph) = self.unprepared.take() {
            let previous = self.handoff.previous_carry();
            plan::prepare(graph, previous.as_deref(), sample_rate, block_size)?
        } else {
            self.apply_settings(sample_rate, block_size);
            return Ok(());
        };
        self.apply_settings(sample_rate, block_size);
        self.handoff.publish(prepared);
        self.adopt_pending();
        Ok(())
    }

    fn apply_settings(&mut self, sample_rate: f64, block_size: usize) {
        self.handoff.set_settings(sample_rate, block_size);
        self.config.sample_rate = sample_rate;
        self.config.block_size = block_size;
    }

    /// Play one block. Real-time safe: no locks, no allocation, no logging.
    pub fn process(&mut self, context: &mut ProcessContext<'_>) -> ProcessStatus {
        self.adopt_pending();

        let Some(graph) = self.current.as_deref() else {
            return if self.unprepared.is_some() {
                signal_invariant(&mut self.signal_tx, INV_NOT_PREPARED);
                ProcessStatus::NotPrepared
            } else {
                signal_invariant(&mut self.signal_tx, INV_NO_GRAPH);
                ProcessStatus::NoGraph
            };
        };

        let range = context.range;
        let frames = range.len();
        if frames > graph.block_size() {
            signal_invariant(&mut self.signal_tx, INV_BLOCK_TOO_LARGE);
            return ProcessStatus::BlockTooLarge;
        }

        self.shared.set_block_range(range);
        // SAFETY: the previous block finished with its root, so no node of
        // this graph is being processed, and `&mut self` rules out live
        // references from `root_output` or `current_root`.
        unsafe { graph.prepare_for_next_block(range) };
        self.shared.work.reset(graph.len());

        while self.shared.process_next_free_node() {}
        spin_until(|| graph.root_has_processed());

        if let Some(output) = graph.root_output() {
            if context.output.copy_from(output, frames) > 0 {
                signal_invariant(&mut self.signal_tx, INV_EVENTS_DROPPED);
            }
            signal_invariant(&mut self.signal_tx, INV_OUTPUT_COPIED);
        }
        signal_invariant(&mut self.signal_tx, INV_BLOCK_PROCESSED);
        ProcessStatus::Processed
    }

    fn adopt_pending(&mut self) {
        let Some(next) = self.handoff.take_pending() else {
            return;
        };
        self.shared.active.store(Some(Arc::clone(&next)));
        signal_invariant(&mut self.signal_tx, INV_GRAPH_ADOPTED);
        if let Some(old) = self.current.replace(next) {
            if let Err(PushError::Full(old)) = self.retire_tx.push(old) {
                signal_invariant(&mut self.signal_tx, INV_RETIRE_OVERFLOW);
                drop(old);
            }
        }
    }

    fn ensure_pool(&mut self) -> Result<(), PlayerError> {
        if self.pool.is_none() && !self.stopped {
            self.pool = Some(WorkerPool::start(Arc::clone(&self.shared), self.workers)?);
        }
        Ok(())
    }

    /// Root node of the graph being played.
    pub fn current_root(&self) -> Option<&dyn Node> {
        // SAFETY: blocks only run inside `process`, which needs `&mut self`.
        self.current.as_deref().map(|graph| unsafe { graph.root_node() })
    }

    /// Root output of the last processed block.
    pub fn root_output(&self) -> Option<&Buffers> {
        self.current.as_deref().and_then(PreparedGraph::root_output)
    }

    /// Ids of the nodes being played, in processing order.
    pub fn current_node_ids(&self) -> Option<&[NodeId]> {
        self.current.as_deref().map(PreparedGraph::node_ids)
    }

    pub fn sample_rate(&self) -> f64 {
        self.handoff.sample_rate()
    }

    pub fn block_size(&self) -> usize {
        self.handoff.block_size()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Worker threads besides the audio thread.
    pub fn num_workers(&self) -> usize {
        match &self.pool {
            Some(pool) if !pool.is_stopped() => pool.len(),
            Some(_) => 0,
            None if self.stopped => 0,
            None => self.workers,
        }
    }

    /// Stop and join the worker pool. Idempotent and final: afterwards
    /// the audio thread processes every node itself.
    pub fn stop_workers(&mut self) {
        self.stopped = true;
        if let Some(pool) = self.pool.as_mut() {
            pool.stop();
        }
    }

    /// Drop graphs the audio thread retired. No-op once the control
    /// handle has been taken. Returns how many were dropped.
    pub fn collect_garbage(&mut self) -> usize {
        self.retire_rx.as_mut().map_or(0, handoff::drain_retired)
    }

    /// Signals raised by `process`, while the control handle is not taken.
    pub fn drain_invariant_signals(&mut self) -> Vec<u8> {
        self.signal_rx
            .as_mut()
            .map(invariant_rt::drain_invariant_signals)
            .unwrap_or_default()
    }

    /// Hand out the non-real-time side. Starts the worker pool.
    pub fn control(&mut self) -> Result<PlayerControl, PlayerError> {
        let (Some(retire_rx), Some(signal_rx)) = (self.retire_rx.take(), self.signal_rx.take())
        else {
            return Err(PlayerError::ControlTaken);
        };
        if let Err(err) = self.ensure_pool() {
            self.retire_rx = Some(retire_rx);
            self.signal_rx = Some(signal_rx);
            return Err(err);
        }
        Ok(PlayerControl {
            handoff: Arc::clone(&self.handoff),
            retire_rx,
            signal_rx,
        })
    }
}

impl Drop for NodePlayer {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

impl std::fmt::Debug for NodePlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodePlayer")
            .field("config", &self.config)
            .field("workers", &self.num_workers())
            .field("current", &self.current)
            .field("unprepared", &self.unprepared.is_some())
            .finish()
    }
}

/// Non-real-time side of a [`NodePlayer`]: publishes graphs and reclaims
/// the ones the audio thread has finished with.
pub struct PlayerControl {
    handoff: Arc<Handoff>,
    retire_rx: Consumer<Arc<PreparedGraph>>,
    signal_rx: Consumer<u8>,
}

impl PlayerControl {
    pub fn set_graph(&mut self, graph: Graph) -> Result<(), PlayerError> {
        let (sample_rate, block_size) = (self.handoff.sample_rate(), self.handoff.block_size());
        self.set_graph_with(graph, sample_rate, block_size)
    }

    pub fn set_graph_with(
        &mut self,
        graph: Graph,
        sample_rate: f64,
        block_size: usize,
    ) -> Result<(), PlayerError> {
        plan::check_settings(sample_rate, block_size)?;
        self.collect_garbage();
        handoff::prepare_and_publish(&self.handoff, graph, sample_rate, block_size)?;
        Ok(())
    }

    /// Drop retired graphs. Returns how many.
    pub fn collect_garbage(&mut self) -> usize {
        handoff::drain_retired(&mut self.retire_rx)
    }

    pub fn drain_invariant_signals(&mut self) -> Vec<u8> {
        invariant_rt::drain_invariant_signals(&mut self.signal_rx)
    }

    /// Whether a published graph is still waiting for the audio thread.
    pub fn has_pending(&self) -> bool {
        self.handoff.has_pending()
    }

    pub fn sample_rate(&self) -> f64 {
        self.handoff.sample_rate()
    }

    pub fn block_size(&self) -> usize {
        self.handoff.block_size()
    }
}

/// Wait for transient worker references to go away.
fn into_sole_owner(mut graph: Arc<PreparedGraph>) -> PreparedGraph {
    loop {
        match Arc::try_unwrap(graph) {
            Ok(graph) => return graph,
            Err(shared) => {
                graph = shared;
                std::thread::yield_now();
            }
        }
    }
}
