#![allow(dead_code)]

use spinplay::{Buffers, Graph, Node, NodeId, ProcessArgs, SampleRange};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// What a probe saw during processing. Ticks come from a clock shared by
/// every probe of a test, so they order events across threads.
#[derive(Debug, Default)]
pub struct ProbeStats {
    pub calls: AtomicUsize,
    pub started: AtomicUsize,
    pub finished: AtomicUsize,
    /// Calls that found an input not yet complete.
    pub early: AtomicUsize,
}

impl ProbeStats {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn early(&self) -> usize {
        self.early.load(Ordering::SeqCst)
    }
}

/// Writes `1 + sum(first sample of each input)` to every frame, so the
/// root's value is the number of paths through the graph.
pub struct Probe {
    clock: Arc<AtomicUsize>,
    stats: Arc<ProbeStats>,
}

impl Probe {
    pub fn new(clock: &Arc<AtomicUsize>) -> (Self, Arc<ProbeStats>) {
        let stats = Arc::new(ProbeStats::default());
        let probe = Self {
            clock: Arc::clone(clock),
            stats: Arc::clone(&stats),
        };
        (probe, stats)
    }
}

impl Node for Probe {
    fn name(&self) -> &str {
        "probe"
    }

    fn process(&mut self, args: &mut ProcessArgs<'_>) {
        let tick = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.started.store(tick, Ordering::SeqCst);
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        if args.inputs.iter().count() != args.inputs.len() {
            self.stats.early.fetch_add(1, Ordering::SeqCst);
        }
        let value = 1.0
            + args
                .inputs
                .iter()
                .map(|input| input.audio.channel(0).first().copied().unwrap_or(0.0))
                .sum::<f32>();
        let frames = args.frames();
        args.output.audio.channel_mut(0)[..frames].fill(value);
        let tick = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.finished.store(tick, Ordering::SeqCst);
    }
}

/// A graph of probes: `nodes` probes, the given edges, root last.
pub fn probe_graph(
    nodes: usize,
    edges: &[(usize, usize)],
) -> (Graph, Vec<NodeId>, Vec<Arc<ProbeStats>>) {
    let clock = Arc::new(AtomicUsize::new(0));
    let mut graph = Graph::new();
    let mut ids = Vec::with_capacity(nodes);
    let mut stats = Vec::with_capacity(nodes);
    for _ in 0..nodes {
        let (probe, probe_stats) = Probe::new(&clock);
        ids.push(graph.add_node(probe));
        stats.push(probe_stats);
    }
    for &(from, to) in edges {
        graph.connect(ids[from], ids[to]).unwrap();
    }
    if let Some(&root) = ids.last() {
        graph.set_root(root).unwrap();
    }
    (graph, ids, stats)
}

pub fn block(start: i64, frames: usize) -> SampleRange {
    SampleRange::with_length(start, frames)
}

pub fn output(frames: usize) -> Buffers {
    Buffers::new(1, frames, 16)
}

/// Poll `condition` for up to two seconds. Workers may briefly hold a
/// reference to a graph after finishing their last node.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::yield_now();
    }
    condition()
}
