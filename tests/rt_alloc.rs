use spinplay::nodes::{Gain, Latency, Mix, Sine};
use spinplay::{
    Buffers, Graph, NodePlayer, PlayerConfig, ProcessContext, SampleRange, WorkerCount,
};
use std::alloc::{GlobalAlloc, Layout};
use std::cell::Cell;

thread_local! {
    static ALLOC_COUNT: Cell<usize> = const { Cell::new(0) };
}

struct CountingAllocator;

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = ALLOC_COUNT.try_with(|c| c.set(c.get() + 1));
        unsafe { std::alloc::System.alloc(layout) }
    }
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { std::alloc::System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static A: CountingAllocator = CountingAllocator;

fn allocations() -> usize {
    ALLOC_COUNT.with(|c| c.get())
}

#[test]
fn rt_alloc_invariant() {
    let mut graph = Graph::new();
    let a = graph.add_node(Sine::new(440.0));
    let b = graph.add_node(Sine::new(660.0).with_key(1));
    let delay = graph.add_node(Latency::new(100));
    let gain = graph.add_node(Gain::new(0.5));
    let mix = graph.add_node(Mix::new(2));
    graph.connect(a, delay).unwrap();
    graph.connect(b, gain).unwrap();
    graph.connect(delay, mix).unwrap();
    graph.connect(gain, mix).unwrap();
    graph.set_root(mix).unwrap();

    let mut player = NodePlayer::new(
        PlayerConfig::default()
            .with_workers(WorkerCount::Fixed(0))
            .with_block_size(64)
            .with_signal_capacity(64_000),
    );
    player.set_graph(graph).unwrap();
    let mut out = Buffers::new(2, 64, 32);
    let mut range = SampleRange::with_length(0, 64);

    // The first block adopts the graph and warms per-thread state.
    player.process(&mut ProcessContext::new(range, &mut out));
    range = range.following();

    let before = allocations();
    for _ in 0..10_000 {
        player.process(&mut ProcessContext::new(range, &mut out));
        range = range.following();
    }
    assert_eq!(
        allocations(),
        before,
        "NodePlayer::process should not allocate"
    );
}

#[test]
fn rt_alloc_invariant_with_workers() {
    // Workers compete for claims here, so the driver's claim loop and
    // snapshot loads run against other threads.
    let mut graph = Graph::new();
    let mix = graph.add_node(Mix::new(1));
    for i in 0..8 {
        let osc = graph.add_node(Sine::new(110.0 * (i + 1) as f64));
        let gain = graph.add_node(Gain::new(0.125));
        graph.connect(osc, gain).unwrap();
        graph.connect(gain, mix).unwrap();
    }
    graph.set_root(mix).unwrap();

    let mut player = NodePlayer::new(
        PlayerConfig::default()
            .with_workers(WorkerCount::Fixed(2))
            .with_block_size(64)
            .with_signal_capacity(64_000),
    );
    player.set_graph(graph).unwrap();
    let mut out = Buffers::new(1, 64, 32);
    let mut range = SampleRange::with_length(0, 64);

    for _ in 0..200 {
        player.process(&mut ProcessContext::new(range, &mut out));
        range = range.following();
    }

    let before = allocations();
    for _ in 0..5_000 {
        player.process(&mut ProcessContext::new(range, &mut out));
        range = range.following();
    }
    assert_eq!(
        allocations(),
        before,
        "NodePlayer::process should not allocate with workers running"
    );
}
