//! Signals raised by the audio thread.
//!
//! `NodePlayer::process` cannot lock or format, so it reports what each
//! callback did as one-byte ids pushed into an `rtrb` queue. The control
//! side drains the queue whenever it likes; tests tally the ids and check
//! that a scenario raised the ones it should.

use rtrb::{Consumer, Producer, RingBuffer};
use std::fmt;

/// A callback ran every node of the active graph.
pub const INV_BLOCK_PROCESSED: u8 = 1;
/// A pending graph was adopted at the start of a callback.
pub const INV_GRAPH_ADOPTED: u8 = 2;
/// A callback found no graph with a root to run.
pub const INV_NO_GRAPH: u8 = 3;
/// A callback found a graph that was never prepared for playback.
pub const INV_NOT_PREPARED: u8 = 4;
/// A callback asked for more frames than the prepared block size.
pub const INV_BLOCK_TOO_LARGE: u8 = 5;
/// The root's output was copied to the caller's buffers.
pub const INV_OUTPUT_COPIED: u8 = 6;
/// The retire queue was full and a graph was dropped on the audio thread.
pub const INV_RETIRE_OVERFLOW: u8 = 7;
/// Control events did not fit in the caller's buffers.
pub const INV_EVENTS_DROPPED: u8 = 8;

/// Default number of signals held between two drains.
pub const SIGNAL_QUEUE_CAPACITY: usize = 256;

/// A queue holding at most `capacity` signals (at least one). The producer
/// belongs to the audio thread.
pub fn signal_queue(capacity: usize) -> (Producer<u8>, Consumer<u8>) {
    RingBuffer::new(capacity.max(1))
}

/// Push `id` without blocking. When the queue is full the signal is lost.
#[inline]
pub fn signal_invariant(tx: &mut Producer<u8>, id: u8) {
    let _ = tx.push(id);
}

/// Everything signalled since the last drain, oldest first.
pub fn drain_invariant_signals(rx: &mut Consumer<u8>) -> Vec<u8> {
    let mut signals = Vec::with_capacity(rx.slots());
    while let Ok(id) = rx.pop() {
        signals.push(id);
    }
    signals
}

/// Short name of a signal id, for assertion messages.
pub const fn signal_name(id: u8) -> &'static str {
    match id {
        INV_BLOCK_PROCESSED => "block processed",
        INV_GRAPH_ADOPTED => "graph adopted",
        INV_NO_GRAPH => "no graph",
        INV_NOT_PREPARED => "not prepared",
        INV_BLOCK_TOO_LARGE => "block too large",
        INV_OUTPUT_COPIED => "output copied",
        INV_RETIRE_OVERFLOW => "retire overflow",
        INV_EVENTS_DROPPED => "events dropped",
        _ => "unknown",
    }
}

/// How often each id occurs in a drained batch.
#[derive(Clone, PartialEq, Eq)]
pub struct SignalCounts {
    counts: [usize; 256],
}

impl SignalCounts {
    pub fn tally(signals: &[u8]) -> Self {
        let mut counts = [0; 256];
        for &id in signals {
            counts[usize::from(id)] += 1;
        }
        Self { counts }
    }

    pub fn get(&self, id: u8) -> usize {
        self.counts[usize::from(id)]
    }

    /// The ids of `required` that never occurred.
    pub fn missing(&self, required: &[u8]) -> Vec<u8> {
        required.iter().copied().filter(|&id| self.get(id) == 0).collect()
    }
}

impl fmt::Debug for SignalCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                (0..=u8::MAX)
                    .filter(|&id| self.get(id) > 0)
                    .map(|id| (signal_name(id), self.get(id))),
            )
            .finish()
    }
}

/// Panic unless every id in `required` occurs in `signals`.
pub fn expect_signals(scenario: &str, signals: &[u8], required: &[u8]) {
    let counts = SignalCounts::tally(signals);
    let missing: Vec<&str> = counts
        .missing(required)
        .into_iter()
        .map(signal_name)
        .collect();
    if !missing.is_empty() {
        panic!("'{scenario}' never signalled {missing:?}, saw {counts:?}");
    }
}
