//! Player configuration.

use crate::invariant_rt::SIGNAL_QUEUE_CAPACITY;

/// How many worker threads help the audio thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerCount {
    /// One less than the number of logical CPUs, at least one.
    #[default]
    Auto,
    /// Exactly this many; zero means the audio thread works alone.
    Fixed(usize),
}

impl WorkerCount {
    pub fn resolve(self) -> usize {
        match self {
            WorkerCount::Auto => num_cpus::get().saturating_sub(1).max(1),
            WorkerCount::Fixed(count) => count,
        }
    }
}

/// Settings for a [`NodePlayer`](crate::rt::NodePlayer).
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    pub workers: WorkerCount,
    /// Sample rate used by `set_graph` until playback is re-prepared.
    pub sample_rate: f64,
    /// Largest block a single `process` call may cover.
    pub block_size: usize,
    /// Retired graphs that can wait for collection before the audio thread
    /// has to drop one itself.
    pub retire_capacity: usize,
    /// Capacity of the real-time invariant signal queue.
    pub signal_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            workers: WorkerCount::Auto,
            sample_rate: 44_100.0,
            block_size: 512,
            retire_capacity: 16,
            signal_capacity: SIGNAL_QUEUE_CAPACITY,
        }
    }
}

impl PlayerConfig {
    pub fn with_workers(mut self, workers: WorkerCount) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_retire_capacity(mut self, capacity: usize) -> Self {
        self.retire_capacity = capacity;
        self
    }

    pub fn with_signal_capacity(mut self, capacity: usize) -> Self {
        self.signal_capacity = capacity;
        self
    }
}
