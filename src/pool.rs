//! Worker thread pool.
//!
//! Workers spin on the shared work counter and process whatever they claim.
//! The pool is started once and never resized; stopping it is final.

use crate::invariant_ppt::{assert_invariant, POOL_JOINED, POOL_STARTED};
use crate::rt::{PlayerError, Shared};
use crate::spin::IdleSpin;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

pub(crate) struct WorkerPool {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
    stopped: bool,
}

impl WorkerPool {
    /// Spawn `count` workers. If any spawn fails, the workers already
    /// started are stopped and joined before the error is returned.
    pub(crate) fn start(shared: Arc<Shared>, count: usize) -> Result<Self, PlayerError> {
        shared.clear_exit();
        let mut pool = Self {
            shared,
            threads: Vec::with_capacity(count),
            stopped: false,
        };
        for index in 0..count {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("spinplay-worker-{index}"))
                .spawn(move || worker_loop(shared))
                .map_err(|source| PlayerError::ThreadSpawn { index, source })?;
            pool.threads.push(handle);
        }
        assert_invariant(
            POOL_STARTED,
            pool.threads.len() == count,
            "Every requested worker was spawned",
            Some("WorkerPool::start"),
        );
        info!(workers = count, "worker pool started");
        Ok(pool)
    }

    pub(crate) fn len(&self) -> usize {
        self.threads.len()
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Ask every worker to exit and join them. Idempotent.
    pub(crate) fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.shared.request_exit();
        let count = self.threads.len();
        for (index, handle) in self.threads.drain(..).enumerate() {
            if handle.join().is_err() {
                error!(index, "worker thread panicked");
            }
        }
        assert_invariant(
            POOL_JOINED,
            self.threads.is_empty(),
            "All workers joined",
            Some("WorkerPool::stop"),
        );
        debug!(workers = count, "worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    let idle = IdleSpin::new();
    while !shared.should_exit() {
        if shared.process_next_free_node() {
            idle.reset();
        } else {
            idle.idle();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_stop_is_idempotent() {
        let shared = Arc::new(Shared::new());
        let mut pool = WorkerPool::start(Arc::clone(&shared), 3).unwrap();
        assert_eq!(pool.len(), 3);
        pool.stop();
        assert!(pool.is_stopped());
        assert_eq!(pool.len(), 0);
        pool.stop();
        assert!(shared.should_exit());
    }

    #[test]
    fn empty_pool_is_valid() {
        let shared = Arc::new(Shared::new());
        let pool = WorkerPool::start(shared, 0).unwrap();
        assert_eq!(pool.len(), 0);
    }
}
