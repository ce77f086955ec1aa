//! Busy-wait primitives used on the real-time paths.
//!
//! Nothing in here ever parks a thread or enters the OS scheduler. Waits are
//! built from the CPU pause hint, with a bounded exponential backoff so a
//! long wait does not hammer the cache line it polls.

#![forbid(unsafe_code)]

use crossbeam_utils::Backoff;

/// Number of pause hints issued by a single [`pause`].
pub const PAUSE_BURST: usize = 8;

/// Issues a short burst of CPU pause hints.
#[inline]
pub fn pause() {
    for _ in 0..PAUSE_BURST {
        std::hint::spin_loop();
    }
}

/// Spins until `condition` returns true.
///
/// The condition is polled first, so an already-satisfied wait costs one
/// call. Between polls the backoff doubles up to its fixed limit and then
/// stays there.
#[inline]
pub fn spin_until(mut condition: impl FnMut() -> bool) {
    let backoff = Backoff::new();
    while !condition() {
        backoff.spin();
    }
}

/// Idle wait for threads polling for work.
///
/// Wraps a [`Backoff`] that is reset whenever work was found, so a busy
/// worker polls tightly and an idle one settles at the backoff limit.
#[derive(Debug, Default)]
pub struct IdleSpin {
    backoff: Backoff,
}

impl IdleSpin {
    /// Create a fresh idle wait.
    pub fn new() -> Self {
        Self::default()
    }

    /// Call after a successful poll.
    #[inline]
    pub fn reset(&self) {
        self.backoff.reset();
    }

    /// Call after an empty poll.
    #[inline]
    pub fn idle(&self) {
        pause();
        self.backoff.spin();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn spin_until_returns_immediately_when_satisfied() {
        let polls = AtomicUsize::new(0);
        spin_until(|| {
            polls.fetch_add(1, Ordering::Relaxed);
            true
        });
        assert_eq!(polls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn spin_until_observes_flag_from_other_thread() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = {
            let flag = Arc::clone(&flag);
            thread::spawn(move || {
                for _ in 0..1000 {
                    pause();
                }
                flag.store(true, Ordering::Release);
            })
        };
        spin_until(|| flag.load(Ordering::Acquire));
        setter.join().unwrap();
        assert!(flag.load(Ordering::Acquire));
    }

    #[test]
    fn idle_spin_is_bounded() {
        // Far past the backoff limit: each call must still return.
        let idle = IdleSpin::new();
        for _ in 0..10_000 {
            idle.idle();
        }
        idle.reset();
    }
}
