//! Work claim protocol: lets any thread atomically reserve the next
//! unprocessed node of the active snapshot.

#![forbid(unsafe_code)]

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Largest node count a single snapshot may hold.
pub const MAX_CLAIMABLE: usize = u32::MAX as usize;

const REMAINING_MASK: u64 = u32::MAX as u64;

#[inline]
fn pack(total: u32, remaining: u32) -> u64 {
    ((total as u64) << 32) | remaining as u64
}

/// Remaining-work counter for one callback.
///
/// The word packs the node count of the current block (high half) with the
/// number of nodes not yet claimed (low half), so a successful CAS always
/// sees a consistent pair and the claimed index never mixes two blocks.
#[derive(Debug)]
pub struct WorkCounter {
    state: CachePadded<AtomicU64>,
}

impl WorkCounter {
    /// Create a counter with nothing to claim.
    pub fn new() -> Self {
        Self {
            state: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Open a new block of `total` claimable nodes.
    ///
    /// Release ordering: everything written before the reset (per-block node
    /// state, the block range) is visible to whoever claims afterwards.
    pub fn reset(&self, total: usize) {
        debug_assert!(total <= MAX_CLAIMABLE);
        let total = total.min(MAX_CLAIMABLE) as u32;
        self.state.store(pack(total, total), Ordering::Release);
    }

    /// Close the block without claiming anything further.
    pub fn clear(&self) {
        self.state.store(0, Ordering::Release);
    }

    /// Nodes not yet claimed in the current block.
    pub fn remaining(&self) -> usize {
        (self.state.load(Ordering::Acquire) & REMAINING_MASK) as usize
    }

    /// Node count of the current block.
    pub fn total(&self) -> usize {
        (self.state.load(Ordering::Acquire) >> 32) as usize
    }

    /// Claim the next node, returning its index in processing order.
    ///
    /// With `expected` nodes left out of `total`, a successful claim yields
    /// index `total - expected`, so indices are handed out front to back.
    /// Returns `None` once everything has been claimed. Contention is
    /// resolved by re-reading and retrying, never by waiting.
    #[inline]
    pub fn claim(&self) -> Option<usize> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let remaining = (current & REMAINING_MASK) as u32;
            if remaining == 0 {
                return None;
            }
            let total = (current >> 32) as u32;
            match self.state.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some((total - remaining) as usize),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for WorkCounter {
    fn default() -> Self {
        Self::new()
    }
}
