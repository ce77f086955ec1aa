//! Checked invariants for the non-real-time paths.
//!
//! Graph building, preparation, publishing and pool management call
//! [`assert_invariant`]. A failed check panics. With the `ppt` feature every
//! checked id is also recorded, so tests can require that a code path
//! actually ran its checks ([`contract_test`]).
//!
//! Recording takes a mutex, so the audio thread never calls into this
//! module; see `invariant_rt` for its counterpart.

#[cfg(feature = "ppt")]
use lazy_static::lazy_static;
#[cfg(feature = "ppt")]
use std::collections::HashSet;
#[cfg(feature = "ppt")]
use std::sync::{Mutex, MutexGuard};

/// `add_edge` accepted an edge between two live nodes.
pub const GRAPH_LEGALITY: u32 = 1;
/// `add_edge` refused a self-loop, duplicate, dangling edge or cycle.
pub const GRAPH_REJECTS_INVALID: u32 = 2;
pub const PLAN_SOUNDNESS: u32 = 3;
/// Every slot's inputs come before it.
pub const PLAN_TOPOLOGICAL: u32 = 4;
pub const PLAN_ROOT_LAST: u32 = 5;
pub const PLAN_STATE_CARRY: u32 = 6;
pub const HANDOFF_PUBLISHED: u32 = 7;
/// A publish replaced a graph the audio thread never adopted.
pub const HANDOFF_SUPERSEDED: u32 = 8;
pub const POOL_STARTED: u32 = 9;
pub const POOL_JOINED: u32 = 10;
pub const RETIRED_RECLAIMED: u32 = 11;

#[cfg(feature = "ppt")]
lazy_static! {
    static ref CHECKED: Mutex<HashSet<u32>> = Mutex::new(HashSet::new());
}

#[cfg(feature = "ppt")]
fn checked() -> MutexGuard<'static, HashSet<u32>> {
    // A failed contract poisons the lock; the set itself stays valid.
    CHECKED.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn failure(id: u32, message: &str, context: Option<&str>) -> String {
    match context {
        Some(context) => format!("invariant {id} violated in {context}: {message}"),
        None => format!("invariant {id} violated: {message}"),
    }
}

/// Panic with `message` unless `condition` holds, and record `id`.
pub(crate) fn assert_invariant(id: u32, condition: bool, message: &str, context: Option<&str>) {
    if !condition {
        let failure = failure(id, message, context);
        tracing::error!(id, "{failure}");
        panic!("{failure}");
    }
    #[cfg(feature = "ppt")]
    checked().insert(id);
}

/// Panic unless every id in `required` has been checked since the last
/// [`clear_invariant_log`].
#[cfg(feature = "ppt")]
pub fn contract_test(contract: &str, required: &[u32]) {
    let missing: Vec<u32> = {
        let log = checked();
        required
            .iter()
            .copied()
            .filter(|id| !log.contains(id))
            .collect()
    };
    if !missing.is_empty() {
        panic!("contract '{contract}' failed: invariants not enforced: {missing:?}");
    }
}

#[cfg(not(feature = "ppt"))]
pub fn contract_test(_contract: &str, _required: &[u32]) {}

#[cfg(feature = "ppt")]
pub fn clear_invariant_log() {
    checked().clear();
}

#[cfg(not(feature = "ppt"))]
pub fn clear_invariant_log() {}
