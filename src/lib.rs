//! Lock-free multi-threaded audio graph player.
//!
//! A [`Graph`] of [`Node`]s is prepared into an immutable, dependency-ordered
//! snapshot and handed to a [`NodePlayer`]. Each audio callback the player's
//! driver thread and a pool of spinning workers claim nodes from a shared
//! atomic counter and process them as soon as their inputs are complete.

pub mod buffers;
pub mod claim;
pub mod config;
pub mod control;
pub mod dsl;
pub mod graph;
mod handoff;
#[doc(hidden)]
pub mod invariant_ppt;
#[doc(hidden)]
pub mod invariant_rt;
pub mod node;
pub mod nodes;
pub mod plan;
mod pool;
pub mod render;
pub mod rt;
pub mod spin;

pub use buffers::{AudioBuffer, Buffers};
pub use config::{PlayerConfig, WorkerCount};
pub use control::{ControlEvent, ControlMsg, EventBuffer};
pub use graph::{Graph, GraphError, NodeId};
pub use node::{Inputs, Node, PlaybackInit, ProcessArgs, SampleRange, SharedState, StateCarry};
pub use plan::{PlanError, PreparedGraph};
pub use rt::{NodePlayer, PlayerControl, PlayerError, ProcessContext, ProcessStatus};
