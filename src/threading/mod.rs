//! Fork-join scheduling for tiled pixel work.
//!
//! This module contains the episode machinery:
//! - [`barrier`]: the double-counter barrier behind both sync protocols
//! - [`cursor`]: the atomic work cursor
//! - [`subflow`]: a worker's handle into an episode
//! - [`flow`]: episode runner
//! - [`priority`]: process-wide priority table and pause gates

pub mod barrier;
pub mod cursor;
pub mod flow;
pub mod priority;
pub mod subflow;

pub use cursor::WorkCursor;
pub use flow::{run_flow, Flow, FlowStats};
pub use priority::{PauseGate, Priority, PriorityRegistry, Registration};
pub use subflow::{EpisodeShared, SubFlow};
