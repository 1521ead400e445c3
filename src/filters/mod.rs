//! Filter module.
//!
//! Contains the stage contract, the built-in stages and their serializable
//! descriptions.

pub mod builtin;
pub mod spec;
pub mod stage;

pub use spec::StageSpec;
pub use stage::{FilterStage, StageKind};
