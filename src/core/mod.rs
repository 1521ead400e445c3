//! Core types for the Rawflow engine.
//!
//! This module contains the foundational types shared by the scheduler and
//! the negotiation code:
//! - Region descriptors (size, position, pitch, halo)
//! - Error types
//! - Engine configuration

pub mod area;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use area::{Dimensions, Edges, Position, Rect, Size};
pub use config::EngineConfig;
pub use error::{ConfigError, EpisodeId, FlowError, GeometryError, RawflowError};
