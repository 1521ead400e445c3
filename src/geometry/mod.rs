//! Geometric point mappings and tile-size negotiation.
//!
//! Geometric filters describe themselves through a [`PointMapping`]; a
//! [`MappingChain`] composes consecutive mappings and works out which input
//! region an output tile depends on.

pub mod chain;
pub mod lens;
pub mod point;
pub mod transforms;

pub use chain::{boundary_samples, Footprints, MappingChain, DEFAULT_MARGIN};
pub use lens::{ChromaticAberration, Distortion, RadialTable, RadialTableCache, TableCacheStats};
pub use point::{rgb, Channel, Point, PointMapping, RgbPoint};
pub use transforms::{Projective, Rotation, Scale, Shift};
