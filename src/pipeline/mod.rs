//! Filter chains, plans and tiles.
//!
//! A [`FilterChain`] is planned forward once per source
//! ([`FilterChain::plan`]), then every output tile is planned backward
//! ([`FilterChain::plan_tile`]) to find the source pixels it depends on.

pub mod chain;
pub mod plan;
pub mod resample;
pub mod tiles;

pub use chain::{FilterChain, Segment};
pub use plan::{PipelinePlan, SegmentPlan, TilePlan};
pub use resample::{Resampler, Rgb, RgbPlane};
pub use tiles::{plan_tiles, TileGrid};
