//! # Rawflow - Concurrent tile processing for RAW photo pipelines
//!
//! Rawflow is the scheduling and geometry core of an interactive RAW
//! pipeline: a chain of filters re-executed for full-resolution export and
//! for fast preview tiles.
//!
//! ## Features
//!
//! - **Fork-join episodes**: run one body on N workers with full and split
//!   barriers, a shared work cursor and per-thread private slots
//! - **Priority preemption**: a higher-priority episode parks lower ones at
//!   their next barrier until it finishes
//! - **Tile-size negotiation**: compose geometric filters' point mappings to
//!   find which input region (halo included) an output tile needs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rawflow::prelude::*;
//!
//! let source = Dimensions::new(4000, 3000);
//! let chain = FilterChain::from_specs(
//!     &[StageSpec::Rotate { angle: 10.0 }, StageSpec::Blur { radius: 2 }],
//!     &source,
//!     DEFAULT_MARGIN,
//! )?;
//!
//! // Forward: how large is the result?
//! let plan = chain.plan(&source)?;
//!
//! // Backward: what does each preview tile need?
//! let grid = TileGrid::new(&plan.output, 256, 256, 4.0);
//! let tiles = plan_tiles(&chain, &plan, grid)?;
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: Region descriptors, errors and configuration
//! - [`threading`]: Barriers, work cursor, priority registry and `Flow`
//! - [`geometry`]: Point mappings and mapping chains
//! - [`filters`]: Filter stages and their descriptions
//! - [`pipeline`]: Filter chains, plans, tiling and resampling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod filters;
pub mod geometry;
pub mod pipeline;
pub mod threading;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust,ignore
/// use rawflow::prelude::*;
/// ```
pub mod prelude {
    // Regions
    pub use crate::core::area::{Dimensions, Edges, Position, Rect, Size};

    // Configuration
    pub use crate::core::config::EngineConfig;

    // Errors
    pub use crate::core::error::{
        ConfigError, EpisodeId, FlowError, FlowResult, GeometryError, GeometryResult,
        RawflowError, RawflowResult,
    };

    // Threading
    pub use crate::threading::{
        run_flow, Flow, FlowStats, Priority, PriorityRegistry, SubFlow, WorkCursor,
    };

    // Geometry
    pub use crate::geometry::{
        ChromaticAberration, Distortion, MappingChain, Point, PointMapping, Rotation, Scale,
        Shift, DEFAULT_MARGIN,
    };

    // Filters
    pub use crate::filters::builtin::{CropStage, GeometricStage, KernelOp, KernelStage, ToneStage};
    pub use crate::filters::{FilterStage, StageKind, StageSpec};

    // Pipeline
    pub use crate::pipeline::{
        plan_tiles, FilterChain, PipelinePlan, Resampler, RgbPlane, TileGrid, TilePlan,
    };
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
