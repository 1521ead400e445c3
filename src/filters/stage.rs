//! FilterStage trait and stage kinds.
//!
//! A stage is one filter of the pipeline seen only through its geometry: how
//! it changes the size of the area flowing forward, and what it needs from
//! its input to deliver a requested output tile. Pixel math lives elsewhere.

use crate::core::area::Dimensions;
use crate::core::error::GeometryResult;
use crate::geometry::point::PointMapping;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of stage, which decides how the pipeline composes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Moves pixels through a point mapping (rotation, lens, perspective).
    Geometric,
    /// Restricts the area to a stored rectangle.
    Crop,
    /// Reads a neighbourhood around every output pixel (blur, sharpen).
    Kernel,
    /// Per-pixel tone or colour change.
    Tonal,
}

impl StageKind {
    /// Get the display name for this kind.
    pub fn display_name(&self) -> &'static str {
        match self {
            StageKind::Geometric => "Geometric",
            StageKind::Crop => "Crop",
            StageKind::Kernel => "Kernel",
            StageKind::Tonal => "Tonal",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Geometric contract of one filter.
pub trait FilterStage: Send + Sync + fmt::Debug {
    /// Unique identifier within a chain.
    fn id(&self) -> &str;

    /// Stage kind.
    fn kind(&self) -> StageKind;

    /// Point mapping of geometric stages.
    fn mapping(&self) -> Option<Arc<dyn PointMapping>> {
        None
    }

    /// Output area produced from the whole of `input`.
    fn size_forward(&self, input: &Dimensions) -> GeometryResult<Dimensions>;

    /// Input request needed to deliver `after`. `before` is the area this
    /// stage received during forward planning; its grid is the one a
    /// resampling stage snaps onto.
    fn size_backward(&self, before: &Dimensions, after: &Dimensions) -> GeometryResult<Dimensions>;
}
