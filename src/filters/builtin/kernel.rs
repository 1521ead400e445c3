//! Neighbourhood stages: blur and sharpen.

use crate::core::area::Dimensions;
use crate::core::error::{GeometryError, GeometryResult};
use crate::filters::stage::{FilterStage, StageKind};
use serde::{Deserialize, Serialize};

/// Largest supported kernel radius in pixels.
pub const MAX_RADIUS: u32 = 512;

/// Neighbourhood operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelOp {
    /// Gaussian or box blur.
    Blur,
    /// Unsharp mask.
    Sharpen,
}

/// A filter reading `radius` pixels around each output pixel.
#[derive(Debug, Clone)]
pub struct KernelStage {
    id: String,
    op: KernelOp,
    radius: u32,
}

impl KernelStage {
    /// Create a kernel stage.
    pub fn new(id: impl Into<String>, op: KernelOp, radius: u32) -> GeometryResult<Self> {
        if radius > MAX_RADIUS {
            return Err(GeometryError::parameter(
                "radius",
                format!("{radius} exceeds {MAX_RADIUS}"),
            ));
        }
        Ok(Self {
            id: id.into(),
            op,
            radius,
        })
    }

    /// Kernel radius in pixels.
    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Operation.
    pub fn op(&self) -> KernelOp {
        self.op
    }
}

impl FilterStage for KernelStage {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StageKind {
        StageKind::Kernel
    }

    fn size_forward(&self, input: &Dimensions) -> GeometryResult<Dimensions> {
        input.validate()?;
        Ok(*input)
    }

    /// The halo grows by the radius, counted in the tile's own pitch.
    fn size_backward(&self, _before: &Dimensions, after: &Dimensions) -> GeometryResult<Dimensions> {
        after.validate()?;
        Ok(after.with_edges(after.edges.grow(self.radius)))
    }
}
