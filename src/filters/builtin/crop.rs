//! Crop stage.

use crate::core::area::{Dimensions, Rect};
use crate::core::error::{GeometryError, GeometryResult};
use crate::filters::stage::{FilterStage, StageKind};

/// Keeps only the part of the area inside a stored photo rectangle.
#[derive(Debug, Clone)]
pub struct CropStage {
    id: String,
    rect: Rect,
}

impl CropStage {
    /// Create a crop to `rect` (photo coordinates after the preceding stages).
    pub fn new(id: impl Into<String>, rect: Rect) -> GeometryResult<Self> {
        if rect.is_empty() {
            return Err(GeometryError::parameter("rect", "crop rectangle is empty"));
        }
        Ok(Self { id: id.into(), rect })
    }

    /// The crop rectangle.
    pub fn rect(&self) -> Rect {
        self.rect
    }
}

impl FilterStage for CropStage {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StageKind {
        StageKind::Crop
    }

    fn size_forward(&self, input: &Dimensions) -> GeometryResult<Dimensions> {
        input.validate()?;
        let kept = input.rect().intersect(&self.rect);
        if kept.is_empty() {
            return Err(GeometryError::EmptyRegion {
                stage: self.id.clone(),
            });
        }
        Dimensions::snap_to_grid(&kept, &input.position)
    }

    // Cropping never moves pixels, so the request passes through untouched.
    fn size_backward(&self, _before: &Dimensions, after: &Dimensions) -> GeometryResult<Dimensions> {
        Ok(*after)
    }
}
