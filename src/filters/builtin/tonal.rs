//! Per-pixel stages.

use crate::core::area::Dimensions;
use crate::core::error::GeometryResult;
use crate::filters::stage::{FilterStage, StageKind};

/// A per-pixel filter (exposure, curves, colour). Geometrically the identity.
#[derive(Debug, Clone)]
pub struct ToneStage {
    id: String,
}

impl ToneStage {
    /// Create a tonal stage.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl FilterStage for ToneStage {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StageKind {
        StageKind::Tonal
    }

    fn size_forward(&self, input: &Dimensions) -> GeometryResult<Dimensions> {
        input.validate()?;
        Ok(*input)
    }

    fn size_backward(&self, _before: &Dimensions, after: &Dimensions) -> GeometryResult<Dimensions> {
        Ok(*after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::area::Edges;

    #[test]
    fn test_tone_is_identity() {
        let stage = ToneStage::new("exposure");
        let d = Dimensions::new(10, 20).with_edges(Edges::symmetric(2));
        assert_eq!(stage.size_forward(&d).unwrap(), d);
        assert_eq!(stage.size_backward(&d, &d).unwrap(), d);
        assert_eq!(stage.kind(), StageKind::Tonal);
    }
}
