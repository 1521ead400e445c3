//! Stage wrapping a point mapping.

use crate::core::area::Dimensions;
use crate::core::error::GeometryResult;
use crate::filters::stage::{FilterStage, StageKind};
use crate::geometry::chain::MappingChain;
use crate::geometry::point::PointMapping;
use std::sync::Arc;

/// A geometric filter: rotation, perspective, lens correction and the like.
#[derive(Debug, Clone)]
pub struct GeometricStage {
    id: String,
    chain: MappingChain,
}

impl GeometricStage {
    /// Wrap a mapping.
    pub fn new(id: impl Into<String>, mapping: impl PointMapping + 'static) -> Self {
        Self::from_arc(id, Arc::new(mapping))
    }

    /// Wrap a shared mapping.
    pub fn from_arc(id: impl Into<String>, mapping: Arc<dyn PointMapping>) -> Self {
        let mut chain = MappingChain::new();
        chain.push(mapping);
        Self {
            id: id.into(),
            chain,
        }
    }
}

impl FilterStage for GeometricStage {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StageKind {
        StageKind::Geometric
    }

    fn mapping(&self) -> Option<Arc<dyn PointMapping>> {
        self.chain.mappings().first().cloned()
    }

    fn size_forward(&self, input: &Dimensions) -> GeometryResult<Dimensions> {
        self.chain.size_forward(input)
    }

    fn size_backward(&self, before: &Dimensions, after: &Dimensions) -> GeometryResult<Dimensions> {
        self.chain.size_backward(before, after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Point;
    use crate::geometry::transforms::Rotation;

    #[test]
    fn test_geometric_stage_delegates_to_mapping() {
        let stage = GeometricStage::new("rotate", Rotation::new(10.0, Point::new(2000.0, 1500.0)));
        assert_eq!(stage.kind(), StageKind::Geometric);
        assert!(stage.mapping().is_some());

        let source = Dimensions::new(4000, 3000);
        let out = stage.size_forward(&source).unwrap();
        assert_eq!(out.size.w, 4461);

        let back = stage.size_backward(&source, &out).unwrap();
        assert!(back.rect().contains(&source.rect(), 1e-6));
        assert!(back.edges.is_zero());
    }
}
