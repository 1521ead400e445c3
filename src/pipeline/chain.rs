//! Ordered filter chain with geometric segments.
//!
//! Stages are stored in insertion order under unique ids. Runs of
//! consecutive geometric stages are folded into one [`MappingChain`] as they
//! are pushed, so negotiation maps points through the whole run at once
//! instead of snapping to a pixel grid between every geometric filter.

use crate::core::area::Dimensions;
use crate::core::error::{GeometryError, GeometryResult};
use crate::filters::spec::StageSpec;
use crate::filters::stage::{FilterStage, StageKind};
use crate::geometry::chain::{MappingChain, DEFAULT_MARGIN};
use indexmap::IndexMap;
use log::debug;
use std::sync::Arc;

/// Unit of negotiation: a run of geometric stages, or one other stage.
#[derive(Debug, Clone)]
pub enum Segment {
    /// Consecutive geometric stages composed into one mapping chain.
    Geometric {
        /// Ids of the composed stages, in order.
        ids: Vec<String>,
        /// The composed mappings.
        chain: MappingChain,
    },
    /// Any non-geometric stage.
    Stage(Arc<dyn FilterStage>),
}

impl Segment {
    /// Human-readable label: the stage id, or the composed ids joined by `+`.
    pub fn label(&self) -> String {
        match self {
            Segment::Geometric { ids, .. } => ids.join("+"),
            Segment::Stage(stage) => stage.id().to_string(),
        }
    }

    /// Check if this segment resamples through point mappings.
    pub fn is_geometric(&self) -> bool {
        matches!(self, Segment::Geometric { .. })
    }

    /// Forward size negotiation.
    pub fn size_forward(&self, input: &Dimensions) -> GeometryResult<Dimensions> {
        match self {
            Segment::Geometric { chain, .. } => chain.size_forward(input),
            Segment::Stage(stage) => stage.size_forward(input),
        }
    }

    /// Backward size negotiation.
    pub fn size_backward(&self, before: &Dimensions, after: &Dimensions) -> GeometryResult<Dimensions> {
        match self {
            Segment::Geometric { chain, .. } => chain.size_backward(before, after),
            Segment::Stage(stage) => stage.size_backward(before, after),
        }
    }
}

/// Ordered, uniquely named filter stages.
#[derive(Debug, Clone)]
pub struct FilterChain {
    stages: IndexMap<String, Arc<dyn FilterStage>>,
    segments: Vec<Segment>,
    margin: f64,
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::with_margin(DEFAULT_MARGIN)
    }

    /// Create an empty chain whose geometric segments use `margin` output
    /// pixels of backward safety margin.
    pub fn with_margin(margin: f64) -> Self {
        Self {
            stages: IndexMap::new(),
            segments: Vec::new(),
            margin,
        }
    }

    /// Build a chain from stage descriptions for a pipeline whose source is
    /// `frame`. Repeated kinds get numbered ids (`blur`, `blur-2`, ...).
    pub fn from_specs(specs: &[StageSpec], frame: &Dimensions, margin: f64) -> GeometryResult<Self> {
        let mut chain = Self::with_margin(margin);
        for spec in specs {
            let base = spec.default_id();
            let mut id = base.to_string();
            let mut n = 1;
            while chain.contains(&id) {
                n += 1;
                id = format!("{base}-{n}");
            }
            chain.push(spec.build(id, frame)?)?;
        }
        Ok(chain)
    }

    /// Append a stage. Ids must be unique.
    pub fn push(&mut self, stage: Arc<dyn FilterStage>) -> GeometryResult<()> {
        let id = stage.id().to_string();
        if self.stages.contains_key(&id) {
            return Err(GeometryError::DuplicateStage(id));
        }

        match (stage.kind(), stage.mapping()) {
            (StageKind::Geometric, Some(mapping)) => match self.segments.last_mut() {
                Some(Segment::Geometric { ids, chain }) => {
                    ids.push(id.clone());
                    chain.push(mapping);
                }
                _ => {
                    let mut chain = MappingChain::new().with_margin(self.margin);
                    chain.push(mapping);
                    self.segments.push(Segment::Geometric {
                        ids: vec![id.clone()],
                        chain,
                    });
                }
            },
            _ => self.segments.push(Segment::Stage(stage.clone())),
        }

        debug!("Added stage '{}' ({})", id, stage.kind());
        self.stages.insert(id, stage);
        Ok(())
    }

    /// Builder variant of [`FilterChain::push`].
    pub fn with_stage(mut self, stage: impl FilterStage + 'static) -> GeometryResult<Self> {
        self.push(Arc::new(stage))?;
        Ok(self)
    }

    /// Check if a stage id is taken.
    pub fn contains(&self, id: &str) -> bool {
        self.stages.contains_key(id)
    }

    /// Look up a stage by id.
    pub fn get(&self, id: &str) -> Option<&Arc<dyn FilterStage>> {
        self.stages.get(id)
    }

    /// Stage ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if the chain has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Negotiation segments in order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Backward safety margin of geometric segments.
    pub fn margin(&self) -> f64 {
        self.margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::builtin::{GeometricStage, KernelOp, KernelStage, ToneStage};
    use crate::geometry::point::Point;
    use crate::geometry::transforms::{Rotation, Scale};

    fn center() -> Point {
        Point::new(2000.0, 1500.0)
    }

    #[test]
    fn test_consecutive_geometric_stages_are_composed() {
        let chain = FilterChain::new()
            .with_stage(ToneStage::new("exposure"))
            .unwrap()
            .with_stage(GeometricStage::new("rotate", Rotation::new(5.0, center())))
            .unwrap()
            .with_stage(GeometricStage::new("scale", Scale::new(0.5, center()).unwrap()))
            .unwrap()
            .with_stage(KernelStage::new("sharpen", KernelOp::Sharpen, 2).unwrap())
            .unwrap()
            .with_stage(GeometricStage::new("rotate-2", Rotation::new(-1.0, center())))
            .unwrap();

        assert_eq!(chain.len(), 5);
        let labels: Vec<_> = chain.segments().iter().map(Segment::label).collect();
        assert_eq!(labels, ["exposure", "rotate+scale", "sharpen", "rotate-2"]);
        match &chain.segments()[1] {
            Segment::Geometric { chain, .. } => assert_eq!(chain.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            chain.ids().collect::<Vec<_>>(),
            ["exposure", "rotate", "scale", "sharpen", "rotate-2"]
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut chain = FilterChain::new();
        chain.push(Arc::new(ToneStage::new("a"))).unwrap();
        assert_eq!(
            chain.push(Arc::new(ToneStage::new("a"))),
            Err(GeometryError::DuplicateStage("a".to_string()))
        );
        assert!(chain.get("a").is_some());
    }

    #[test]
    fn test_from_specs_numbers_repeated_kinds() {
        let specs = [
            StageSpec::Blur { radius: 1 },
            StageSpec::Blur { radius: 2 },
            StageSpec::Rotate { angle: 2.0 },
        ];
        let chain = FilterChain::from_specs(&specs, &Dimensions::new(100, 100), 1.0).unwrap();
        assert_eq!(chain.ids().collect::<Vec<_>>(), ["blur", "blur-2", "rotate"]);
        assert!(chain.segments()[2].is_geometric());
    }
}
