//! Forward and backward planning over a [`FilterChain`].
//!
//! [`FilterChain::plan`] runs forward negotiation once for the full source at
//! 1:1 and records what every segment receives and produces.
//! [`FilterChain::plan_tile`] then walks that record back to front for one
//! output tile, which may be sampled at a coarser pitch (preview).

use crate::core::area::Dimensions;
use crate::core::error::{GeometryError, GeometryResult};
use crate::pipeline::chain::FilterChain;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

/// Forward negotiation result of one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentPlan {
    /// Segment label.
    pub label: String,
    /// Area received from the previous segment.
    pub before: Dimensions,
    /// Area handed to the next segment.
    pub after: Dimensions,
}

/// Forward negotiation result of a whole chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelinePlan {
    /// Source frame.
    pub source: Dimensions,
    /// Per-segment areas, front to back.
    pub segments: Vec<SegmentPlan>,
    /// Final output area.
    pub output: Dimensions,
}

/// Backward negotiation result for one output tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilePlan {
    /// The requested output tile.
    pub tile: Dimensions,
    /// What each segment needs from its input, front to back.
    pub requests: Vec<Dimensions>,
    /// Source pixels to read, on the source grid with the halo absorbed and
    /// clamped to the frame. `None` when the tile needs nothing from the
    /// source.
    pub source: Option<Dimensions>,
}

impl TilePlan {
    /// Number of source pixels to read.
    pub fn source_pixels(&self) -> u64 {
        self.source.map_or(0, |s| s.size.area())
    }
}

impl FilterChain {
    /// Forward negotiation for the whole source.
    pub fn plan(&self, source: &Dimensions) -> GeometryResult<PipelinePlan> {
        source.validate()?;
        let mut current = *source;
        let mut segments = Vec::with_capacity(self.segments().len());
        for segment in self.segments() {
            let after = segment.size_forward(&current)?;
            trace!(
                "Segment '{}': {}x{} -> {}x{}",
                segment.label(),
                current.size.w,
                current.size.h,
                after.size.w,
                after.size.h
            );
            segments.push(SegmentPlan {
                label: segment.label(),
                before: current,
                after,
            });
            current = after;
        }
        debug!(
            "Planned {} segment(s): {}x{} -> {}x{}",
            segments.len(),
            source.size.w,
            source.size.h,
            current.size.w,
            current.size.h
        );
        Ok(PipelinePlan {
            source: *source,
            segments,
            output: current,
        })
    }

    /// Backward negotiation for one output tile of `plan`.
    ///
    /// Geometric segments snap their request onto the grid of the area they
    /// received, at the tile's pitch. Other segments keep the tile's pitch
    /// and only grow the halo. The last step regrids onto the source pitch.
    pub fn plan_tile(&self, plan: &PipelinePlan, tile: &Dimensions) -> GeometryResult<TilePlan> {
        if plan.segments.len() != self.segments().len() {
            return Err(GeometryError::PlanMismatch {
                reason: format!(
                    "plan has {} segment(s), chain has {}",
                    plan.segments.len(),
                    self.segments().len()
                ),
            });
        }
        tile.validate()?;

        let (px, py) = tile.pitch();
        let mut after = *tile;
        let mut requests = Vec::with_capacity(plan.segments.len());
        for (segment, recorded) in self.segments().iter().zip(&plan.segments).rev() {
            let grid = recorded.before.with_pitch(px, py);
            let request = segment.size_backward(&grid, &after)?;
            requests.push(request);
            after = request;
        }
        requests.reverse();

        let source = regrid(&after, &plan.source);
        trace!(
            "Tile at ({}, {}) needs {:?}",
            tile.position.x,
            tile.position.y,
            source.map(|s| (s.position.x, s.position.y, s.size.w, s.size.h))
        );
        Ok(TilePlan {
            tile: *tile,
            requests,
            source,
        })
    }
}

/// Move a request onto the source grid, fold its halo into the content and
/// clamp it to the source frame.
fn regrid(request: &Dimensions, source: &Dimensions) -> Option<Dimensions> {
    let snapped = Dimensions::snap_to_grid(&request.rect(), &source.position).ok()?;
    snapped
        .with_edges(request.edges.rescale(request.pitch(), source.pitch()))
        .clamp_to(&source.rect())
}
