//! Composition of point mappings and tile-size negotiation.
//!
//! A [`MappingChain`] threads points through an ordered list of
//! [`PointMapping`]s. On top of that it answers the two negotiation questions
//! of a geometric segment:
//!
//! - [`MappingChain::size_forward`]: which output area does a full input area
//!   produce?
//! - [`MappingChain::size_backward`]: which input area (on the input grid) is
//!   needed to compute a given output tile, halo included?
//!
//! Both sample only the boundary of the rectangle being mapped, which is exact
//! for mappings that are monotonic along straight edges.

use crate::core::area::{Dimensions, Rect, SNAP_EPSILON};
use crate::core::error::{GeometryError, GeometryResult};
use crate::geometry::point::{rgb, Point, PointMapping, RgbPoint};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default safety margin around a backward request, in output pixels.
pub const DEFAULT_MARGIN: f64 = 1.0;

/// Input footprints of one output tile, per colour channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Footprints {
    /// Red, green and blue footprints in input coordinates.
    pub channels: [Rect; 3],
    /// Union of the channel footprints.
    pub union: Rect,
}

/// Ordered composition of point mappings.
#[derive(Debug, Clone)]
pub struct MappingChain {
    mappings: Vec<Arc<dyn PointMapping>>,
    margin: f64,
}

impl Default for MappingChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingChain {
    /// Create an empty (identity) chain.
    pub fn new() -> Self {
        Self {
            mappings: Vec::new(),
            margin: DEFAULT_MARGIN,
        }
    }

    /// Append a mapping.
    pub fn push(&mut self, mapping: Arc<dyn PointMapping>) {
        self.mappings.push(mapping);
    }

    /// Builder variant of [`MappingChain::push`].
    pub fn with(mut self, mapping: impl PointMapping + 'static) -> Self {
        self.push(Arc::new(mapping));
        self
    }

    /// Set the backward safety margin in output pixels.
    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin.max(0.0);
        self
    }

    /// Backward safety margin in output pixels.
    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// Number of mappings.
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Check if the chain is the identity.
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// The mappings in order.
    pub fn mappings(&self) -> &[Arc<dyn PointMapping>] {
        &self.mappings
    }

    /// Check if any mapping treats channels independently.
    pub fn is_rgb(&self) -> bool {
        self.mappings.iter().any(|m| m.is_rgb())
    }

    /// Thread a point through every mapping, first to last.
    pub fn forward_rgb(&self, points: RgbPoint) -> RgbPoint {
        self.mappings
            .iter()
            .fold(points, |p, m| m.process_forward_rgb(p))
    }

    /// Thread a point back through every mapping, last to first.
    pub fn backward_rgb(&self, points: RgbPoint) -> RgbPoint {
        self.mappings
            .iter()
            .rev()
            .fold(points, |p, m| m.process_backward_rgb(p))
    }

    /// Single-channel forward mapping (green channel).
    pub fn forward(&self, point: Point) -> Point {
        self.forward_rgb(rgb(point))[1]
    }

    /// Single-channel backward mapping (green channel).
    pub fn backward(&self, point: Point) -> Point {
        self.backward_rgb(rgb(point))[1]
    }

    /// Output area produced from the whole of `input`.
    ///
    /// Clipping mappings shrink the running rectangle to the part every
    /// channel still covers; the others replace it by the bound of all mapped
    /// samples. The result keeps the input pitch and carries no halo.
    pub fn size_forward(&self, input: &Dimensions) -> GeometryResult<Dimensions> {
        input.validate()?;
        let (px, py) = input.pitch();
        let mut running = input.rect();
        let mut samples: Vec<RgbPoint> = boundary_samples(&running, px, py)
            .into_iter()
            .map(rgb)
            .collect();

        for (index, mapping) in self.mappings.iter().enumerate() {
            for sample in samples.iter_mut() {
                *sample = mapping.process_forward_rgb(*sample);
            }
            let clip = mapping.to_clip();
            running = if clip {
                let mut common = channel_bounds(&samples, 0);
                for channel in 1..3 {
                    common = common.intersect(&channel_bounds(&samples, channel));
                }
                running.intersect(&common)
            } else {
                union_bounds(&samples)
            };
            if running.is_empty() {
                return Err(GeometryError::EmptyRegion {
                    stage: format!("mapping #{index}"),
                });
            }
            // later mappings only see what survived the clip
            if clip {
                samples = boundary_samples(&running, px, py)
                    .into_iter()
                    .map(rgb)
                    .collect();
            }
        }

        let w = (running.width() / px - SNAP_EPSILON).ceil().max(1.0);
        let h = (running.height() / py - SNAP_EPSILON).ceil().max(1.0);
        let output = Dimensions::new(w as u32, h as u32)
            .with_position(running.x1, running.y1)
            .with_pitch(px, py);
        output.validate()?;
        Ok(output)
    }

    /// Input area, on the grid of `before`, needed to compute `after`
    /// including its halo. The returned halo is zero: it has been folded into
    /// the request.
    pub fn size_backward(&self, before: &Dimensions, after: &Dimensions) -> GeometryResult<Dimensions> {
        let footprints = self.backward_footprints(after)?;
        Dimensions::snap_to_grid(&footprints.union, &before.position)
    }

    /// Per-channel input footprints of `after` (halo and safety margin
    /// included) and their union, before snapping to any grid.
    pub fn backward_footprints(&self, after: &Dimensions) -> GeometryResult<Footprints> {
        after.validate()?;
        let (px, py) = after.pitch();
        let request = after
            .full_rect()
            .inflate(self.margin * px, self.margin * py);

        let mapped: Vec<RgbPoint> = boundary_samples(&request, px, py)
            .into_iter()
            .map(|p| self.backward_rgb(rgb(p)))
            .collect();

        let channels = [
            channel_bounds(&mapped, 0),
            channel_bounds(&mapped, 1),
            channel_bounds(&mapped, 2),
        ];
        let union = channels[0].union(&channels[1]).union(&channels[2]);
        if union.is_empty() || !union.width().is_finite() || !union.height().is_finite() {
            return Err(GeometryError::EmptyRegion {
                stage: "backward mapping".to_string(),
            });
        }
        Ok(Footprints { channels, union })
    }
}

/// Points on the boundary of `rect`, corners included, spaced at most one
/// pitch apart.
pub fn boundary_samples(rect: &Rect, step_x: f64, step_y: f64) -> Vec<Point> {
    let nx = ((rect.width() / step_x).ceil() as usize).max(1);
    let ny = ((rect.height() / step_y).ceil() as usize).max(1);
    let dx = rect.width() / nx as f64;
    let dy = rect.height() / ny as f64;

    let mut points = Vec::with_capacity(2 * (nx + ny) + 4);
    for i in 0..=nx {
        let x = rect.x1 + i as f64 * dx;
        points.push(Point::new(x, rect.y1));
        points.push(Point::new(x, rect.y2));
    }
    for j in 1..ny {
        let y = rect.y1 + j as f64 * dy;
        points.push(Point::new(rect.x1, y));
        points.push(Point::new(rect.x2, y));
    }
    points
}

fn channel_bounds(points: &[RgbPoint], channel: usize) -> Rect {
    let mut bounds = Rect::empty();
    for p in points {
        bounds.include(p[channel].x, p[channel].y);
    }
    bounds
}

fn union_bounds(points: &[RgbPoint]) -> Rect {
    let mut bounds = Rect::empty();
    for p in points.iter().flatten() {
        bounds.include(p.x, p.y);
    }
    bounds
}
