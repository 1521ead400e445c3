//! Region descriptors exchanged between pipeline stages.
//!
//! A [`Dimensions`] record describes a rectangular pixel area in the shared
//! photo coordinate space: where its top-left sample sits, how far apart
//! samples are (the pitch), how many content pixels are requested, and how
//! many halo pixels are needed around them.
//!
//! Coordinates follow the pixel-area convention: pixel `i` of a region covers
//! `[x + i * px, x + (i + 1) * px)`, so the content rectangle of a region is
//! `[x, x + w * px]`.

use crate::core::error::{GeometryError, GeometryResult};
use serde::{Deserialize, Serialize};

/// Tolerance used when converting continuous extents into pixel counts.
pub const SNAP_EPSILON: f64 = 1e-6;

/// Integer content size of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels.
    pub w: u32,
    /// Height in pixels.
    pub h: u32,
}

impl Size {
    /// Create a new size.
    pub fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    /// Number of pixels.
    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }
}

/// Top-left coordinate and sampling pitch of a region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Photo-space X of the top-left pixel.
    pub x: f64,
    /// Photo-space Y of the top-left pixel.
    pub y: f64,
    /// Horizontal pixel size in photo units.
    pub px_size_x: f64,
    /// Vertical pixel size in photo units.
    pub px_size_y: f64,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            px_size_x: 1.0,
            px_size_y: 1.0,
        }
    }
}

/// Halo pixel counts around the requested content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edges {
    /// Pixels needed to the left.
    pub x1: u32,
    /// Pixels needed to the right.
    pub x2: u32,
    /// Pixels needed above.
    pub y1: u32,
    /// Pixels needed below.
    pub y2: u32,
}

impl Edges {
    /// Same halo on all sides.
    pub fn symmetric(radius: u32) -> Self {
        Self {
            x1: radius,
            x2: radius,
            y1: radius,
            y2: radius,
        }
    }

    /// Check if any halo is requested.
    pub fn is_zero(&self) -> bool {
        self.x1 == 0 && self.x2 == 0 && self.y1 == 0 && self.y2 == 0
    }

    /// Grow every side by `radius`.
    pub fn grow(&self, radius: u32) -> Self {
        Self {
            x1: self.x1 + radius,
            x2: self.x2 + radius,
            y1: self.y1 + radius,
            y2: self.y2 + radius,
        }
    }

    /// Convert halo counts measured at one pitch into counts at another,
    /// rounding up so the converted halo still covers the original one.
    pub fn rescale(&self, from: (f64, f64), to: (f64, f64)) -> Self {
        let conv = |n: u32, a: f64, b: f64| -> u32 {
            if n == 0 {
                0
            } else {
                (n as f64 * a / b - SNAP_EPSILON).ceil().max(0.0) as u32
            }
        };
        Self {
            x1: conv(self.x1, from.0, to.0),
            x2: conv(self.x2, from.0, to.0),
            y1: conv(self.y1, from.1, to.1),
            y2: conv(self.y2, from.1, to.1),
        }
    }
}

/// Continuous rectangle in photo coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x1: f64,
    /// Top edge.
    pub y1: f64,
    /// Right edge.
    pub x2: f64,
    /// Bottom edge.
    pub y2: f64,
}

impl Rect {
    /// Create a new rectangle from its edges.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// The empty rectangle: neutral element of [`Rect::include`] and [`Rect::union`].
    pub fn empty() -> Self {
        Self {
            x1: f64::INFINITY,
            y1: f64::INFINITY,
            x2: f64::NEG_INFINITY,
            y2: f64::NEG_INFINITY,
        }
    }

    /// Width in photo units (0 when empty).
    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).max(0.0)
    }

    /// Height in photo units (0 when empty).
    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Centre point.
    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) * 0.5, (self.y1 + self.y2) * 0.5)
    }

    /// Check if the rectangle has no area.
    pub fn is_empty(&self) -> bool {
        !(self.x2 > self.x1 && self.y2 > self.y1)
    }

    /// Grow to include a point.
    pub fn include(&mut self, x: f64, y: f64) {
        self.x1 = self.x1.min(x);
        self.y1 = self.y1.min(y);
        self.x2 = self.x2.max(x);
        self.y2 = self.y2.max(y);
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Overlap of both rectangles (max on min edges, min on max edges).
    pub fn intersect(&self, other: &Rect) -> Rect {
        Rect {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        }
    }

    /// Grow each side by the given amounts.
    pub fn inflate(&self, dx: f64, dy: f64) -> Rect {
        Rect {
            x1: self.x1 - dx,
            y1: self.y1 - dy,
            x2: self.x2 + dx,
            y2: self.y2 + dy,
        }
    }

    /// Check if `other` lies inside this rectangle, allowing `tolerance` slack.
    pub fn contains(&self, other: &Rect, tolerance: f64) -> bool {
        other.x1 >= self.x1 - tolerance
            && other.y1 >= self.y1 - tolerance
            && other.x2 <= self.x2 + tolerance
            && other.y2 <= self.y2 + tolerance
    }

    /// Check if a point lies inside this rectangle (edges inclusive).
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }
}

/// Geometric record of an area: position, pitch, requested size and halo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Requested content size.
    pub size: Size,
    /// Top-left coordinate and pitch.
    pub position: Position,
    /// Halo around the content.
    pub edges: Edges,
}

impl Dimensions {
    /// A region of `w` x `h` pixels at the origin with unit pitch.
    pub fn new(w: u32, h: u32) -> Self {
        Self {
            size: Size::new(w, h),
            position: Position::default(),
            edges: Edges::default(),
        }
    }

    /// Set the top-left coordinate.
    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position.x = x;
        self.position.y = y;
        self
    }

    /// Set the pitch.
    pub fn with_pitch(mut self, px_size_x: f64, px_size_y: f64) -> Self {
        self.position.px_size_x = px_size_x;
        self.position.px_size_y = px_size_y;
        self
    }

    /// Set the halo.
    pub fn with_edges(mut self, edges: Edges) -> Self {
        self.edges = edges;
        self
    }

    /// Check the record invariants.
    pub fn validate(&self) -> GeometryResult<()> {
        if self.size.w == 0 || self.size.h == 0 {
            return Err(GeometryError::InvalidDimensions {
                reason: format!("size {}x{} must be positive", self.size.w, self.size.h),
            });
        }
        let p = &self.position;
        let finite = p.x.is_finite() && p.y.is_finite();
        if !finite || !(p.px_size_x > 0.0 && p.px_size_y > 0.0) {
            return Err(GeometryError::InvalidDimensions {
                reason: format!(
                    "position ({}, {}) with pitch ({}, {})",
                    p.x, p.y, p.px_size_x, p.px_size_y
                ),
            });
        }
        Ok(())
    }

    /// Pitch as a pair.
    pub fn pitch(&self) -> (f64, f64) {
        (self.position.px_size_x, self.position.px_size_y)
    }

    /// Content rectangle in photo coordinates, halo excluded.
    pub fn rect(&self) -> Rect {
        let p = &self.position;
        Rect::new(
            p.x,
            p.y,
            p.x + self.size.w as f64 * p.px_size_x,
            p.y + self.size.h as f64 * p.px_size_y,
        )
    }

    /// Content plus halo rectangle in photo coordinates.
    pub fn full_rect(&self) -> Rect {
        let p = &self.position;
        let e = &self.edges;
        Rect::new(
            p.x - e.x1 as f64 * p.px_size_x,
            p.y - e.y1 as f64 * p.px_size_y,
            p.x + (self.size.w + e.x2) as f64 * p.px_size_x,
            p.y + (self.size.h + e.y2) as f64 * p.px_size_y,
        )
    }

    /// Full width in pixels including the halo.
    pub fn full_width(&self) -> u32 {
        self.size.w + self.edges.x1 + self.edges.x2
    }

    /// Full height in pixels including the halo.
    pub fn full_height(&self) -> u32 {
        self.size.h + self.edges.y1 + self.edges.y2
    }

    /// Region covering `rect` whose top-left corner is the rectangle's own
    /// corner, with the size rounded up to whole pixels at the given pitch.
    pub fn from_rect(rect: &Rect, px_size_x: f64, px_size_y: f64) -> GeometryResult<Self> {
        if rect.is_empty() {
            return Err(GeometryError::InvalidDimensions {
                reason: "cannot build a region from an empty rectangle".to_string(),
            });
        }
        let w = (rect.width() / px_size_x - SNAP_EPSILON).ceil().max(1.0);
        let h = (rect.height() / px_size_y - SNAP_EPSILON).ceil().max(1.0);
        let dims = Dimensions::new(w as u32, h as u32)
            .with_position(rect.x1, rect.y1)
            .with_pitch(px_size_x, px_size_y);
        dims.validate()?;
        Ok(dims)
    }

    /// Region covering `rect`, snapped outward onto the pixel grid of `grid`
    /// (its origin and pitch). The result never loses any part of `rect`.
    pub fn snap_to_grid(rect: &Rect, grid: &Position) -> GeometryResult<Self> {
        if rect.is_empty() {
            return Err(GeometryError::InvalidDimensions {
                reason: "cannot snap an empty rectangle".to_string(),
            });
        }
        let ix1 = ((rect.x1 - grid.x) / grid.px_size_x + SNAP_EPSILON).floor();
        let iy1 = ((rect.y1 - grid.y) / grid.px_size_y + SNAP_EPSILON).floor();
        let ix2 = ((rect.x2 - grid.x) / grid.px_size_x - SNAP_EPSILON).ceil();
        let iy2 = ((rect.y2 - grid.y) / grid.px_size_y - SNAP_EPSILON).ceil();
        let w = (ix2 - ix1).max(1.0);
        let h = (iy2 - iy1).max(1.0);
        let dims = Dimensions::new(w as u32, h as u32)
            .with_position(
                grid.x + ix1 * grid.px_size_x,
                grid.y + iy1 * grid.px_size_y,
            )
            .with_pitch(grid.px_size_x, grid.px_size_y);
        dims.validate()?;
        Ok(dims)
    }

    /// Fold the halo into the content, leaving zero edges.
    pub fn absorb_edges(&self) -> Self {
        let p = &self.position;
        Dimensions::new(self.full_width(), self.full_height())
            .with_position(
                p.x - self.edges.x1 as f64 * p.px_size_x,
                p.y - self.edges.y1 as f64 * p.px_size_y,
            )
            .with_pitch(p.px_size_x, p.px_size_y)
    }

    /// Clip this region (halo included) to `bounds`, staying on this region's
    /// grid. Returns `None` when nothing of the region lies inside `bounds`.
    pub fn clamp_to(&self, bounds: &Rect) -> Option<Self> {
        let clipped = self.absorb_edges().rect().intersect(bounds);
        if clipped.is_empty() {
            return None;
        }
        Dimensions::snap_to_grid(&clipped, &self.position).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_of_dimensions() {
        let d = Dimensions::new(100, 50).with_position(10.0, 20.0).with_pitch(2.0, 2.0);
        let r = d.rect();
        assert_eq!(r, Rect::new(10.0, 20.0, 210.0, 120.0));
        assert_eq!(d.size.area(), 5000);
    }

    #[test]
    fn test_full_rect_includes_halo() {
        let d = Dimensions::new(10, 10).with_edges(Edges::symmetric(2));
        assert_eq!(d.full_rect(), Rect::new(-2.0, -2.0, 12.0, 12.0));
        assert_eq!(d.full_width(), 14);
        let absorbed = d.absorb_edges();
        assert_eq!(absorbed.size, Size::new(14, 14));
        assert!(absorbed.edges.is_zero());
        assert_eq!(absorbed.rect(), d.full_rect());
    }

    #[test]
    fn test_validate_rejects_zero_size_and_pitch() {
        assert!(Dimensions::new(0, 10).validate().is_err());
        assert!(Dimensions::new(10, 10).with_pitch(0.0, 1.0).validate().is_err());
        assert!(Dimensions::new(10, 10).validate().is_ok());
    }

    #[test]
    fn test_snap_to_grid_rounds_outward() {
        let grid = Position {
            x: 0.5,
            y: 0.0,
            px_size_x: 1.0,
            px_size_y: 2.0,
        };
        let d = Dimensions::snap_to_grid(&Rect::new(3.7, 3.1, 10.2, 8.0), &grid).unwrap();
        assert_eq!(d.position.x, 3.5);
        assert_eq!(d.position.y, 2.0);
        assert_eq!(d.size, Size::new(7, 3));
        assert!(d.rect().contains(&Rect::new(3.7, 3.1, 10.2, 8.0), 0.0));
    }

    #[test]
    fn test_snap_ignores_float_noise() {
        let grid = Position::default();
        let d = Dimensions::snap_to_grid(&Rect::new(0.0, 0.0, 4000.000000001, 3000.0), &grid)
            .unwrap();
        assert_eq!(d.size, Size::new(4000, 3000));
    }

    #[test]
    fn test_from_rect_ceils_size() {
        let d = Dimensions::from_rect(&Rect::new(-10.5, 0.0, 10.0, 5.2), 1.0, 1.0).unwrap();
        assert_eq!(d.size, Size::new(21, 6));
        assert_eq!(d.position.x, -10.5);
        assert!(Dimensions::from_rect(&Rect::empty(), 1.0, 1.0).is_err());
    }

    #[test]
    fn test_edges_rescale() {
        let e = Edges::symmetric(3).rescale((4.0, 4.0), (1.0, 1.0));
        assert_eq!(e, Edges::symmetric(12));
        let e = Edges::symmetric(3).rescale((1.0, 1.0), (2.0, 2.0));
        assert_eq!(e, Edges::symmetric(2));
        assert_eq!(Edges::default().rescale((1.0, 1.0), (3.0, 3.0)), Edges::default());
    }

    #[test]
    fn test_clamp_to() {
        let bounds = Rect::new(0.0, 0.0, 100.0, 100.0);
        let d = Dimensions::new(20, 20)
            .with_position(90.0, -5.0)
            .with_edges(Edges::symmetric(1));
        let c = d.clamp_to(&bounds).unwrap();
        assert_eq!(c.position.x, 89.0);
        assert_eq!(c.position.y, 0.0);
        assert_eq!(c.size, Size::new(11, 16));

        let outside = Dimensions::new(5, 5).with_position(200.0, 200.0);
        assert!(outside.clamp_to(&bounds).is_none());
    }

    #[test]
    fn test_rect_ops() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, -5.0, 15.0, 5.0);
        assert_eq!(a.union(&b), Rect::new(0.0, -5.0, 15.0, 10.0));
        assert_eq!(a.intersect(&b), Rect::new(5.0, 0.0, 10.0, 5.0));
        assert!(Rect::empty().is_empty());
        let mut r = Rect::empty();
        r.include(1.0, 2.0);
        r.include(-1.0, 4.0);
        assert_eq!(r, Rect::new(-1.0, 2.0, 1.0, 4.0));
        assert!(a.inflate(1.0, 1.0).contains(&a, 0.0));
        assert!(!a.contains(&a.inflate(1.0, 1.0), 0.5));
        assert!(a.contains_point(10.0, 0.0));
        assert!(!a.contains_point(10.5, 5.0));
    }
}
