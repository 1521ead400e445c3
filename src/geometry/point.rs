//! Point-mapping contract of geometric filters.
//!
//! A geometric filter supplies a [`PointMapping`]: a pair of pure functions
//! mapping photo coordinates forward (original to transformed) and backward
//! (transformed to original), optionally per colour channel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in photo coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
}

impl Point {
    /// Create a new point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Colour channel index into an [`RgbPoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Red.
    Red = 0,
    /// Green.
    Green = 1,
    /// Blue.
    Blue = 2,
}

impl Channel {
    /// All channels in storage order.
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];
}

/// One coordinate per colour channel, in red/green/blue order.
pub type RgbPoint = [Point; 3];

/// Broadcast a point to all three channels.
pub fn rgb(point: Point) -> RgbPoint {
    [point; 3]
}

/// Forward/backward coordinate mapping of one geometric filter.
///
/// Implementations must satisfy `process_backward(process_forward(p)) == p`
/// up to model precision, and be monotonic enough along straight edges that
/// mapping a rectangle's boundary bounds the mapped interior.
pub trait PointMapping: Send + Sync + fmt::Debug {
    /// Whether output falling outside the photo frame is truncated (lens
    /// corrections) rather than kept on an enlarged canvas (rotation).
    fn to_clip(&self) -> bool;

    /// Whether channels must be mapped independently.
    fn is_rgb(&self) -> bool {
        false
    }

    /// Map an original coordinate to its transformed position.
    fn process_forward(&self, point: Point) -> Point;

    /// Map a transformed coordinate back to its original position.
    fn process_backward(&self, point: Point) -> Point;

    /// Per-channel forward mapping.
    fn process_forward_rgb(&self, points: RgbPoint) -> RgbPoint {
        points.map(|p| self.process_forward(p))
    }

    /// Per-channel backward mapping.
    fn process_backward_rgb(&self, points: RgbPoint) -> RgbPoint {
        points.map(|p| self.process_backward(p))
    }
}
