//! Affine and projective mappings: rotation, scale and perspective shift.

use crate::core::error::{GeometryError, GeometryResult};
use crate::geometry::point::{Point, PointMapping};
use serde::{Deserialize, Serialize};

/// Largest accepted perspective correction angle, in degrees.
pub const MAX_SHIFT_ANGLE: f64 = 45.0;

// ============================================================================
// Rotation
// ============================================================================

/// Rotation by `angle_deg` (counter-clockwise in photo coordinates) about a
/// centre. The canvas grows to hold the rotated frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    angle_deg: f64,
    center: Point,
}

impl Rotation {
    /// Create a rotation about `center`.
    pub fn new(angle_deg: f64, center: Point) -> Self {
        Self { angle_deg, center }
    }

    /// Angle in degrees.
    pub fn angle_deg(&self) -> f64 {
        self.angle_deg
    }

    fn rotate(&self, p: Point, sin: f64, cos: f64) -> Point {
        let dx = p.x - self.center.x;
        let dy = p.y - self.center.y;
        Point::new(
            self.center.x + dx * cos - dy * sin,
            self.center.y + dx * sin + dy * cos,
        )
    }
}

impl PointMapping for Rotation {
    fn to_clip(&self) -> bool {
        false
    }

    fn process_forward(&self, point: Point) -> Point {
        let (sin, cos) = self.angle_deg.to_radians().sin_cos();
        self.rotate(point, sin, cos)
    }

    fn process_backward(&self, point: Point) -> Point {
        let (sin, cos) = self.angle_deg.to_radians().sin_cos();
        self.rotate(point, -sin, cos)
    }
}

// ============================================================================
// Scale
// ============================================================================

/// Uniform scale about a centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    factor: f64,
    center: Point,
}

impl Scale {
    /// Create a scale about `center`. The factor must be positive and finite.
    pub fn new(factor: f64, center: Point) -> GeometryResult<Self> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(GeometryError::parameter(
                "factor",
                format!("{factor} must be positive"),
            ));
        }
        Ok(Self { factor, center })
    }

    /// Scale factor.
    pub fn factor(&self) -> f64 {
        self.factor
    }
}

impl PointMapping for Scale {
    fn to_clip(&self) -> bool {
        false
    }

    fn process_forward(&self, p: Point) -> Point {
        Point::new(
            self.center.x + (p.x - self.center.x) * self.factor,
            self.center.y + (p.y - self.center.y) * self.factor,
        )
    }

    fn process_backward(&self, p: Point) -> Point {
        Point::new(
            self.center.x + (p.x - self.center.x) / self.factor,
            self.center.y + (p.y - self.center.y) / self.factor,
        )
    }
}

// ============================================================================
// Projective
// ============================================================================

/// Row-major 3x3 homogeneous transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projective {
    m: [[f64; 3]; 3],
}

impl Projective {
    /// The identity transform.
    pub fn identity() -> Self {
        Self::from_rows([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    /// Build from rows.
    pub fn from_rows(m: [[f64; 3]; 3]) -> Self {
        Self { m }
    }

    /// Matrix product `self * rhs`.
    pub fn then(&self, rhs: &Projective) -> Projective {
        let mut out = [[0.0; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.m[i][k] * rhs.m[k][j]).sum();
            }
        }
        Projective { m: out }
    }

    /// Determinant.
    pub fn determinant(&self) -> f64 {
        let m = &self.m;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// Inverse through the adjugate.
    pub fn inverse(&self) -> GeometryResult<Projective> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < 1e-12 {
            return Err(GeometryError::SingularTransform);
        }
        let m = &self.m;
        let cof = |r0: usize, r1: usize, c0: usize, c1: usize| {
            m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0]
        };
        let adj = [
            [cof(1, 2, 1, 2), -cof(0, 2, 1, 2), cof(0, 1, 1, 2)],
            [-cof(1, 2, 0, 2), cof(0, 2, 0, 2), -cof(0, 1, 0, 2)],
            [cof(1, 2, 0, 1), -cof(0, 2, 0, 1), cof(0, 1, 0, 1)],
        ];
        Ok(Projective::from_rows(adj.map(|row| row.map(|v| v / det))))
    }

    /// Apply to a point. Points sent to the line at infinity come back
    /// non-finite.
    pub fn apply(&self, p: Point) -> Point {
        let m = &self.m;
        let w = m[2][0] * p.x + m[2][1] * p.y + m[2][2];
        if w.abs() < f64::EPSILON {
            return Point::new(f64::INFINITY, f64::INFINITY);
        }
        Point::new(
            (m[0][0] * p.x + m[0][1] * p.y + m[0][2]) / w,
            (m[1][0] * p.x + m[1][1] * p.y + m[1][2]) / w,
        )
    }
}

// ============================================================================
// Perspective shift
// ============================================================================

/// Perspective correction: tilt of the image plane by a vertical and a
/// horizontal angle, seen through a pinhole of the given focal length (in
/// pixels) centred on `center`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    vertical_deg: f64,
    horizontal_deg: f64,
    focal: f64,
    center: Point,
    forward: Projective,
    backward: Projective,
}

impl Shift {
    /// Build the homography `K * Ry(h) * Rx(v) * K^-1`.
    pub fn new(vertical_deg: f64, horizontal_deg: f64, focal: f64, center: Point) -> GeometryResult<Self> {
        if !(focal.is_finite() && focal > 0.0) {
            return Err(GeometryError::parameter("focal", format!("{focal} must be positive")));
        }
        for (name, angle) in [("vertical", vertical_deg), ("horizontal", horizontal_deg)] {
            if !(angle.abs() < MAX_SHIFT_ANGLE) {
                return Err(GeometryError::parameter(
                    name,
                    format!("{angle} outside +/-{MAX_SHIFT_ANGLE} degrees"),
                ));
            }
        }

        let (sv, cv) = vertical_deg.to_radians().sin_cos();
        let (sh, ch) = horizontal_deg.to_radians().sin_cos();
        let k = Projective::from_rows([
            [focal, 0.0, center.x],
            [0.0, focal, center.y],
            [0.0, 0.0, 1.0],
        ]);
        let rx = Projective::from_rows([[1.0, 0.0, 0.0], [0.0, cv, -sv], [0.0, sv, cv]]);
        let ry = Projective::from_rows([[ch, 0.0, sh], [0.0, 1.0, 0.0], [-sh, 0.0, ch]]);
        let forward = k.then(&ry).then(&rx).then(&k.inverse()?);
        let backward = forward.inverse()?;

        Ok(Self {
            vertical_deg,
            horizontal_deg,
            focal,
            center,
            forward,
            backward,
        })
    }

    /// Vertical and horizontal correction angles in degrees.
    pub fn angles(&self) -> (f64, f64) {
        (self.vertical_deg, self.horizontal_deg)
    }

    /// Focal length in pixels and optical centre.
    pub fn optics(&self) -> (f64, Point) {
        (self.focal, self.center)
    }

    /// The forward homography.
    pub fn homography(&self) -> &Projective {
        &self.forward
    }
}

impl PointMapping for Shift {
    fn to_clip(&self) -> bool {
        false
    }

    fn process_forward(&self, point: Point) -> Point {
        self.forward.apply(point)
    }

    fn process_backward(&self, point: Point) -> Point {
        self.backward.apply(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        a.distance(&b) < 1e-9
    }

    #[test]
    fn test_rotation_quarter_turn() {
        let r = Rotation::new(90.0, Point::new(1.0, 1.0));
        let p = r.process_forward(Point::new(2.0, 1.0));
        assert!(close(p, Point::new(1.0, 2.0)));
        assert!(close(r.process_backward(p), Point::new(2.0, 1.0)));
        assert!(!r.to_clip());
    }

    #[test]
    fn test_scale_rejects_non_positive() {
        assert!(Scale::new(0.0, Point::default()).is_err());
        assert!(Scale::new(-1.0, Point::default()).is_err());
        assert!(Scale::new(f64::NAN, Point::default()).is_err());
        let s = Scale::new(2.0, Point::new(10.0, 10.0)).unwrap();
        assert!(close(s.process_forward(Point::new(11.0, 9.0)), Point::new(12.0, 8.0)));
    }

    #[test]
    fn test_projective_inverse() {
        let h = Projective::from_rows([[2.0, 0.1, 3.0], [0.0, 1.5, -2.0], [0.001, 0.0, 1.0]]);
        let id = h.then(&h.inverse().unwrap());
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((id.m[i][j] - expected).abs() < 1e-10);
            }
        }
        let singular = Projective::from_rows([[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]]);
        assert_eq!(singular.inverse(), Err(GeometryError::SingularTransform));
    }

    #[test]
    fn test_zero_shift_is_identity() {
        let s = Shift::new(0.0, 0.0, 5000.0, Point::new(2000.0, 1500.0)).unwrap();
        let p = Point::new(17.0, 2900.0);
        assert!(close(s.process_forward(p), p));
        assert_eq!(Projective::identity().apply(p), p);
    }

    #[test]
    fn test_shift_round_trip_and_validation() {
        let s = Shift::new(5.0, 3.0, 5000.0, Point::new(2000.0, 1500.0)).unwrap();
        let p = Point::new(3900.0, 100.0);
        let q = s.process_forward(p);
        assert!(p.distance(&q) > 1.0);
        assert!(s.process_backward(q).distance(&p) < 1e-6);

        assert!(Shift::new(50.0, 0.0, 5000.0, Point::default()).is_err());
        assert!(Shift::new(0.0, 0.0, 0.0, Point::default()).is_err());
    }
}
