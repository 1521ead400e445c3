//! Lens corrections: radial distortion and lateral chromatic aberration.
//!
//! Both clip: whatever a correction pushes outside the photo frame is lost,
//! so their forward size is the part of the frame that stays covered.
//!
//! Distortion is defined in the backward direction, where it has a closed
//! form. The forward direction inverts the radial polynomial through a
//! [`RadialTable`]; tables depend only on the coefficients and are shared
//! through an LRU cache.

use crate::core::error::{GeometryError, GeometryResult};
use crate::geometry::point::{Point, PointMapping, RgbPoint};
use log::debug;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::{Arc, OnceLock};

/// Number of samples in a radial lookup table.
pub const TABLE_SIZE: usize = 4096;

/// Normalised radius covered by a lookup table. The frame corner sits at 1.
pub const TABLE_RADIUS: f64 = 1.5;

/// Number of tables kept by the shared cache.
pub const TABLE_CACHE_CAPACITY: usize = 32;

// ============================================================================
// Radial lookup table
// ============================================================================

/// Sampled radial model `g(r) = r * (1 + k1 r^2 + k2 r^4)` on
/// `[0, TABLE_RADIUS]`, invertible because it is strictly increasing.
#[derive(Debug, Clone)]
pub struct RadialTable {
    step: f64,
    values: Vec<f64>,
}

impl RadialTable {
    /// Sample the model. Fails when it is not strictly increasing.
    pub fn build(k1: f64, k2: f64) -> GeometryResult<Self> {
        let step = TABLE_RADIUS / (TABLE_SIZE - 1) as f64;
        let mut values = Vec::with_capacity(TABLE_SIZE);
        for i in 0..TABLE_SIZE {
            let r = i as f64 * step;
            let r2 = r * r;
            let g = r * (1.0 + k1 * r2 + k2 * r2 * r2);
            if let Some(&prev) = values.last() {
                if !(g > prev) {
                    return Err(GeometryError::NonMonotonic { radius: r });
                }
            }
            values.push(g);
        }
        Ok(Self { step, values })
    }

    /// Evaluate `g(r)` by interpolation, extrapolating linearly past the end.
    pub fn eval(&self, r: f64) -> f64 {
        let n = self.values.len();
        let pos = (r / self.step).max(0.0);
        let i = (pos.floor() as usize).min(n - 2);
        let t = pos - i as f64;
        self.values[i] + (self.values[i + 1] - self.values[i]) * t
    }

    /// Solve `g(r) = value` for `r`.
    pub fn invert(&self, value: f64) -> f64 {
        if value <= 0.0 {
            return 0.0;
        }
        let n = self.values.len();
        let i = self.values.partition_point(|&v| v < value).clamp(1, n - 1);
        let (lo, hi) = (self.values[i - 1], self.values[i]);
        let t = (value - lo) / (hi - lo);
        ((i - 1) as f64 + t) * self.step
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TableKey {
    k1: u64,
    k2: u64,
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that built a table.
    pub misses: u64,
}

/// Thread-safe LRU cache of radial tables keyed by coefficient identity.
#[derive(Debug)]
pub struct RadialTableCache {
    tables: Mutex<LruCache<TableKey, Arc<RadialTable>>>,
    stats: Mutex<TableCacheStats>,
}

impl RadialTableCache {
    /// Create a cache holding up to `capacity` tables.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            tables: Mutex::new(LruCache::new(capacity)),
            stats: Mutex::new(TableCacheStats::default()),
        }
    }

    /// The process-wide cache.
    pub fn global() -> &'static RadialTableCache {
        static CACHE: OnceLock<RadialTableCache> = OnceLock::new();
        CACHE.get_or_init(|| RadialTableCache::new(TABLE_CACHE_CAPACITY))
    }

    /// Fetch the table for `(k1, k2)`, building it on a miss.
    pub fn get_or_build(&self, k1: f64, k2: f64) -> GeometryResult<Arc<RadialTable>> {
        let key = TableKey {
            k1: k1.to_bits(),
            k2: k2.to_bits(),
        };
        if let Some(table) = self.tables.lock().get(&key) {
            self.stats.lock().hits += 1;
            return Ok(table.clone());
        }

        self.stats.lock().misses += 1;
        let table = Arc::new(RadialTable::build(k1, k2)?);
        debug!("Built radial table for k1={k1}, k2={k2}");
        self.tables.lock().put(key, table.clone());
        Ok(table)
    }

    /// Number of cached tables.
    pub fn len(&self) -> usize {
        self.tables.lock().len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.tables.lock().is_empty()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> TableCacheStats {
        *self.stats.lock()
    }
}

// ============================================================================
// Distortion
// ============================================================================

/// Radial distortion about `center`, with radii normalised by `norm_radius`.
///
/// Backward: `src = c + d * (1 + k1 r^2 + k2 r^4)` with `d = p - c` and
/// `r = |d| / norm_radius`.
#[derive(Debug, Clone)]
pub struct Distortion {
    k1: f64,
    k2: f64,
    center: Point,
    norm_radius: f64,
    table: Arc<RadialTable>,
}

impl Distortion {
    /// Create a distortion correction using the shared table cache.
    pub fn new(k1: f64, k2: f64, center: Point, norm_radius: f64) -> GeometryResult<Self> {
        Self::with_cache(k1, k2, center, norm_radius, RadialTableCache::global())
    }

    /// Create a distortion correction using an explicit table cache.
    pub fn with_cache(
        k1: f64,
        k2: f64,
        center: Point,
        norm_radius: f64,
        cache: &RadialTableCache,
    ) -> GeometryResult<Self> {
        if !(norm_radius.is_finite() && norm_radius > 0.0) {
            return Err(GeometryError::parameter(
                "norm_radius",
                format!("{norm_radius} must be positive"),
            ));
        }
        if !(k1.is_finite() && k2.is_finite()) {
            return Err(GeometryError::parameter("k1/k2", "coefficients must be finite"));
        }
        let table = cache.get_or_build(k1, k2)?;
        Ok(Self {
            k1,
            k2,
            center,
            norm_radius,
            table,
        })
    }

    /// Distortion about the centre of a `width` x `height` frame, normalised by
    /// its half diagonal.
    pub fn for_frame(k1: f64, k2: f64, width: f64, height: f64) -> GeometryResult<Self> {
        let center = Point::new(width * 0.5, height * 0.5);
        Self::new(k1, k2, center, 0.5 * width.hypot(height))
    }

    /// Coefficients `(k1, k2)`.
    pub fn coefficients(&self) -> (f64, f64) {
        (self.k1, self.k2)
    }
}

impl PointMapping for Distortion {
    fn to_clip(&self) -> bool {
        true
    }

    fn process_forward(&self, p: Point) -> Point {
        let dx = p.x - self.center.x;
        let dy = p.y - self.center.y;
        let rs = dx.hypot(dy) / self.norm_radius;
        if rs < 1e-12 {
            return p;
        }
        let ratio = self.table.invert(rs) / rs;
        Point::new(self.center.x + dx * ratio, self.center.y + dy * ratio)
    }

    fn process_backward(&self, p: Point) -> Point {
        let dx = p.x - self.center.x;
        let dy = p.y - self.center.y;
        let r2 = (dx * dx + dy * dy) / (self.norm_radius * self.norm_radius);
        let factor = 1.0 + self.k1 * r2 + self.k2 * r2 * r2;
        Point::new(self.center.x + dx * factor, self.center.y + dy * factor)
    }
}

// ============================================================================
// Chromatic aberration
// ============================================================================

/// Lateral chromatic aberration: red and blue are scaled about `center`
/// relative to green.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChromaticAberration {
    red_scale: f64,
    blue_scale: f64,
    center: Point,
}

impl ChromaticAberration {
    /// Create a correction. Both scales must be positive.
    pub fn new(red_scale: f64, blue_scale: f64, center: Point) -> GeometryResult<Self> {
        for (name, scale) in [("red_scale", red_scale), ("blue_scale", blue_scale)] {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(GeometryError::parameter(name, format!("{scale} must be positive")));
            }
        }
        Ok(Self {
            red_scale,
            blue_scale,
            center,
        })
    }

    /// Red and blue scales.
    pub fn scales(&self) -> (f64, f64) {
        (self.red_scale, self.blue_scale)
    }

    fn scaled(&self, p: Point, scale: f64) -> Point {
        Point::new(
            self.center.x + (p.x - self.center.x) * scale,
            self.center.y + (p.y - self.center.y) * scale,
        )
    }
}

impl PointMapping for ChromaticAberration {
    fn to_clip(&self) -> bool {
        true
    }

    fn is_rgb(&self) -> bool {
        true
    }

    // green is the reference channel
    fn process_forward(&self, point: Point) -> Point {
        point
    }

    fn process_backward(&self, point: Point) -> Point {
        point
    }

    fn process_forward_rgb(&self, [r, g, b]: RgbPoint) -> RgbPoint {
        [
            self.scaled(r, 1.0 / self.red_scale),
            g,
            self.scaled(b, 1.0 / self.blue_scale),
        ]
    }

    fn process_backward_rgb(&self, [r, g, b]: RgbPoint) -> RgbPoint {
        [self.scaled(r, self.red_scale), g, self.scaled(b, self.blue_scale)]
    }
}
