//! Reference geometric resampler running on a [`Flow`].
//!
//! For every output pixel centre the composed backward mapping gives one
//! input coordinate per channel, which is sampled bilinearly. Rows are
//! handed out by the episode's work cursor; the main worker allocates the
//! output inside the split barrier's exclusive window.

use crate::core::area::Dimensions;
use crate::core::config::EngineConfig;
use crate::core::error::{FlowError, FlowResult, GeometryError, GeometryResult, RawflowResult};
use crate::geometry::chain::MappingChain;
use crate::geometry::point::{rgb, Point};
use crate::threading::flow::{Flow, FlowStats};
use crate::threading::priority::{Priority, PriorityRegistry};
use crate::threading::subflow::SubFlow;
use log::debug;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

/// One RGB sample.
pub type Rgb = [f32; 3];

/// Interleaved RGB pixels on the grid of a region.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbPlane {
    dims: Dimensions,
    data: Vec<Rgb>,
}

impl RgbPlane {
    /// Fill a region (halo included) by evaluating `f` at every pixel centre
    /// in photo coordinates.
    pub fn from_fn<F>(dims: &Dimensions, f: F) -> GeometryResult<Self>
    where
        F: Fn(f64, f64) -> Rgb,
    {
        let dims = dims.absorb_edges();
        dims.validate()?;
        let p = dims.position;
        let (w, h) = (dims.size.w as usize, dims.size.h as usize);
        let mut data = Vec::with_capacity(w * h);
        for y in 0..h {
            let cy = p.y + (y as f64 + 0.5) * p.px_size_y;
            for x in 0..w {
                data.push(f(p.x + (x as f64 + 0.5) * p.px_size_x, cy));
            }
        }
        Ok(Self { dims, data })
    }

    /// Wrap existing pixels.
    pub fn from_data(dims: &Dimensions, data: Vec<Rgb>) -> GeometryResult<Self> {
        let dims = dims.absorb_edges();
        dims.validate()?;
        let expected = dims.size.area() as usize;
        if data.len() != expected {
            return Err(GeometryError::InvalidDimensions {
                reason: format!("expected {} pixels, got {}", expected, data.len()),
            });
        }
        Ok(Self { dims, data })
    }

    /// Region covered, with zero halo.
    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.dims.size.w as usize
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.dims.size.h as usize
    }

    /// Pixels in row-major order.
    pub fn data(&self) -> &[Rgb] {
        &self.data
    }

    /// Pixel at integer coordinates.
    pub fn get(&self, x: usize, y: usize) -> Option<Rgb> {
        if x >= self.width() {
            return None;
        }
        self.data.get(y * self.width() + x).copied()
    }

    /// Bilinear sample of one channel at a photo coordinate. Coordinates
    /// outside the plane are clamped to its border pixels.
    pub fn sample(&self, channel: usize, at: Point) -> f32 {
        let p = &self.dims.position;
        let (w, h) = (self.width(), self.height());
        let u = ((at.x - p.x) / p.px_size_x - 0.5).clamp(0.0, (w - 1) as f64);
        let v = ((at.y - p.y) / p.px_size_y - 0.5).clamp(0.0, (h - 1) as f64);
        let (x0, y0) = (u.floor() as usize, v.floor() as usize);
        let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
        let (tx, ty) = ((u - x0 as f64) as f32, (v - y0 as f64) as f32);

        let at = |x: usize, y: usize| self.data[y * w + x][channel];
        let top = at(x0, y0) + (at(x1, y0) - at(x0, y0)) * tx;
        let bottom = at(x0, y1) + (at(x1, y1) - at(x0, y1)) * tx;
        top + (bottom - top) * ty
    }

    /// Mean of every channel.
    pub fn mean(&self) -> Rgb {
        let mut sum = [0.0f64; 3];
        for px in &self.data {
            for (s, v) in sum.iter_mut().zip(px) {
                *s += *v as f64;
            }
        }
        let n = self.data.len().max(1) as f64;
        sum.map(|s| (s / n) as f32)
    }
}

/// Backward-mapped bilinear resampling of RGB tiles.
#[derive(Debug, Clone)]
pub struct Resampler {
    chain: MappingChain,
    priority: Priority,
    threads: usize,
    registry: Option<Arc<PriorityRegistry>>,
    memory_limit: Option<usize>,
}

impl Resampler {
    /// Create a resampler through `chain`, at export priority on every core.
    pub fn new(chain: MappingChain) -> Self {
        Self {
            chain,
            priority: Priority::EXPORT,
            threads: 0,
            registry: None,
            memory_limit: None,
        }
    }

    /// Create a resampler using the configured thread count and the preview
    /// or export priority.
    pub fn from_config(chain: MappingChain, config: &EngineConfig, preview: bool) -> Self {
        let priority = if preview {
            config.preview_priority
        } else {
            config.export_priority
        };
        Self::new(chain)
            .with_threads(config.threads)
            .with_priority(priority)
    }

    /// Set the episode priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the worker count (0 = detected core count).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Use an injected priority table.
    pub fn with_registry(mut self, registry: Arc<PriorityRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Refuse output buffers larger than `bytes`.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Resample `input` into `tile` (halo included).
    pub fn resample(&self, input: &RgbPlane, tile: &Dimensions) -> RawflowResult<(RgbPlane, FlowStats)> {
        let out = tile.absorb_edges();
        out.validate()?;
        let (w, h) = (out.size.w as usize, out.size.h as usize);
        let rows: OnceLock<Vec<Mutex<Vec<Rgb>>>> = OnceLock::new();

        let body = |sf: &SubFlow<'_>| -> FlowResult<()> {
            if sf.sync_point_pre()? {
                let _ = rows.set(self.allocate(w, h)?);
                sf.cursor().reset(h);
            }
            sf.sync_point_post()?;

            let rows = rows.get().ok_or(FlowError::Aborted)?;
            let p = out.position;
            while let Some(y) = sf.next_index() {
                let cy = p.y + (y as f64 + 0.5) * p.px_size_y;
                let mut row = rows[y].lock();
                for (x, pixel) in row.iter_mut().enumerate() {
                    let cx = p.x + (x as f64 + 0.5) * p.px_size_x;
                    let src = self.chain.backward_rgb(rgb(Point::new(cx, cy)));
                    *pixel = [
                        input.sample(0, src[0]),
                        input.sample(1, src[1]),
                        input.sample(2, src[2]),
                    ];
                }
            }
            sf.sync_point()
        };

        let mut flow = Flow::new(self.priority, self.threads, body);
        if let Some(registry) = &self.registry {
            flow = flow.with_registry(registry.clone());
        }
        let stats = flow.flow()?;
        debug!(
            "Resampled {}x{} tile on {} worker(s) in {:?}",
            w, h, stats.threads, stats.duration
        );

        let data = rows
            .into_inner()
            .ok_or(FlowError::Aborted)?
            .into_iter()
            .flat_map(Mutex::into_inner)
            .collect();
        Ok((RgbPlane::from_data(&out, data)?, stats))
    }

    fn allocate(&self, w: usize, h: usize) -> FlowResult<Vec<Mutex<Vec<Rgb>>>> {
        let bytes = w * h * std::mem::size_of::<Rgb>();
        if self.memory_limit.is_some_and(|limit| bytes > limit) {
            return Err(FlowError::OutOfMemory { bytes });
        }
        let oom = |_| FlowError::OutOfMemory { bytes };
        let mut rows = Vec::new();
        rows.try_reserve_exact(h).map_err(oom)?;
        for _ in 0..h {
            let mut row = Vec::new();
            row.try_reserve_exact(w).map_err(oom)?;
            row.resize(w, [0.0; 3]);
            rows.push(Mutex::new(row));
        }
        Ok(rows)
    }
}
