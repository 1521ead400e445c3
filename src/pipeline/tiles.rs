//! Output tiling and parallel tile planning.

use crate::core::area::{Dimensions, SNAP_EPSILON};
use crate::core::config::EngineConfig;
use crate::core::error::GeometryResult;
use crate::pipeline::chain::FilterChain;
use crate::pipeline::plan::{PipelinePlan, TilePlan};
use log::debug;
use rayon::prelude::*;

/// Row-major grid of output tiles over an area, sampled at a given pitch.
#[derive(Debug, Clone)]
pub struct TileGrid {
    origin: (f64, f64),
    pitch: (f64, f64),
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    current_x: u32,
    current_y: u32,
}

impl TileGrid {
    /// Tile `area` with `tile_width` x `tile_height` pixel tiles at `pitch`
    /// photo units per pixel (1.0 for export, larger for preview).
    pub fn new(area: &Dimensions, tile_width: u32, tile_height: u32, pitch: f64) -> Self {
        let rect = area.rect();
        let pitch = if pitch > 0.0 { pitch } else { 1.0 };
        let px = area.position.px_size_x * pitch;
        let py = area.position.px_size_y * pitch;
        Self {
            origin: (rect.x1, rect.y1),
            pitch: (px, py),
            width: (rect.width() / px - SNAP_EPSILON).ceil().max(1.0) as u32,
            height: (rect.height() / py - SNAP_EPSILON).ceil().max(1.0) as u32,
            tile_width: tile_width.max(1),
            tile_height: tile_height.max(1),
            current_x: 0,
            current_y: 0,
        }
    }

    /// Tile `area` with the configured tile size.
    pub fn from_config(area: &Dimensions, config: &EngineConfig, pitch: f64) -> Self {
        Self::new(area, config.tile_width, config.tile_height, pitch)
    }

    /// Area size in pixels at the grid pitch.
    pub fn pixel_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of tile columns and rows.
    pub fn shape(&self) -> (u32, u32) {
        (
            self.width.div_ceil(self.tile_width),
            self.height.div_ceil(self.tile_height),
        )
    }

    /// Total number of tiles.
    pub fn tile_count(&self) -> usize {
        let (cols, rows) = self.shape();
        cols as usize * rows as usize
    }
}

impl Iterator for TileGrid {
    type Item = Dimensions;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_y >= self.height {
            return None;
        }

        let x = self.current_x;
        let y = self.current_y;
        let w = self.tile_width.min(self.width - x);
        let h = self.tile_height.min(self.height - y);

        self.current_x += self.tile_width;
        if self.current_x >= self.width {
            self.current_x = 0;
            self.current_y += self.tile_height;
        }

        Some(
            Dimensions::new(w, h)
                .with_position(
                    self.origin.0 + x as f64 * self.pitch.0,
                    self.origin.1 + y as f64 * self.pitch.1,
                )
                .with_pitch(self.pitch.0, self.pitch.1),
        )
    }
}

/// Plan every tile of `grid` in parallel. Results keep the grid order.
pub fn plan_tiles(chain: &FilterChain, plan: &PipelinePlan, grid: TileGrid) -> GeometryResult<Vec<TilePlan>> {
    let tiles: Vec<Dimensions> = grid.collect();
    debug!("Planning {} tile(s)", tiles.len());
    tiles
        .par_iter()
        .map(|tile| chain.plan_tile(plan, tile))
        .collect()
}
