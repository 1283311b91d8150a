use anyhow::Result;
use geo::Rect;
use serde::Serialize;

use crate::Error;

/// A square grid centered on a bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridExtent {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
    /// Side length in coordinate units, a multiple of the grid step.
    pub grid_size: f64,
    /// Cells per side.
    pub pixels: usize,
}

impl GridExtent {
    /// Smallest multiple of `grid_step` (at least one step) covering both
    /// sides of `bounds`, padded equally on opposite sides, with
    /// `grid_size / resolution` cells per side.
    pub fn around(bounds: Rect<f64>, grid_step: f64, resolution: f64) -> Result<Self> {
        let width = bounds.width();
        let height = bounds.height();

        let grid_size = [
            (width / grid_step).ceil() * grid_step,
            (height / grid_step).ceil() * grid_step,
            grid_step,
        ]
        .into_iter()
        .fold(f64::NEG_INFINITY, f64::max);

        let pixels = (grid_size / resolution) as usize;
        if pixels == 0 {
            return Err(Error::Configuration(format!(
                "resolution {} is coarser than the grid size {}", resolution, grid_size
            )).into());
        }

        let pad_x = (grid_size - width) / 2.0;
        let pad_y = (grid_size - height) / 2.0;
        Ok(Self {
            left: bounds.min().x - pad_x,
            bottom: bounds.min().y - pad_y,
            right: bounds.max().x + pad_x,
            top: bounds.max().y + pad_y,
            grid_size,
            pixels,
        })
    }

    /// Size of one cell along each axis.
    pub fn pixel_size(&self) -> (f64, f64) {
        (
            (self.right - self.left) / self.pixels as f64,
            (self.top - self.bottom) / self.pixels as f64,
        )
    }
}
