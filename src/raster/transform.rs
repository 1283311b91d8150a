use anyhow::{bail, Result};
use geo::Coord;

/// Affine map from (column, row) to projected coordinates:
/// `x = a*col + b*row + c`, `y = d*col + e*row + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// Grid of `width x height` cells spanning the given bounds, first row at `north`.
    pub fn from_bounds(west: f64, south: f64, east: f64, north: f64, width: usize, height: usize) -> Self {
        Self::new(
            (east - west) / width as f64, 0.0, west,
            0.0, (south - north) / height as f64, north,
        )
    }

    /// Canonical orientation: origin top-left, positive pixel width, negative pixel height.
    pub fn north_up(left: f64, top: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self::new(pixel_width.abs(), 0.0, left, 0.0, -pixel_height.abs(), top)
    }

    pub fn is_north_up(&self) -> bool {
        self.b == 0.0 && self.d == 0.0 && self.a > 0.0 && self.e < 0.0
    }

    /// Projected coordinate of a fractional grid position.
    #[inline]
    pub fn apply(&self, col: f64, row: f64) -> Coord<f64> {
        Coord {
            x: self.a * col + self.b * row + self.c,
            y: self.d * col + self.e * row + self.f,
        }
    }

    /// Projected coordinate of the center of cell (`col`, `row`).
    #[inline]
    pub fn cell_center(&self, col: usize, row: usize) -> Coord<f64> {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    /// Inverse map, from projected coordinates back to fractional (col, row).
    pub fn inverse(&self) -> Result<Self> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            bail!("[raster::transform] Transform is not invertible: {:?}", self);
        }
        let (a, b, d, e) = (self.e / det, -self.b / det, -self.d / det, self.a / det);
        Ok(Self::new(
            a, b, -(a * self.c + b * self.f),
            d, e, -(d * self.c + e * self.f),
        ))
    }
}
