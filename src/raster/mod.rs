//! Raster synthesis: square extent, all-touched burn, north-up resample and
//! exterior mask.

mod extent;
mod rasterize;
mod transform;

use anyhow::{Context, Result};
use geo::{BooleanOps, BoundingRect, Coord, MultiPolygon, Rect};
use ndarray::Array2;
use serde::Serialize;
use tracing::debug;

use crate::{config::{CrsDef, PipelineConfig}, join::JoinedSet};

pub use extent::GridExtent;
pub use rasterize::resample_nearest;
pub use transform::GeoTransform;

/// A single-band u16 raster held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    /// Row-major cells, row 0 at the top.
    pub data: Array2<u16>,
    pub transform: GeoTransform,
    pub nodata: u16,
    pub crs: CrsDef,
}

impl Raster {
    #[inline] pub fn width(&self) -> usize { self.data.ncols() }

    #[inline] pub fn height(&self) -> usize { self.data.nrows() }

    /// Cells holding a value other than nodata.
    pub fn painted(&self) -> usize {
        self.data.iter().filter(|&&v| v != self.nodata).count()
    }
}

/// What was rendered, for logs and callers.
#[derive(Debug, Clone, Serialize)]
pub struct RasterSummary {
    pub plot: String,
    pub polygons: usize,
    pub width: usize,
    pub height: usize,
    pub extent: GridExtent,
    pub biomass_min: f64,
    pub biomass_max: f64,
    pub painted_pixels: usize,
}

/// Bounding rectangle of every shape.
fn bounds<'a>(shapes: impl Iterator<Item = &'a MultiPolygon<f64>>) -> Option<Rect<f64>> {
    shapes
        .filter_map(|shape| shape.bounding_rect())
        .reduce(|a, b| Rect::new(
            Coord {
                x: a.min().x.min(b.min().x),
                y: a.min().y.min(b.min().y),
            },
            Coord {
                x: a.max().x.max(b.max().x),
                y: a.max().y.max(b.max().y),
            }
        ))
}

/// Render a joined plot into a north-up raster.
pub fn synthesize(joined: &JoinedSet, config: &PipelineConfig) -> Result<(Raster, RasterSummary)> {
    config.validate()?;
    let polygons = joined.polygons();

    let bbox = bounds(polygons.iter().map(|p| &p.geometry))
        .with_context(|| format!("[raster] Plot {} has no geometry to rasterize", joined.plot()))?;
    let extent = GridExtent::around(bbox, config.grid_step, config.resolution)?;
    let n = extent.pixels;

    // Render on the bounding-box frame.
    let render_transform = GeoTransform::from_bounds(extent.left, extent.bottom, extent.right, extent.top, n, n);
    let mut grid = Array2::from_elem((n, n), config.nodata);
    for polygon in polygons {
        rasterize::burn_all_touched(
            &mut grid,
            &render_transform,
            &polygon.geometry,
            polygon.normalized,
            config.nodata,
            config.overlap,
        )?;
    }

    // Re-express on the canonical frame.
    let (dx, dy) = extent.pixel_size();
    let north_up = GeoTransform::north_up(extent.left, extent.top, dx, dy);
    let mut data = rasterize::resample_nearest(&grid, &render_transform, &north_up, (n, n), config.nodata)?;

    let union = polygons.iter()
        .map(|p| p.geometry.clone())
        .reduce(|a, b| a.union(&b))
        .with_context(|| format!("[raster] Plot {} has no geometry to mask", joined.plot()))?;
    let cleared = rasterize::mask_exterior(&mut data, &north_up, &union, config.nodata);
    debug!(plot = %joined.plot(), cleared, "exterior cells masked");

    let raster = Raster { data, transform: north_up, nodata: config.nodata, crs: config.crs.clone() };
    let summary = RasterSummary {
        plot: joined.plot().to_string(),
        polygons: polygons.len(),
        width: raster.width(),
        height: raster.height(),
        extent,
        biomass_min: joined.min(),
        biomass_max: joined.max(),
        painted_pixels: raster.painted(),
    };
    Ok((raster, summary))
}
