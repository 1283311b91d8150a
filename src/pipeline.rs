//! One plot in, one raster out.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::{
    config::PipelineConfig,
    extract,
    index::{IndexBuilder, IndexStats, PlotId},
    io::{geojson, geotiff},
    join,
    raster::{self, RasterSummary},
};

/// Where the two per-plot artifacts are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPaths {
    pub geojson: PathBuf,
    pub raster: PathBuf,
}

impl OutputPaths {
    /// `biomass_data_NFI_<plot>.geojson` and `biomass_raster_NFI_<plot>.tif` under `dir`.
    pub fn in_dir(dir: &Path, plot: &PlotId) -> Self {
        Self {
            geojson: dir.join(format!("biomass_data_NFI_{plot}.geojson")),
            raster: dir.join(format!("biomass_raster_NFI_{plot}.tif")),
        }
    }

    /// An explicit raster path, with the annotated GeoJSON beside it.
    pub fn for_raster(raster: &Path, plot: &PlotId) -> Self {
        let dir = raster.parent().unwrap_or(Path::new(""));
        Self {
            geojson: dir.join(format!("biomass_data_NFI_{plot}.geojson")),
            raster: raster.to_path_buf(),
        }
    }
}

/// Result of a full run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub outputs: OutputPaths,
    pub index: IndexStats,
    pub index_reused: bool,
    pub raster: RasterSummary,
}

/// Build or reuse the indexes, then extract, join, normalize and rasterize
/// one plot.
///
/// Nothing is written to `outputs` unless the plot exists and every one of
/// its polygons has biomass. The annotated GeoJSON is published before
/// rasterization starts and stays in place if rasterization fails.
pub fn render_plot(
    indexes: &IndexBuilder<'_>,
    geometry_path: &Path,
    attribute_path: &Path,
    plot: &PlotId,
    outputs: &OutputPaths,
) -> Result<PipelineReport> {
    let config = indexes.config();
    config.validate()?;

    let built = indexes.build(geometry_path, attribute_path)?;
    let records = extract::extract(geometry_path, plot, &built.plots, config)?;
    let joined = join::join_and_normalize(plot, records, &built.biomass, config.norm_scale)?;

    geojson::write_annotated_geojson(&outputs.geojson, &joined, config)?;
    info!(path = %outputs.geojson.display(), polygons = joined.len(), "annotated GeoJSON written");

    let (raster, summary) = raster::synthesize(&joined, config)?;
    geotiff::write_geotiff(&outputs.raster, &raster)?;

    info!(
        path = %outputs.raster.display(),
        width = summary.width,
        height = summary.height,
        grid_km = summary.extent.grid_size / 1000.0,
        biomass_min = summary.biomass_min,
        biomass_max = summary.biomass_max,
        painted = summary.painted_pixels,
        "raster written"
    );

    Ok(PipelineReport {
        outputs: outputs.clone(),
        index: built.stats,
        index_reused: built.reused,
        raster: summary,
    })
}

/// [`render_plot`] with indexes under `config.index_dir` and the outputs
/// named after the plot beside `output_path`.
pub fn create_biomass_raster(
    geometry_path: &Path,
    attribute_path: &Path,
    plot: &PlotId,
    output_path: &Path,
    config: &PipelineConfig,
) -> Result<PipelineReport> {
    let indexes = IndexBuilder::new(&config.index_dir, config);
    render_plot(&indexes, geometry_path, attribute_path, plot, &OutputPaths::for_raster(output_path, plot))
}
