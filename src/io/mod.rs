//! File formats, organized by format rather than by pipeline stage.
//!
//! - `csv` - attribute table input
//! - `geojson` - geometry parsing and the annotated plot output
//! - `geotiff` - raster output

pub(crate) mod csv;
pub(crate) mod geojson;
pub(crate) mod geotiff;
