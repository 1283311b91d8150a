#![doc = "Forest plot biomass rasters from a streamed polygon index"]
mod common;
mod config;
mod error;
mod extract;
mod feature;
mod index;
mod io;
mod join;
mod pipeline;
mod raster;

#[doc(inline)]
pub use config::{CrsDef, ExtractMode, OverlapPolicy, PipelineConfig, CANADA_LAMBERT_WKT};

#[doc(inline)]
pub use error::Error;

#[doc(inline)]
pub use common::SourceFingerprint;

#[doc(inline)]
pub use feature::PlotFeature;

#[doc(inline)]
pub use index::{
    build_indexes, read_feature_at, BiomassIndex, BuiltIndexes, FeatureScanner, IndexBuilder,
    IndexStats, IndexStore, PlotEntry, PlotId, PlotIndex, PolyKey, RawFeature,
};

#[doc(inline)]
pub use extract::extract;

#[doc(inline)]
pub use join::{join_and_normalize, normalize, JoinedPolygon, JoinedSet};

#[doc(inline)]
pub use raster::{resample_nearest, synthesize, GeoTransform, GridExtent, Raster, RasterSummary};

#[doc(inline)]
pub use io::geotiff::write_geotiff;

#[doc(inline)]
pub use pipeline::{create_biomass_raster, render_plot, OutputPaths, PipelineReport};
