use std::path::PathBuf;

/// Forest plot biomass raster CLI (argument schema only)
#[derive(clap::Parser, Debug)]
#[command(name = "biomass-raster", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Pipeline configuration file (JSON); absent fields keep their defaults
    #[arg(short, long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Index directory, overrides the configuration file
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub index_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Build or refresh the plot and biomass indexes
    Index(IndexArgs),

    /// List indexed plots with their polygon counts
    Plots(PlotsArgs),

    /// Render one plot to a biomass GeoTIFF (builds indexes if needed)
    Raster(RasterArgs),
}

#[derive(clap::Args, Debug)]
pub struct IndexArgs {
    /// Polygon FeatureCollection (GeoJSON)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub geojson: PathBuf,

    /// Attribute table (CSV) with poly_id, biomass_total_dead, nfi_plot
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub csv: PathBuf,

    /// Rebuild even if the existing indexes match the inputs
    #[arg(long)]
    pub force: bool,
}

#[derive(clap::Args, Debug)]
pub struct PlotsArgs {
    /// Print at most this many plots
    #[arg(short, long)]
    pub limit: Option<usize>,
}

#[derive(clap::Args, Debug)]
pub struct RasterArgs {
    /// Polygon FeatureCollection (GeoJSON)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub geojson: PathBuf,

    /// Attribute table (CSV)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub csv: PathBuf,

    /// Plot identifier, e.g. 1176871
    pub plot: String,

    /// Output raster file, defaults to "<out-dir>/biomass_raster_NFI_<plot>.tif"
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Directory for default-named outputs, defaults to "."
    #[arg(long, value_hint = clap::ValueHint::DirPath)]
    pub out_dir: Option<PathBuf>,

    /// Pixel size in coordinate units (meters)
    #[arg(short, long)]
    pub resolution: Option<f64>,

    /// Rebuild the indexes even if they match the inputs
    #[arg(long)]
    pub force: bool,

    /// Recover records with a sequential scan instead of indexed seeks
    #[arg(long)]
    pub scan: bool,

    /// Keep the highest value where polygons overlap instead of the last painted
    #[arg(long)]
    pub max_wins: bool,
}
