mod cli;
mod commands;

use anyhow::Result;
use biomass_raster::PipelineConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{index, plots, raster};

/// `-v` raises the default level; `RUST_LOG` wins when set.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Configuration file (if any) with the global overrides applied.
pub(crate) fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &cli.index_dir {
        config.index_dir = dir.clone();
    }
    debug!(?config, "configuration loaded");
    Ok(config)
}

pub fn run() -> Result<()> {
    use clap::Parser;

    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match &cli.command {
        Commands::Index(args) => index::run(&cli, args),
        Commands::Plots(args) => plots::run(&cli, args),
        Commands::Raster(args) => raster::run(&cli, args),
    }
}

fn main() -> Result<()> { run() }
