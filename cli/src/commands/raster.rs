use anyhow::Result;
use biomass_raster::{render_plot, ExtractMode, IndexBuilder, OutputPaths, OverlapPolicy, PlotId};

pub fn run(cli: &crate::cli::Cli, args: &crate::cli::RasterArgs) -> Result<()> {
    let mut config = crate::load_config(cli)?;
    if let Some(resolution) = args.resolution {
        config.resolution = resolution;
    }
    if args.scan {
        config.extract_mode = ExtractMode::Scan;
    }
    if args.max_wins {
        config.overlap = OverlapPolicy::MaxWins;
    }
    config.validate()?;

    let plot: PlotId = args.plot.parse()?;
    let outputs = match &args.output {
        Some(path) => OutputPaths::for_raster(path, &plot),
        None => OutputPaths::in_dir(&args.out_dir.clone().unwrap_or(".".into()), &plot),
    };

    let indexes = IndexBuilder::new(&config.index_dir, &config)
        .force(args.force)
        .progress(super::scan_progress()?);
    let report = render_plot(&indexes, &args.geojson, &args.csv, &plot, &outputs)?;

    let summary = &report.raster;
    println!("[raster] plot {}: {} polygons", summary.plot, summary.polygons);
    println!(
        "[raster] grid size: {:.1}km x {:.1}km ({} x {} pixels)",
        summary.extent.grid_size / 1000.0,
        summary.extent.grid_size / 1000.0,
        summary.width,
        summary.height
    );
    println!("[raster] biomass range: {:.2} to {:.2}", summary.biomass_min, summary.biomass_max);
    println!("[raster] annotated GeoJSON: {}", report.outputs.geojson.display());
    println!("[raster] raster: {}", report.outputs.raster.display());

    Ok(())
}
