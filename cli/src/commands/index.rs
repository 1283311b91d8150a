use anyhow::Result;
use biomass_raster::IndexBuilder;

pub fn run(cli: &crate::cli::Cli, args: &crate::cli::IndexArgs) -> Result<()> {
    let config = crate::load_config(cli)?;

    let builder = IndexBuilder::new(&config.index_dir, &config)
        .force(args.force)
        .progress(super::scan_progress()?);
    let built = builder.build(&args.geojson, &args.csv)?;

    let stats = built.stats;
    if built.reused {
        println!("[index] indexes in {} are current", config.index_dir.display());
    } else {
        println!("[index] wrote indexes to {}", config.index_dir.display());
    }
    println!("[index] features indexed: {}", stats.features_indexed);
    println!("[index] features skipped: {}", stats.features_skipped);
    println!("[index] unique plots:     {}", stats.unique_plots);
    println!("[index] biomass records:  {}", stats.biomass_records);

    Ok(())
}
