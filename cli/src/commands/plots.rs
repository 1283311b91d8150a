use anyhow::{Context, Result};
use biomass_raster::IndexStore;

pub fn run(cli: &crate::cli::Cli, args: &crate::cli::PlotsArgs) -> Result<()> {
    let config = crate::load_config(cli)?;
    let store = IndexStore::new(&config.index_dir);
    let (plots, _) = store.load()
        .with_context(|| format!("[plots] no usable index in {} (run `biomass-raster index` first)", config.index_dir.display()))?;

    let limit = args.limit.unwrap_or(usize::MAX);
    for (plot, entry) in plots.iter().take(limit) {
        println!("{}\t{}", plot, entry.len());
    }
    if plots.len() > limit {
        println!("... {} more", plots.len() - limit);
    }
    println!("[plots] {} plots, {} polygons", plots.len(), plots.polygon_count());

    Ok(())
}
