use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::{
    config::PipelineConfig,
    feature::{self, FeatureIds},
    index::{store::Sources, BiomassIndex, FeatureScanner, IndexStats, IndexStore, PlotIndex},
    io::csv,
};

/// Indexes produced (or reused) by [`IndexBuilder::build`].
#[derive(Debug, Clone)]
pub struct BuiltIndexes {
    pub plots: PlotIndex,
    pub biomass: BiomassIndex,
    pub stats: IndexStats,
    /// True when a committed index matching the sources was loaded instead of rebuilt.
    pub reused: bool,
}

/// Builds the plot and biomass indexes and publishes them to an [`IndexStore`].
pub struct IndexBuilder<'a> {
    config: &'a PipelineConfig,
    store: IndexStore,
    force: bool,
    progress: ProgressBar,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(index_dir: impl Into<PathBuf>, config: &'a PipelineConfig) -> Self {
        Self {
            config,
            store: IndexStore::new(index_dir),
            force: false,
            progress: ProgressBar::hidden(),
        }
    }

    /// Rebuild even if the store is current.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Report bytes of the geometry file consumed on `bar`.
    pub fn progress(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    #[inline] pub fn store(&self) -> &IndexStore { &self.store }

    #[inline] pub fn config(&self) -> &'a PipelineConfig { self.config }

    /// Return the committed indexes if they match the sources, otherwise
    /// stream both sources once and publish fresh indexes.
    pub fn build(&self, geometry_path: &Path, attribute_path: &Path) -> Result<BuiltIndexes> {
        let sources = Sources::of(geometry_path, attribute_path)?;

        if !self.force {
            if let Some((plots, biomass, stats)) = self.store.load_current(&sources)? {
                info!(
                    dir = %self.store.dir().display(),
                    plots = plots.len(),
                    biomass_records = biomass.len(),
                    "reusing existing indexes"
                );
                return Ok(BuiltIndexes { plots, biomass, stats, reused: true });
            }
        }

        let (plots, mut stats) = self.index_geometry(geometry_path, sources.geometry.len)?;

        let table = csv::read_attribute_table(attribute_path, self.config)?;
        let biomass = csv::biomass_index_from_table(&table, self.config)?;
        stats.biomass_records = biomass.len();

        self.store.save(&plots, &biomass, sources, stats)
            .with_context(|| format!("Failed to publish indexes to {}", self.store.dir().display()))?;

        info!(
            indexed = stats.features_indexed,
            skipped = stats.features_skipped,
            plots = stats.unique_plots,
            biomass_records = stats.biomass_records,
            "indexes built"
        );
        Ok(BuiltIndexes { plots, biomass, stats, reused: false })
    }

    /// Single streaming pass over the geometry file.
    fn index_geometry(&self, geometry_path: &Path, total_bytes: u64) -> Result<(PlotIndex, IndexStats)> {
        let mut scanner = FeatureScanner::open(geometry_path)?;
        let mut plots = PlotIndex::new();
        let mut stats = IndexStats::default();
        let mut bad_plot_ids = 0usize;

        self.progress.set_length(total_bytes);
        self.progress.set_position(0);

        while let Some(raw) = scanner.next() {
            let raw = raw.with_context(|| format!("Failed to scan {}", geometry_path.display()))?;
            self.progress.set_position(scanner.position());

            match feature::probe_ids(&raw, self.config) {
                Ok(FeatureIds { plot_id: Some(plot), poly_id: Some(poly) }) => {
                    plots.insert(plot, poly, raw.offset);
                    stats.features_indexed += 1;
                }
                Ok(FeatureIds { plot_id: None, poly_id }) => {
                    bad_plot_ids += 1;
                    stats.features_skipped += 1;
                    debug!(offset = raw.offset, poly_id = ?poly_id.as_ref().map(|p| p.as_str()), "record without a usable plot id");
                }
                Ok(FeatureIds { poly_id: None, .. }) => {
                    stats.features_skipped += 1;
                    debug!(offset = raw.offset, "record without a polygon id");
                }
                Err(e) => {
                    stats.features_skipped += 1;
                    warn!("{}", e);
                }
            }
        }
        self.progress.finish();

        if bad_plot_ids > 0 {
            info!(count = bad_plot_ids, "records with a missing or non-numeric plot id were not indexed");
        }
        stats.unique_plots = plots.len();
        Ok((plots, stats))
    }
}

/// Build (or reuse) the indexes for a geometry file and an attribute table.
pub fn build_indexes(
    geometry_path: &Path,
    attribute_path: &Path,
    index_dir: &Path,
    config: &PipelineConfig,
) -> Result<(PlotIndex, BiomassIndex)> {
    let built = IndexBuilder::new(index_dir, config).build(geometry_path, attribute_path)?;
    Ok((built.plots, built.biomass))
}
