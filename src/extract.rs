//! Recover the records of one plot from the geometry file.

use std::{fs::File, io::BufReader, path::Path};

use ahash::AHashSet;
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::{
    config::{ExtractMode, PipelineConfig},
    feature::{self, PlotFeature},
    index::{read_feature_at, FeatureScanner, PlotEntry, PlotId, PlotIndex, RawFeature},
    Error,
};

/// Decoded records of `plot`, in file order.
///
/// Fails with [`Error::NotFound`] if the plot is not indexed and with
/// [`Error::EmptyResult`] if none of its records could be decoded.
/// Undecodable records are logged and skipped.
pub fn extract(
    geometry_path: &Path,
    plot: &PlotId,
    plots: &PlotIndex,
    config: &PipelineConfig,
) -> Result<Vec<PlotFeature>> {
    let entry = plots.get(plot)
        .ok_or_else(|| Error::NotFound { plot: plot.to_string() })?;

    let outcome = match config.extract_mode {
        ExtractMode::Seek => match seek_records(geometry_path, entry, config)? {
            Some(outcome) => outcome,
            None => {
                warn!(plot = %plot, "geometry file no longer matches the index, falling back to a full scan");
                scan_records(geometry_path, plot, entry, config)?
            }
        },
        ExtractMode::Scan => scan_records(geometry_path, plot, entry, config)?,
    };

    if outcome.features.is_empty() {
        return Err(Error::EmptyResult {
            plot: plot.to_string(),
            expected: entry.len(),
            skipped: outcome.skipped,
        }.into());
    }
    if outcome.features.len() < entry.len() {
        warn!(
            plot = %plot,
            found = outcome.features.len(),
            expected = entry.len(),
            "some indexed records were not recovered"
        );
    }
    debug!(plot = %plot, records = outcome.features.len(), skipped = outcome.skipped, "extracted");
    Ok(outcome.features)
}

struct Outcome {
    features: Vec<PlotFeature>,
    skipped: usize,
}

impl Outcome {
    fn new() -> Self { Self { features: Vec::new(), skipped: 0 } }

    fn decode(&mut self, raw: &RawFeature, config: &PipelineConfig) {
        match PlotFeature::decode(raw, config) {
            Ok(feature) => self.features.push(feature),
            Err(e) => {
                self.skipped += 1;
                warn!("{}", e);
            }
        }
    }
}

/// Read each indexed offset directly. Returns `None` if any offset no longer
/// holds the record the index recorded for it.
fn seek_records(geometry_path: &Path, entry: &PlotEntry, config: &PipelineConfig) -> Result<Option<Outcome>> {
    let file = File::open(geometry_path)
        .with_context(|| format!("Failed to open geometry file: {}", geometry_path.display()))?;
    let mut reader = BufReader::with_capacity(1 << 16, file);

    let mut targets: Vec<_> = entry.iter().collect();
    targets.sort_by_key(|(_, offset)| *offset);

    let mut outcome = Outcome::new();
    for (expected, offset) in targets {
        let raw = match read_feature_at(&mut reader, offset) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(offset, "seek read failed: {:#}", e);
                return Ok(None);
            }
        };
        match feature::probe_ids(&raw, config) {
            Ok(ids) if ids.poly_id.as_ref() == Some(expected) => outcome.decode(&raw, config),
            Ok(ids) => {
                debug!(offset, expected = %expected, found = ?ids.poly_id, "record at offset changed");
                return Ok(None);
            }
            Err(e) => {
                outcome.skipped += 1;
                warn!("{}", e);
            }
        }
    }
    Ok(Some(outcome))
}

/// One sequential pass, stopping once every indexed polygon has matched.
fn scan_records(geometry_path: &Path, plot: &PlotId, entry: &PlotEntry, config: &PipelineConfig) -> Result<Outcome> {
    let targets: AHashSet<&str> = entry.poly_ids().iter().map(|p| p.as_str()).collect();
    let wanted = entry.len();

    let mut outcome = Outcome::new();
    let mut matched = 0usize;
    let mut scanned = 0usize;
    for raw in FeatureScanner::open(geometry_path)? {
        let raw = raw.with_context(|| format!("Failed to scan {}", geometry_path.display()))?;
        scanned += 1;

        let ids = match feature::probe_ids(&raw, config) {
            Ok(ids) => ids,
            Err(e) => {
                outcome.skipped += 1;
                warn!("{}", e);
                continue;
            }
        };
        let Some(poly) = ids.poly_id else { continue };
        if !targets.contains(poly.as_str()) { continue }
        if ids.plot_id.as_ref().is_some_and(|p| p != plot) { continue }

        matched += 1;
        outcome.decode(&raw, config);
        if matched == wanted { break }
    }
    info!(plot = %plot, scanned, matched, "scan finished");
    Ok(outcome)
}
