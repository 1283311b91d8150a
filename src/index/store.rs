use std::{collections::BTreeMap, fs, path::{Path, PathBuf}};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{common::{self, SourceFingerprint}, index::{BiomassIndex, PlotIndex}};

const MANIFEST_VERSION: u32 = 1;

pub(crate) const PLOT_INDEX_FILE: &str = "plot_index.bin";
pub(crate) const BIOMASS_INDEX_FILE: &str = "biomass_index.bin";
pub(crate) const MANIFEST_FILE: &str = "manifest.json";

/// Counters from one index build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Records added to the plot index.
    pub features_indexed: usize,
    /// Records left out: unreadable, or without a usable plot or polygon identifier.
    pub features_skipped: usize,
    pub unique_plots: usize,
    /// Rows in the biomass index.
    pub biomass_records: usize,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct FileHash {
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Sources {
    pub geometry: SourceFingerprint,
    pub attributes: SourceFingerprint,
}

impl Sources {
    pub(crate) fn of(geometry_path: &Path, attribute_path: &Path) -> Result<Self> {
        Ok(Self {
            geometry: SourceFingerprint::of(geometry_path)?,
            attributes: SourceFingerprint::of(attribute_path)?,
        })
    }
}

#[derive(Serialize, Deserialize)]
pub(crate) struct IndexManifest {
    version: u32,
    sources: Sources,
    stats: IndexStats,
    files: BTreeMap<String, FileHash>,
}

/// On-disk home of the two indexes.
///
/// The manifest is the commit marker: it is removed before the index files
/// are rewritten and published only after both are in place, so an
/// interrupted build never looks current.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[inline] pub fn dir(&self) -> &Path { &self.dir }

    pub fn plot_index_path(&self) -> PathBuf { self.dir.join(PLOT_INDEX_FILE) }

    pub fn biomass_index_path(&self) -> PathBuf { self.dir.join(BIOMASS_INDEX_FILE) }

    pub fn manifest_path(&self) -> PathBuf { self.dir.join(MANIFEST_FILE) }

    /// True if a committed index exists, whatever its sources.
    pub fn exists(&self) -> bool { self.manifest_path().is_file() }

    fn read_manifest(&self) -> Result<IndexManifest> {
        let path = self.manifest_path();
        let text = fs::read_to_string(&path)
            .with_context(|| format!("[index::store] Failed to read {}", path.display()))?;
        let manifest: IndexManifest = serde_json::from_str(&text)
            .with_context(|| format!("[index::store] Failed to parse {}", path.display()))?;
        ensure!(
            manifest.version == MANIFEST_VERSION,
            "[index::store] Unsupported manifest version {} (expected {})",
            manifest.version,
            MANIFEST_VERSION
        );
        Ok(manifest)
    }

    /// Build statistics recorded with the committed index.
    pub fn stats(&self) -> Result<IndexStats> {
        Ok(self.read_manifest()?.stats)
    }

    /// Load the committed indexes if they were built from `sources`.
    /// Returns `Ok(None)` when the store is missing or stale.
    pub(crate) fn load_current(&self, sources: &Sources) -> Result<Option<(PlotIndex, BiomassIndex, IndexStats)>> {
        if !self.exists() {
            debug!(dir = %self.dir.display(), "no committed index");
            return Ok(None);
        }
        let manifest = match self.read_manifest() {
            Ok(manifest) => manifest,
            Err(e) => {
                info!("index manifest unusable, rebuilding: {:#}", e);
                return Ok(None);
            }
        };
        if &manifest.sources != sources {
            info!(dir = %self.dir.display(), "source files changed since the index was built");
            return Ok(None);
        }

        let plot_bytes = match self.read_verified(&manifest, PLOT_INDEX_FILE)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let biomass_bytes = match self.read_verified(&manifest, BIOMASS_INDEX_FILE)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        let plots = PlotIndex::from_bytes(&plot_bytes)
            .with_context(|| format!("[index::store] Corrupt {}", PLOT_INDEX_FILE))?;
        let biomass = BiomassIndex::from_bytes(&biomass_bytes)
            .with_context(|| format!("[index::store] Corrupt {}", BIOMASS_INDEX_FILE))?;
        Ok(Some((plots, biomass, manifest.stats)))
    }

    /// Read an index file, returning `None` if it is missing or its hash
    /// differs from the manifest.
    fn read_verified(&self, manifest: &IndexManifest, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.dir.join(name);
        let Some(expected) = manifest.files.get(name) else {
            info!(file = name, "manifest does not list index file");
            return Ok(None);
        };
        if !path.is_file() {
            info!(file = %path.display(), "index file missing");
            return Ok(None);
        }
        let bytes = fs::read(&path)
            .with_context(|| format!("[index::store] Failed to read {}", path.display()))?;
        if common::sha256_bytes(&bytes) != expected.sha256 {
            info!(file = %path.display(), "index file hash mismatch");
            return Ok(None);
        }
        Ok(Some(bytes))
    }

    /// Load the committed indexes without checking them against any source.
    pub fn load(&self) -> Result<(PlotIndex, BiomassIndex)> {
        ensure!(self.exists(), "[index::store] No index found in {}", self.dir.display());
        let manifest = self.read_manifest()?;
        let plot_bytes = self.read_verified(&manifest, PLOT_INDEX_FILE)?
            .with_context(|| format!("[index::store] {} is missing or corrupt", PLOT_INDEX_FILE))?;
        let biomass_bytes = self.read_verified(&manifest, BIOMASS_INDEX_FILE)?
            .with_context(|| format!("[index::store] {} is missing or corrupt", BIOMASS_INDEX_FILE))?;
        Ok((PlotIndex::from_bytes(&plot_bytes)?, BiomassIndex::from_bytes(&biomass_bytes)?))
    }

    /// Publish both indexes, then the manifest.
    pub(crate) fn save(
        &self,
        plots: &PlotIndex,
        biomass: &BiomassIndex,
        sources: Sources,
        stats: IndexStats,
    ) -> Result<()> {
        common::ensure_dir_exists(&self.dir)?;

        let manifest_path = self.manifest_path();
        if manifest_path.exists() {
            fs::remove_file(&manifest_path)
                .with_context(|| format!("[index::store] Failed to retire {}", manifest_path.display()))?;
        }

        let mut files = BTreeMap::new();
        for (name, bytes) in [
            (PLOT_INDEX_FILE, plots.to_bytes()?),
            (BIOMASS_INDEX_FILE, biomass.to_bytes()?),
        ] {
            common::write_bytes_atomic(&self.dir.join(name), &bytes)?;
            files.insert(name.to_string(), FileHash { sha256: common::sha256_bytes(&bytes) });
        }

        let manifest = IndexManifest { version: MANIFEST_VERSION, sources, stats, files };
        let json = serde_json::to_vec_pretty(&manifest)?;
        common::write_bytes_atomic(&manifest_path, &json)?;
        debug!(dir = %self.dir.display(), "index committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::index::{PlotId, PolyKey};

    use super::*;

    fn sample() -> (PlotIndex, BiomassIndex) {
        let mut plots = PlotIndex::new();
        plots.insert(PlotId::from_f64(42.0).unwrap(), PolyKey::new("A_1"), 17);
        let mut biomass = BiomassIndex::new();
        biomass.insert(PolyKey::new("a_1"), 10.0);
        (plots, biomass)
    }

    fn sources(dir: &Path) -> Sources {
        let geo = dir.join("g.geojson");
        let csv = dir.join("a.csv");
        fs::write(&geo, "{}").unwrap();
        fs::write(&csv, "poly_id\n").unwrap();
        Sources::of(&geo, &csv).unwrap()
    }

    #[test]
    fn save_then_load_current() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path().join("idx"));
        let src = sources(dir.path());
        let (plots, biomass) = sample();
        let stats = IndexStats { features_indexed: 1, unique_plots: 1, biomass_records: 1, ..Default::default() };

        assert!(store.load_current(&src).unwrap().is_none());
        store.save(&plots, &biomass, src.clone(), stats).unwrap();

        let (p, b, s) = store.load_current(&src).unwrap().unwrap();
        assert_eq!(p, plots);
        assert_eq!(b, biomass);
        assert_eq!(s, stats);
        assert_eq!(store.stats().unwrap(), stats);
        assert_eq!(store.load().unwrap().0, plots);
    }

    #[test]
    fn changed_sources_are_stale() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let src = sources(dir.path());
        let (plots, biomass) = sample();
        store.save(&plots, &biomass, src.clone(), IndexStats::default()).unwrap();

        let mut changed = src.clone();
        changed.geometry.len += 1;
        assert!(store.load_current(&changed).unwrap().is_none());
    }

    #[test]
    fn tampered_index_file_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let src = sources(dir.path());
        let (plots, biomass) = sample();
        store.save(&plots, &biomass, src.clone(), IndexStats::default()).unwrap();

        let mut bytes = fs::read(store.biomass_index_path()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(store.biomass_index_path(), bytes).unwrap();
        assert!(store.load_current(&src).unwrap().is_none());
        assert!(store.load().is_err());
    }

    #[test]
    fn missing_manifest_means_no_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let (plots, _) = sample();
        fs::write(store.plot_index_path(), plots.to_bytes().unwrap()).unwrap();
        assert!(!store.exists());
        assert!(store.load().is_err());
    }
}
