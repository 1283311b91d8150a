//! CSV reading operations.

use std::{fs::File, path::Path, sync::Arc};

use anyhow::{Context, Result};
use polars::{frame::DataFrame, io::SerReader, prelude::{CsvReadOptions, DataType, Field, Schema, SchemaRef}};
use tracing::{debug, warn};

use crate::{config::PipelineConfig, index::{BiomassIndex, PolyKey}, Error};

/// Reads the attribute table at `path` into a Polars DataFrame.
/// The polygon identifier column is forced to text so identifiers like
/// `007_1` keep their exact spelling.
pub(crate) fn read_attribute_table(path: &Path, config: &PipelineConfig) -> Result<DataFrame> {
    let file = File::open(path)
        .with_context(|| format!("[io::csv::read] Failed to open CSV file: {}", path.display()))?;
    CsvReadOptions::default()
        .with_has_header(true)
        .with_schema_overwrite(Some(attribute_schema(config)))
        .into_reader_with_file_handle(file)
        .finish()
        .with_context(|| format!("[io::csv::read] Failed to read CSV from {:?}", path))
}

fn attribute_schema(config: &PipelineConfig) -> SchemaRef {
    Arc::new(Schema::from_iter([
        Field::new(config.poly_column.as_str().into(), DataType::String),
    ]))
}

/// Build the biomass index from an attribute table.
///
/// Fails with [`Error::Configuration`] if a required column is absent.
/// Rows with a null identifier, or a biomass cell that is empty, unparseable
/// or non-finite (`NaN`, `inf`), are skipped; a later row for the same
/// polygon replaces an earlier one.
pub(crate) fn biomass_index_from_table(df: &DataFrame, config: &PipelineConfig) -> Result<BiomassIndex> {
    let required = [&config.poly_column, &config.biomass_column, &config.plot_column];
    let missing: Vec<&str> = required.iter()
        .filter(|name| df.column(name.as_str()).is_err())
        .map(|name| name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(Error::Configuration(format!(
            "attribute table is missing required column(s): {}",
            missing.join(", ")
        )).into());
    }

    let poly_ids = df.column(&config.poly_column)?.cast(&DataType::String)?;
    let biomass = df.column(&config.biomass_column)?.cast(&DataType::Float64)
        .map_err(|e| Error::Configuration(format!(
            "column {:?} is not numeric: {}", config.biomass_column, e
        )))?;

    let mut index = BiomassIndex::new();
    let mut skipped = 0usize;
    for (poly_id, value) in poly_ids.str()?.into_iter().zip(biomass.f64()?.into_iter()) {
        match (poly_id, value) {
            (Some(poly_id), Some(value)) if value.is_finite() => index.insert(PolyKey::new(poly_id), value),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(skipped, "attribute rows without a polygon id or finite biomass value were skipped");
    }
    debug!(records = index.len(), rows = df.height(), "biomass index built");
    Ok(index)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write_csv(text: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attrs.csv");
        fs::write(&path, text).unwrap();
        (dir, path)
    }

    #[test]
    fn builds_canonical_keys() {
        let (_dir, path) = write_csv("poly_id,biomass_total_dead,nfi_plot\n A_1 ,10.5,42\n007_2,20,42\n");
        let config = PipelineConfig::default();
        let df = read_attribute_table(&path, &config).unwrap();
        let index = biomass_index_from_table(&df, &config).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("a_1"), Some(10.5));
        assert_eq!(index.get("007_2"), Some(20.0));
    }

    #[test]
    fn later_rows_win_and_nulls_are_skipped() {
        let (_dir, path) = write_csv("poly_id,biomass_total_dead,nfi_plot\nx,1,1\nX,2,1\ny,,1\n");
        let config = PipelineConfig::default();
        let df = read_attribute_table(&path, &config).unwrap();
        let index = biomass_index_from_table(&df, &config).unwrap();
        assert_eq!(index.get("x"), Some(2.0));
        assert_eq!(index.get("y"), None);
    }

    #[test]
    fn nan_biomass_is_not_a_value() {
        let (_dir, path) = write_csv("poly_id,biomass_total_dead,nfi_plot\na,NaN,1\nb,20,1\n");
        let config = PipelineConfig::default();
        let df = read_attribute_table(&path, &config).unwrap();
        let index = biomass_index_from_table(&df, &config).unwrap();
        assert_eq!(index.get("a"), None);
        assert_eq!(index.get("b"), Some(20.0));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn unparseable_biomass_is_skipped() {
        let (_dir, path) = write_csv("poly_id,biomass_total_dead,nfi_plot\na,heavy,1\nb,20,1\n");
        let config = PipelineConfig::default();
        let df = read_attribute_table(&path, &config).unwrap();
        let index = biomass_index_from_table(&df, &config).unwrap();
        assert_eq!(index.get("a"), None);
        assert_eq!(index.get("b"), Some(20.0));
    }

    #[test]
    fn missing_columns_are_a_configuration_error() {
        let (_dir, path) = write_csv("poly_id,biomass\nx,1\n");
        let config = PipelineConfig::default();
        let df = read_attribute_table(&path, &config).unwrap();
        let err = biomass_index_from_table(&df, &config).unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::Configuration(msg)) => {
                assert!(msg.contains("biomass_total_dead"));
                assert!(msg.contains("nfi_plot"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
