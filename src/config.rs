use std::{fs::File, io::BufReader, path::{Path, PathBuf}, str::FromStr};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::Error;

/// NAD83 / Canada Lambert (ESRI:102001).
pub const CANADA_LAMBERT_WKT: &str = concat!(
    r#"PROJCS["NAD_1983_Canada_Lambert","#,
    r#"GEOGCS["GCS_North_American_1983","#,
    r#"DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],"#,
    r#"PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],"#,
    r#"PROJECTION["Lambert_Conformal_Conic"],"#,
    r#"PARAMETER["False_Easting",0.0],PARAMETER["False_Northing",0.0],"#,
    r#"PARAMETER["Central_Meridian",-95.0],"#,
    r#"PARAMETER["Standard_Parallel_1",49.0],PARAMETER["Standard_Parallel_2",77.0],"#,
    r#"PARAMETER["Latitude_Of_Origin",49.0],UNIT["Meter",1.0]]"#,
);

/// Longest CRS name plus WKT the GeoTIFF writer accepts; GeoAsciiParams
/// offsets and counts are u16.
pub const MAX_CRS_TEXT: usize = 60_000;

/// Coordinate reference system carried from the geometry input to the raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrsDef {
    /// EPSG code, when the CRS has one. Written as ProjectedCSTypeGeoKey;
    /// otherwise the WKT is written as an ESRI PE string citation.
    pub epsg: Option<u16>,
    pub name: String,
    pub wkt: String,
}

impl Default for CrsDef {
    fn default() -> Self {
        Self {
            epsg: None,
            name: "NAD83 / Canada Lambert (ESRI:102001)".into(),
            wkt: CANADA_LAMBERT_WKT.into(),
        }
    }
}

/// How overlapping polygons resolve a shared pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Later polygons (in join order) paint over earlier ones.
    #[default]
    LastWins,
    /// The highest normalized value is kept.
    MaxWins,
}

impl FromStr for OverlapPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "last_wins" | "last" => Ok(Self::LastWins),
            "max_wins" | "max" => Ok(Self::MaxWins),
            _ => Err(anyhow!("Unknown overlap policy: {}. Expected 'last_wins' or 'max_wins'", s)),
        }
    }
}

/// How the extractor recovers a plot's records from the geometry file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractMode {
    /// Seek to each indexed offset and decode one record.
    #[default]
    Seek,
    /// Sequential scan, stopping once every target polygon is found.
    Scan,
}

impl FromStr for ExtractMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "seek" => Ok(Self::Seek),
            "scan" => Ok(Self::Scan),
            _ => Err(anyhow!("Unknown extract mode: {}. Expected 'seek' or 'scan'", s)),
        }
    }
}

/// Every process-wide constant of the pipeline, with the reference defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Feature property holding the plot identifier.
    pub plot_property: String,
    /// Feature property holding the polygon identifier.
    pub poly_property: String,

    /// Attribute table column holding the polygon identifier.
    pub poly_column: String,
    /// Attribute table column holding the biomass value.
    pub biomass_column: String,
    /// Attribute table column holding the plot identifier (required, not joined on).
    pub plot_column: String,

    /// Grid sizes are rounded up to a multiple of this many coordinate units.
    pub grid_step: f64,
    /// Pixel size in coordinate units.
    pub resolution: f64,
    /// Normalized biomass spans `0..=norm_scale`.
    pub norm_scale: u16,
    /// Raster nodata sentinel.
    pub nodata: u16,

    pub crs: CrsDef,
    pub overlap: OverlapPolicy,
    pub extract_mode: ExtractMode,

    /// Where the index store lives.
    pub index_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            plot_property: "NFI_PLOT".into(),
            poly_property: "POLY_ID".into(),
            poly_column: "poly_id".into(),
            biomass_column: "biomass_total_dead".into(),
            plot_column: "nfi_plot".into(),
            grid_step: 2000.0,
            resolution: 10.0,
            norm_scale: 60000,
            nodata: u16::MAX,
            crs: CrsDef::default(),
            overlap: OverlapPolicy::default(),
            extract_mode: ExtractMode::default(),
            index_dir: PathBuf::from("indexes"),
        }
    }
}

impl PipelineConfig {
    /// Read a config from a JSON file. Absent fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject constants the raster math cannot work with.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| -> Result<()> { Err(Error::Configuration(msg).into()) };

        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return fail(format!("resolution must be positive, got {}", self.resolution));
        }
        if !(self.grid_step.is_finite() && self.grid_step > 0.0) {
            return fail(format!("grid_step must be positive, got {}", self.grid_step));
        }
        if self.norm_scale >= self.nodata {
            return fail(format!(
                "norm_scale ({}) must stay below the nodata sentinel ({})",
                self.norm_scale, self.nodata
            ));
        }
        let crs_text = self.crs.name.len() + self.crs.wkt.len();
        if crs_text > MAX_CRS_TEXT {
            return fail(format!("crs name and wkt total {crs_text} bytes, at most {MAX_CRS_TEXT} fit in a GeoTIFF"));
        }
        if self.plot_property.is_empty() || self.poly_property.is_empty() {
            return fail("feature property names must not be empty".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.grid_step, 2000.0);
        assert_eq!(cfg.resolution, 10.0);
        assert_eq!(cfg.norm_scale, 60000);
        assert_eq!(cfg.nodata, 65535);
        assert!(cfg.crs.wkt.contains("Lambert_Conformal_Conic"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(r#"{ "resolution": 5.0, "overlap": "max_wins" }"#).unwrap();
        assert_eq!(cfg.resolution, 5.0);
        assert_eq!(cfg.overlap, OverlapPolicy::MaxWins);
        assert_eq!(cfg.poly_property, "POLY_ID");
    }

    #[test]
    fn scale_at_nodata_is_rejected() {
        let cfg = PipelineConfig { norm_scale: 65535, ..Default::default() };
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Configuration(_))));
    }

    #[test]
    fn oversized_crs_wkt_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.crs.wkt = "X".repeat(MAX_CRS_TEXT + 1);
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Configuration(msg)) if msg.contains("crs")));
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let cfg = PipelineConfig { resolution: 0.0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parse_policies() {
        assert_eq!("max-wins".parse::<OverlapPolicy>().unwrap(), OverlapPolicy::MaxWins);
        assert_eq!("SCAN".parse::<ExtractMode>().unwrap(), ExtractMode::Scan);
        assert!("sideways".parse::<ExtractMode>().is_err());
    }
}
