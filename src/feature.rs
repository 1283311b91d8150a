use geo::MultiPolygon;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{config::PipelineConfig, index::{PlotId, PolyKey, RawFeature}, io::geojson, Error};

/// Only the properties of a feature; the geometry is skipped without allocating.
#[derive(Deserialize)]
struct PropertiesOnly {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct FeatureDoc {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    #[serde(default)]
    geometry: Option<Value>,
}

/// The identifiers of one record, as the index builder sees them.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FeatureIds {
    /// `None` when the plot property is absent or not numeric.
    pub plot_id: Option<PlotId>,
    /// `None` when the polygon property is absent or null.
    pub poly_id: Option<PolyKey>,
}

/// Read just the plot and polygon identifiers of a record.
pub(crate) fn probe_ids(raw: &RawFeature, config: &PipelineConfig) -> Result<FeatureIds, Error> {
    let doc: PropertiesOnly = serde_json::from_slice(&raw.bytes)
        .map_err(|e| Error::malformed(raw.offset, e))?;
    let properties = doc.properties.unwrap_or_default();
    Ok(FeatureIds {
        plot_id: properties.get(&config.plot_property).and_then(PlotId::from_json),
        poly_id: properties.get(&config.poly_property).and_then(PolyKey::from_json),
    })
}

/// One decoded polygon record of the geometry collection.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotFeature {
    /// Byte offset of the record in the geometry file.
    pub offset: u64,
    pub plot_id: Option<PlotId>,
    /// Polygon identifier as spelled in the source.
    pub poly_id: String,
    /// Canonical polygon identifier used for joins.
    pub key: PolyKey,
    pub geometry: MultiPolygon<f64>,
}

impl PlotFeature {
    /// Decode a full record. A record without a polygon identifier or with
    /// an unusable geometry is [`Error::MalformedRecord`].
    pub(crate) fn decode(raw: &RawFeature, config: &PipelineConfig) -> Result<Self, Error> {
        let doc: FeatureDoc = serde_json::from_slice(&raw.bytes)
            .map_err(|e| Error::malformed(raw.offset, e))?;
        let properties = doc.properties.unwrap_or_default();

        let poly_value = properties.get(&config.poly_property)
            .ok_or_else(|| Error::malformed(raw.offset, format!("missing property {}", config.poly_property)))?;
        let key = PolyKey::from_json(poly_value)
            .ok_or_else(|| Error::malformed(raw.offset, format!("{} is not a scalar", config.poly_property)))?;
        let poly_id = match poly_value {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };

        let geometry = doc.geometry
            .ok_or_else(|| Error::malformed(raw.offset, "feature has no geometry"))
            .and_then(|g| geojson::parse_geometry(&g).map_err(|e| Error::malformed(raw.offset, e)))?;

        Ok(Self {
            offset: raw.offset,
            plot_id: properties.get(&config.plot_property).and_then(PlotId::from_json),
            poly_id,
            key,
            geometry,
        })
    }
}
