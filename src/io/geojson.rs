//! GeoJSON geometry conversion and annotated plot output.

use std::{io::Write, path::Path};

use anyhow::{anyhow, bail, Context, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::{json, Map, Value};

use crate::{common, config::PipelineConfig, join::JoinedSet};

/// Parse a GeoJSON `Polygon` or `MultiPolygon` geometry object.
pub(crate) fn parse_geometry(geometry: &Value) -> Result<MultiPolygon<f64>> {
    let kind = geometry.get("type").and_then(Value::as_str)
        .ok_or_else(|| anyhow!("geometry has no type"))?;
    let coords = geometry.get("coordinates").and_then(Value::as_array)
        .ok_or_else(|| anyhow!("{} geometry has no coordinates", kind))?;

    let multipolygon = match kind {
        "Polygon" => MultiPolygon(vec![parse_polygon_coords(coords)?]),
        "MultiPolygon" => MultiPolygon(
            coords.iter()
                .map(|polygon| polygon.as_array()
                    .ok_or_else(|| anyhow!("MultiPolygon member is not an array"))
                    .and_then(|rings| parse_polygon_coords(rings)))
                .collect::<Result<Vec<_>>>()?
        ),
        other => bail!("unsupported geometry type {}", other),
    };

    if multipolygon.0.is_empty() {
        bail!("{} geometry is empty", kind);
    }
    Ok(multipolygon)
}

/// Parse polygon rings: `[exterior, hole, hole, ...]`.
fn parse_polygon_coords(rings: &[Value]) -> Result<Polygon<f64>> {
    let mut rings = rings.iter().map(|ring| {
        ring.as_array()
            .ok_or_else(|| anyhow!("polygon ring is not an array"))
            .and_then(|coords| parse_ring_coords(coords))
    });
    let exterior = rings.next()
        .ok_or_else(|| anyhow!("polygon has no exterior ring"))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

/// Parse a ring (exterior or interior): `[[x, y], [x, y], ...]`.
fn parse_ring_coords(coords: &[Value]) -> Result<LineString<f64>> {
    let mut points = Vec::with_capacity(coords.len() + 1);

    for coord_pair in coords {
        let coord_array = coord_pair.as_array()
            .filter(|a| a.len() >= 2)
            .ok_or_else(|| anyhow!("Invalid coordinate: expected [x, y]"))?;
        let x = coord_array[0].as_f64()
            .ok_or_else(|| anyhow!("Invalid coordinate: x must be a number"))?;
        let y = coord_array[1].as_f64()
            .ok_or_else(|| anyhow!("Invalid coordinate: y must be a number"))?;
        points.push(Coord { x, y });
    }

    if points.len() < 3 {
        bail!("ring has {} coordinates, need at least 3", points.len());
    }

    // Ensure ring is closed (first point == last point)
    if points[0] != points[points.len() - 1] {
        points.push(points[0]);
    }

    Ok(LineString(points))
}

/// Helper to convert a MultiPolygon to a serde_json::Value representing GeoJSON Geometry.
pub(crate) fn multipolygon_to_geojson(mp: &MultiPolygon<f64>) -> Value {
    let ring = |ls: &LineString<f64>| -> Vec<[f64; 2]> {
        ls.coords().map(|c| [c.x, c.y]).collect()
    };
    let polygons: Vec<Value> = mp.0.iter()
        .map(|polygon| {
            let mut rings = vec![ring(polygon.exterior())];
            rings.extend(polygon.interiors().iter().map(ring));
            json!(rings)
        })
        .collect();

    json!({
        "type": "MultiPolygon",
        "coordinates": polygons,
    })
}

/// Export a joined plot as a GeoJSON FeatureCollection with `biomass` and
/// `biomass_norm` properties, written atomically to `path`.
pub(crate) fn write_annotated_geojson(path: &Path, joined: &JoinedSet, config: &PipelineConfig) -> Result<()> {
    let features: Vec<Value> = joined.polygons().iter()
        .map(|polygon| {
            let mut properties = Map::new();
            properties.insert(config.poly_property.clone(), json!(polygon.poly_id));
            properties.insert("biomass".to_string(), json!(polygon.biomass));
            properties.insert("biomass_norm".to_string(), json!(polygon.normalized));
            json!({
                "type": "Feature",
                "properties": properties,
                "geometry": multipolygon_to_geojson(&polygon.geometry),
            })
        })
        .collect();

    let collection = json!({
        "type": "FeatureCollection",
        "name": format!("biomass_data_NFI_{}", joined.plot()),
        "crs": { "type": "name", "properties": { "name": config.crs.name } },
        "features": features,
    });

    common::write_atomic(path, |writer| {
        serde_json::to_writer(&mut *writer, &collection)
            .context("Failed to serialize GeoJSON")?;
        writer.write_all(b"\n")?;
        Ok(())
    })
    .with_context(|| format!("Failed to write annotated GeoJSON to {}", path.display()))
}
