//! Joining extracted polygons to biomass and rescaling to the raster range.

use anyhow::Result;
use geo::MultiPolygon;

use crate::{feature::PlotFeature, index::{BiomassIndex, PlotId, PolyKey}, Error};

/// One polygon with its raw and normalized biomass.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedPolygon {
    pub poly_id: String,
    pub key: PolyKey,
    pub geometry: MultiPolygon<f64>,
    pub biomass: f64,
    pub normalized: u16,
}

/// The joined polygons of one plot, in extraction order.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedSet {
    plot: PlotId,
    polygons: Vec<JoinedPolygon>,
    min: f64,
    max: f64,
}

impl JoinedSet {
    #[inline] pub fn plot(&self) -> &PlotId { &self.plot }

    #[inline] pub fn polygons(&self) -> &[JoinedPolygon] { &self.polygons }

    #[inline] pub fn len(&self) -> usize { self.polygons.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.polygons.is_empty() }

    /// Smallest raw biomass in the set.
    #[inline] pub fn min(&self) -> f64 { self.min }

    /// Largest raw biomass in the set.
    #[inline] pub fn max(&self) -> f64 { self.max }
}

/// Linear rescale of `value` from `[min, max]` onto `0..=scale`, truncating.
/// A degenerate range maps everything to 0.
pub fn normalize(value: f64, min: f64, max: f64, scale: u16) -> u16 {
    if min == max {
        return 0;
    }
    let scaled = ((value - min) / (max - min) * f64::from(scale)).floor();
    // `as` saturates, so rounding error past either end cannot wrap.
    (scaled as u16).min(scale)
}

/// Attach biomass to every record and normalize it.
///
/// All or nothing: if any record has no biomass row, or only a non-finite
/// one, the join fails with [`Error::MissingBiomass`] naming every
/// unresolved polygon.
pub fn join_and_normalize(
    plot: &PlotId,
    records: Vec<PlotFeature>,
    biomass: &BiomassIndex,
    norm_scale: u16,
) -> Result<JoinedSet> {
    if records.is_empty() {
        return Err(Error::EmptyResult { plot: plot.to_string(), expected: 0, skipped: 0 }.into());
    }

    let resolve = |r: &PlotFeature| biomass.get(r.key.as_str()).filter(|v| v.is_finite());

    let missing: Vec<String> = records.iter()
        .filter(|r| resolve(*r).is_none())
        .map(|r| r.poly_id.clone())
        .collect();
    if !missing.is_empty() {
        return Err(Error::MissingBiomass { ids: missing }.into());
    }

    let values: Vec<f64> = records.iter()
        .filter_map(resolve)
        .collect();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let polygons = records.into_iter()
        .zip(values)
        .map(|(record, value)| JoinedPolygon {
            poly_id: record.poly_id,
            key: record.key,
            geometry: record.geometry,
            biomass: value,
            normalized: normalize(value, min, max, norm_scale),
        })
        .collect();

    Ok(JoinedSet { plot: plot.clone(), polygons, min, max })
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    fn record(poly_id: &str) -> PlotFeature {
        PlotFeature {
            offset: 0,
            plot_id: None,
            poly_id: poly_id.to_string(),
            key: PolyKey::new(poly_id),
            geometry: MultiPolygon(vec![polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)]]),
        }
    }

    fn biomass(pairs: &[(&str, f64)]) -> BiomassIndex {
        let mut index = BiomassIndex::new();
        for (id, value) in pairs {
            index.insert(PolyKey::new(id), *value);
        }
        index
    }

    fn plot() -> PlotId { PlotId::from_f64(42.0).unwrap() }

    #[test]
    fn min_and_max_hit_the_ends_of_the_scale() {
        let set = join_and_normalize(
            &plot(),
            vec![record("A_1"), record("a_2"), record("a_3")],
            &biomass(&[("a_1", 10.0), ("a_2", 20.0), ("a_3", 15.0)]),
            60000,
        ).unwrap();
        let norms: Vec<u16> = set.polygons().iter().map(|p| p.normalized).collect();
        assert_eq!(norms, [0, 60000, 30000]);
        assert_eq!((set.min(), set.max()), (10.0, 20.0));
        assert_eq!(set.polygons()[0].poly_id, "A_1");
    }

    #[test]
    fn equal_values_normalize_to_zero() {
        let set = join_and_normalize(&plot(), vec![record("a"), record("b")], &biomass(&[("a", 5.0), ("b", 5.0)]), 60000).unwrap();
        assert!(set.polygons().iter().all(|p| p.normalized == 0));
    }

    #[test]
    fn normalization_truncates() {
        assert_eq!(normalize(1.0, 0.0, 4.0, 60000), 15000);
        assert_eq!(normalize(2.0, 0.0, 3.0, 10), 6);
        assert!(normalize(0.3, 0.1, 0.7, 60000) < u16::MAX);
    }

    #[test]
    fn every_missing_id_is_reported() {
        let err = join_and_normalize(
            &plot(),
            vec![record("a"), record("B"), record("c")],
            &biomass(&[("a", 1.0)]),
            60000,
        ).unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::MissingBiomass { ids }) => assert_eq!(ids, &["B", "c"]),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("2 polygon(s): B, c"));
    }

    #[test]
    fn non_finite_biomass_counts_as_missing() {
        let err = join_and_normalize(
            &plot(),
            vec![record("a"), record("b")],
            &biomass(&[("a", f64::NAN), ("b", 20.0)]),
            60000,
        ).unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::MissingBiomass { ids }) => assert_eq!(ids, &["a"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
