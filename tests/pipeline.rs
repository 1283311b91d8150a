use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
};

use biomass_raster::{
    create_biomass_raster, read_feature_at, render_plot, Error, IndexBuilder, IndexStore, OutputPaths,
    PipelineConfig, PlotId,
};
use serde_json::Value;
use tiff::decoder::{Decoder, DecodingResult};

const NODATA: u16 = u16::MAX;

fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> String {
    format!(r#"{{"type":"Polygon","coordinates":[[[{x0},{y0}],[{x1},{y0}],[{x1},{y1}],[{x0},{y1}],[{x0},{y0}]]]}}"#)
}

fn feature(plot: &str, poly: &str, geometry: &str) -> String {
    format!(r#"{{"type":"Feature","properties":{{"NFI_PLOT":{plot},"POLY_ID":"{poly}","LC":"forest"}},"geometry":{geometry}}}"#)
}

struct Fixture {
    dir: tempfile::TempDir,
    geojson: PathBuf,
    csv: PathBuf,
}

impl Fixture {
    fn new(features: &[String], csv: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let geojson = dir.path().join("plots.geojson");
        let csv_path = dir.path().join("attributes.csv");
        fs::write(
            &geojson,
            format!(
                "{{\"type\":\"FeatureCollection\",\"name\":\"plots\",\n\"features\":[\n{}\n]}}\n",
                features.join(",\n")
            ),
        ).unwrap();
        fs::write(&csv_path, csv).unwrap();
        Self { dir, geojson, csv: csv_path }
    }

    /// Two polygons of plot 42 plus one of another plot.
    fn plot_42() -> Self {
        Self::new(
            &[
                feature("42.0", "A_1", &square(0.0, 0.0, 100.0, 100.0)),
                feature("7", "b_1", &square(5000.0, 5000.0, 5100.0, 5100.0)),
                feature("42", "a_2", &square(200.0, 0.0, 300.0, 100.0)),
            ],
            "poly_id,biomass_total_dead,nfi_plot\na_1,10,42\nB_1,3.5,7\nA_2,20,42\n",
        )
    }

    fn config(&self) -> PipelineConfig {
        PipelineConfig { index_dir: self.dir.path().join("indexes"), ..Default::default() }
    }

    fn out_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }
}

fn plot(s: &str) -> PlotId {
    s.parse().unwrap()
}

fn read_raster(path: &Path) -> (u32, u32, Vec<u16>) {
    let mut decoder = Decoder::new(File::open(path).unwrap()).unwrap();
    let (w, h) = decoder.dimensions().unwrap();
    match decoder.read_image().unwrap() {
        DecodingResult::U16(pixels) => (w, h, pixels),
        _ => panic!("expected a u16 raster"),
    }
}

fn taxonomy(err: &anyhow::Error) -> &Error {
    err.downcast_ref::<Error>().unwrap_or_else(|| panic!("untyped error: {err:#}"))
}

#[test]
fn two_polygon_plot_renders_two_regions() {
    let fx = Fixture::plot_42();
    let config = fx.config();
    let indexes = IndexBuilder::new(&config.index_dir, &config);
    let outputs = OutputPaths::in_dir(&fx.out_dir(), &plot("42"));

    let report = render_plot(&indexes, &fx.geojson, &fx.csv, &plot("42"), &outputs).unwrap();
    assert_eq!(report.raster.polygons, 2);
    assert_eq!(report.raster.extent.grid_size, 2000.0);
    assert!(outputs.raster.ends_with("biomass_raster_NFI_42.0.tif"));

    let (w, h, pixels) = read_raster(&outputs.raster);
    assert_eq!((w, h), (200, 200));
    let mut values: Vec<u16> = pixels.clone();
    values.sort_unstable();
    values.dedup();
    assert_eq!(values, [0, 60000, NODATA]);
    assert_eq!(pixels.iter().filter(|&&v| v == 0).count(), 100);
    assert_eq!(pixels.iter().filter(|&&v| v == 60000).count(), 100);

    // A_1 spans x 0..100; the grid starts at x = -850, so its cells are columns 85..95.
    let at = |row: usize, col: usize| pixels[row * w as usize + col];
    assert_eq!(at(100, 90), 0);
    assert_eq!(at(100, 110), 60000);
    assert_eq!(at(100, 100), NODATA);

    let annotated: Value = serde_json::from_reader(File::open(&outputs.geojson).unwrap()).unwrap();
    let features = annotated["features"].as_array().unwrap();
    assert_eq!(features.len(), 2);
    assert_eq!(features[0]["properties"]["POLY_ID"], "A_1");
    assert_eq!(features[0]["properties"]["biomass"], 10.0);
    assert_eq!(features[0]["properties"]["biomass_norm"], 0);
    assert_eq!(features[1]["properties"]["biomass_norm"], 60000);
}

#[test]
fn unknown_plot_writes_nothing() {
    let fx = Fixture::plot_42();
    let out = fx.dir.path().join("out/biomass_raster_NFI_99.0.tif");
    let err = create_biomass_raster(&fx.geojson, &fx.csv, &plot("99"), &out, &fx.config()).unwrap_err();
    assert!(matches!(taxonomy(&err), Error::NotFound { plot } if plot == "99.0"));
    assert!(!fx.out_dir().exists());
}

#[test]
fn missing_biomass_lists_every_polygon_and_writes_nothing() {
    let fx = Fixture::new(
        &[
            feature("1", "p_1", &square(0.0, 0.0, 10.0, 10.0)),
            feature("1", "P_2", &square(10.0, 0.0, 20.0, 10.0)),
            feature("1", "p_3", &square(20.0, 0.0, 30.0, 10.0)),
        ],
        "poly_id,biomass_total_dead,nfi_plot\np_2,1,1\n",
    );
    let out = fx.out_dir().join("r.tif");
    let err = create_biomass_raster(&fx.geojson, &fx.csv, &plot("1"), &out, &fx.config()).unwrap_err();
    match taxonomy(&err) {
        Error::MissingBiomass { ids } => assert_eq!(ids, &["p_1", "p_3"]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!fx.out_dir().exists());
}

#[test]
fn nan_biomass_is_missing_and_writes_nothing() {
    let fx = Fixture::new(
        &[
            feature("1", "a", &square(0.0, 0.0, 10.0, 10.0)),
            feature("1", "b", &square(10.0, 0.0, 20.0, 10.0)),
        ],
        "poly_id,biomass_total_dead,nfi_plot\na,NaN,1\nb,20,1\n",
    );
    let out = fx.out_dir().join("r.tif");
    let err = create_biomass_raster(&fx.geojson, &fx.csv, &plot("1"), &out, &fx.config()).unwrap_err();
    match taxonomy(&err) {
        Error::MissingBiomass { ids } => assert_eq!(ids, &["a"]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!fx.out_dir().exists());
}

#[test]
fn index_is_complete_and_offsets_resolve() {
    let fx = Fixture::plot_42();
    let config = fx.config();
    let built = IndexBuilder::new(&config.index_dir, &config).build(&fx.geojson, &fx.csv).unwrap();

    assert_eq!(built.stats.features_indexed, 3);
    assert_eq!(built.stats.unique_plots, 2);
    assert_eq!(built.biomass.get("b_1"), Some(3.5));

    let mut reader = BufReader::new(File::open(&fx.geojson).unwrap());
    for (plot_id, entry) in built.plots.iter() {
        for (poly_id, offset) in entry.iter() {
            let raw = read_feature_at(&mut reader, offset).unwrap();
            let record: Value = serde_json::from_slice(&raw.bytes).unwrap();
            let props = &record["properties"];
            assert_eq!(props["POLY_ID"].as_str().unwrap().to_lowercase(), poly_id.as_str());
            assert_eq!(PlotId::from_json(&props["NFI_PLOT"]).as_ref(), Some(plot_id));
        }
    }
}

#[test]
fn rebuilding_unchanged_inputs_is_idempotent() {
    let fx = Fixture::plot_42();
    let config = fx.config();
    let store = IndexStore::new(&config.index_dir);

    IndexBuilder::new(&config.index_dir, &config).build(&fx.geojson, &fx.csv).unwrap();
    let plot_bytes = fs::read(store.plot_index_path()).unwrap();
    let biomass_bytes = fs::read(store.biomass_index_path()).unwrap();

    let again = IndexBuilder::new(&config.index_dir, &config).build(&fx.geojson, &fx.csv).unwrap();
    assert!(again.reused);

    let forced = IndexBuilder::new(&config.index_dir, &config).force(true).build(&fx.geojson, &fx.csv).unwrap();
    assert!(!forced.reused);
    assert_eq!(fs::read(store.plot_index_path()).unwrap(), plot_bytes);
    assert_eq!(fs::read(store.biomass_index_path()).unwrap(), biomass_bytes);
}

#[test]
fn changed_geometry_file_triggers_rebuild() {
    let fx = Fixture::plot_42();
    let config = fx.config();
    IndexBuilder::new(&config.index_dir, &config).build(&fx.geojson, &fx.csv).unwrap();

    let mut text = fs::read_to_string(&fx.geojson).unwrap();
    text = text.replace(
        "\n]}",
        &format!(",\n{}\n]}}", feature("42", "a_3", &square(400.0, 0.0, 500.0, 100.0))),
    );
    fs::write(&fx.geojson, text).unwrap();

    let rebuilt = IndexBuilder::new(&config.index_dir, &config).build(&fx.geojson, &fx.csv).unwrap();
    assert!(!rebuilt.reused);
    assert_eq!(rebuilt.plots.get(&plot("42")).unwrap().len(), 3);
}

#[test]
fn exterior_pixels_are_nodata() {
    // A triangle: all-touched paints cells along the hypotenuse whose centers lie outside.
    let triangle = r#"{"type":"Polygon","coordinates":[[[0,0],[95,0],[0,60],[0,0]]]}"#;
    let fx = Fixture::new(&[feature("5", "t", triangle)], "poly_id,biomass_total_dead,nfi_plot\nt,8,5\n");
    let out = fx.out_dir().join("t.tif");
    let report = create_biomass_raster(&fx.geojson, &fx.csv, &plot("5"), &out, &fx.config()).unwrap();

    let (w, _, pixels) = read_raster(&out);
    let e = report.raster.extent;
    let size = e.grid_size / w as f64;
    for (i, v) in pixels.iter().enumerate() {
        let (row, col) = (i / w as usize, i % w as usize);
        let x = e.left + (col as f64 + 0.5) * size;
        let y = e.top - (row as f64 + 0.5) * size;
        let inside = x >= 0.0 && y >= 0.0 && 60.0 * x + 95.0 * y <= 5700.0;
        assert_eq!(*v != NODATA, inside, "pixel ({row}, {col}) at ({x}, {y})");
    }
    assert!(report.raster.painted_pixels > 0);
}

#[test]
fn extent_is_a_centered_multiple_of_the_grid_step() {
    let fx = Fixture::new(
        &[feature("3", "wide", &square(1000.0, 1000.0, 3500.0, 1300.0))],
        "poly_id,biomass_total_dead,nfi_plot\nwide,1,3\n",
    );
    let out = fx.out_dir().join("w.tif");
    let report = create_biomass_raster(&fx.geojson, &fx.csv, &plot("3"), &out, &fx.config()).unwrap();

    let e = report.raster.extent;
    assert_eq!(e.grid_size, 4000.0);
    assert_eq!(e.pixels, 400);
    assert_eq!(1000.0 - e.left, e.right - 3500.0);
    assert_eq!(1000.0 - e.bottom, e.top - 1300.0);
    assert_eq!(e.right - e.left, 4000.0);
    assert_eq!(read_raster(&out).0, 400);
}

#[test]
fn annotated_geojson_survives_a_failed_raster_write() {
    let fx = Fixture::plot_42();
    // The raster path is an existing directory, so publishing it fails.
    let out = fx.out_dir().join("blocked.tif");
    fs::create_dir_all(&out).unwrap();
    let err = create_biomass_raster(&fx.geojson, &fx.csv, &plot("42"), &out, &fx.config());
    assert!(err.is_err());
    assert!(fx.out_dir().join("biomass_data_NFI_42.0.geojson").is_file());
}
