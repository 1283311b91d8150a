use anyhow::Result;
use geo::{BoundingRect, Coord, Intersects, LineString, MultiPolygon, Point, Polygon, Rect};
use ndarray::Array2;

use crate::{config::OverlapPolicy, raster::GeoTransform};

/// Fraction of a cell the test square is shrunk by, so cells that only
/// share an edge or a corner with a polygon are not counted as touched.
const EDGE_EPSILON: f64 = 1e-9;

/// Paint `value` into every cell of `grid` whose interior intersects
/// `shape` ("all touched"), resolving overlap with `policy`.
pub(crate) fn burn_all_touched(
    grid: &mut Array2<u16>,
    transform: &GeoTransform,
    shape: &MultiPolygon<f64>,
    value: u16,
    nodata: u16,
    policy: OverlapPolicy,
) -> Result<usize> {
    let inverse = transform.inverse()?;
    let (rows, cols) = grid.dim();
    let mut painted = 0;

    for polygon in &shape.0 {
        let Some(bbox) = polygon.bounding_rect() else { continue };
        let Some((col_range, row_range)) = cell_window(&inverse, bbox, cols, rows) else { continue };

        for row in row_range {
            for col in col_range.clone() {
                if !polygon.intersects(&cell_polygon(transform, col, row)) { continue }
                let cell = &mut grid[[row, col]];
                let paint = match policy {
                    OverlapPolicy::LastWins => true,
                    OverlapPolicy::MaxWins => *cell == nodata || value > *cell,
                };
                if paint {
                    *cell = value;
                    painted += 1;
                }
            }
        }
    }
    Ok(painted)
}

/// Cells whose footprint may overlap `bbox`, clamped to the grid.
fn cell_window(
    inverse: &GeoTransform,
    bbox: Rect<f64>,
    cols: usize,
    rows: usize,
) -> Option<(std::ops::Range<usize>, std::ops::Range<usize>)> {
    let (min, max) = (bbox.min(), bbox.max());
    let corners = [
        inverse.apply(min.x, min.y),
        inverse.apply(min.x, max.y),
        inverse.apply(max.x, min.y),
        inverse.apply(max.x, max.y),
    ];
    let (mut c0, mut c1, mut r0, mut r1) = (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
    for Coord { x, y } in corners {
        c0 = c0.min(x);
        c1 = c1.max(x);
        r0 = r0.min(y);
        r1 = r1.max(y);
    }

    let clamp = |lo: f64, hi: f64, n: usize| -> Option<std::ops::Range<usize>> {
        let start = lo.floor().max(0.0);
        let end = (hi.floor() + 1.0).min(n as f64);
        (start < end).then(|| start as usize..end as usize)
    };
    Some((clamp(c0, c1, cols)?, clamp(r0, r1, rows)?))
}

/// Footprint of cell (`col`, `row`), shrunk slightly toward its center.
fn cell_polygon(transform: &GeoTransform, col: usize, row: usize) -> Polygon<f64> {
    let (c, r) = (col as f64, row as f64);
    let lo = EDGE_EPSILON;
    let hi = 1.0 - EDGE_EPSILON;
    let ring = [(lo, lo), (hi, lo), (hi, hi), (lo, hi), (lo, lo)]
        .into_iter()
        .map(|(dc, dr)| transform.apply(c + dc, r + dr))
        .collect::<Vec<_>>();
    Polygon::new(LineString(ring), vec![])
}

/// Set every painted cell whose center lies outside `union` to `nodata`.
/// Centers on the boundary count as inside. Returns the number of cells cleared.
pub(crate) fn mask_exterior(
    grid: &mut Array2<u16>,
    transform: &GeoTransform,
    union: &MultiPolygon<f64>,
    nodata: u16,
) -> usize {
    let mut cleared = 0;
    for ((row, col), cell) in grid.indexed_iter_mut() {
        if *cell == nodata { continue }
        let center = Point::from(transform.cell_center(col, row));
        if !union.intersects(&center) {
            *cell = nodata;
            cleared += 1;
        }
    }
    cleared
}

/// Nearest-neighbour resample of `src` (georeferenced by `src_transform`)
/// onto a `rows x cols` grid georeferenced by `dst_transform`.
/// Destination cells whose center falls outside `src` become `nodata`.
pub fn resample_nearest(
    src: &Array2<u16>,
    src_transform: &GeoTransform,
    dst_transform: &GeoTransform,
    (rows, cols): (usize, usize),
    nodata: u16,
) -> Result<Array2<u16>> {
    let inverse = src_transform.inverse()?;
    let (src_rows, src_cols) = src.dim();

    Ok(Array2::from_shape_fn((rows, cols), |(row, col)| {
        let p = dst_transform.cell_center(col, row);
        let q = inverse.apply(p.x, p.y);
        let (c, r) = (q.x.floor(), q.y.floor());
        if c < 0.0 || r < 0.0 || c >= src_cols as f64 || r >= src_rows as f64 {
            nodata
        } else {
            src[[r as usize, c as usize]]
        }
    }))
}
