//! GeoJSON to cell id conversion
//!
//! The sphere is projected onto a lng/lat grid and split as a quadtree.
//! A cell id interleaves the cell's x/y bits (Morton order), appends a
//! sentinel `1` bit and pads with zeros, so every leaf id below a cell lies
//! in a contiguous range around the cell's own id.
//!
//! Supported geometry: `Point`, `Polygon`, `AeroCircle` and
//! `GeometryCollection` of those. A document must resolve to exactly one
//! point or to one or more regions.

use serde_json::Value as Json;

use super::errors::{SindexError, SindexResult};

/// Finest quadtree level
pub const MAX_CELL_LEVEL: u32 = 30;

/// Upper bound on the cells covering one region
pub const MAX_REGION_CELLS: usize = 32;

const EARTH_RADIUS_M: f64 = 6_371_000.0;
const GRID: u64 = 1 << MAX_CELL_LEVEL;

/// Cells produced by one GeoJSON document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoCells {
    Point(u64),
    Region(Vec<u64>),
}

impl GeoCells {
    pub fn cells(&self) -> &[u64] {
        match self {
            GeoCells::Point(cell) => std::slice::from_ref(cell),
            GeoCells::Region(cells) => cells,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BoundingBox {
    min_lng: f64,
    min_lat: f64,
    max_lng: f64,
    max_lat: f64,
}

impl BoundingBox {
    fn around(lng: f64, lat: f64) -> Self {
        Self {
            min_lng: lng,
            min_lat: lat,
            max_lng: lng,
            max_lat: lat,
        }
    }

    fn extend(&mut self, lng: f64, lat: f64) {
        self.min_lng = self.min_lng.min(lng);
        self.min_lat = self.min_lat.min(lat);
        self.max_lng = self.max_lng.max(lng);
        self.max_lat = self.max_lat.max(lat);
    }

    fn union(&mut self, other: &BoundingBox) {
        self.extend(other.min_lng, other.min_lat);
        self.extend(other.max_lng, other.max_lat);
    }
}

#[derive(Default)]
struct Shapes {
    points: Vec<(f64, f64)>,
    regions: Vec<BoundingBox>,
}

/// Parse a GeoJSON document into cell ids.
pub fn parse_geojson(doc: &str) -> SindexResult<GeoCells> {
    let json: Json = serde_json::from_str(doc)
        .map_err(|e| SindexError::invalid(format!("invalid GeoJSON: {}", e)))?;

    let mut shapes = Shapes::default();
    collect_shapes(&json, &mut shapes)?;

    match (shapes.points.len(), shapes.regions.len()) {
        (1, 0) => {
            let (lng, lat) = shapes.points[0];
            Ok(GeoCells::Point(point_cell(lng, lat)))
        }
        (0, n) if n > 0 => {
            let mut bounds = shapes.regions[0];
            for region in &shapes.regions[1..] {
                bounds.union(region);
            }
            Ok(GeoCells::Region(cover(&bounds)))
        }
        (0, 0) => Err(SindexError::invalid("GeoJSON holds neither a point nor a region")),
        _ => Err(SindexError::invalid(
            "GeoJSON must hold exactly one point or only regions",
        )),
    }
}

fn collect_shapes(json: &Json, out: &mut Shapes) -> SindexResult<()> {
    let kind = json
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| SindexError::invalid("GeoJSON object has no type"))?;

    match kind {
        "Point" => {
            out.points.push(coordinate(json.get("coordinates"))?);
        }
        "Polygon" => {
            let outer = json
                .get("coordinates")
                .and_then(Json::as_array)
                .and_then(|rings| rings.first())
                .and_then(Json::as_array)
                .ok_or_else(|| SindexError::invalid("Polygon has no outer ring"))?;
            if outer.len() < 4 {
                return Err(SindexError::invalid("Polygon ring needs at least 4 positions"));
            }
            let (lng, lat) = coordinate(outer.first())?;
            let mut bounds = BoundingBox::around(lng, lat);
            for pos in &outer[1..] {
                let (lng, lat) = coordinate(Some(pos))?;
                bounds.extend(lng, lat);
            }
            out.regions.push(bounds);
        }
        "AeroCircle" => {
            let parts = json
                .get("coordinates")
                .and_then(Json::as_array)
                .filter(|parts| parts.len() == 2)
                .ok_or_else(|| SindexError::invalid("AeroCircle needs [center, radius]"))?;
            let (lng, lat) = coordinate(parts.first())?;
            let radius = parts[1]
                .as_f64()
                .filter(|r| r.is_finite() && *r >= 0.0)
                .ok_or_else(|| SindexError::invalid("AeroCircle radius must be non-negative"))?;
            out.regions.push(circle_bounds(lng, lat, radius));
        }
        "GeometryCollection" => {
            let geometries = json
                .get("geometries")
                .and_then(Json::as_array)
                .ok_or_else(|| SindexError::invalid("GeometryCollection has no geometries"))?;
            for geometry in geometries {
                collect_shapes(geometry, out)?;
            }
        }
        other => {
            return Err(SindexError::invalid(format!(
                "unsupported GeoJSON type '{}'",
                other
            )))
        }
    }
    Ok(())
}

fn coordinate(pos: Option<&Json>) -> SindexResult<(f64, f64)> {
    let pair = pos
        .and_then(Json::as_array)
        .filter(|pair| pair.len() >= 2)
        .ok_or_else(|| SindexError::invalid("position must be [lng, lat]"))?;
    let lng = pair[0].as_f64();
    let lat = pair[1].as_f64();
    match (lng, lat) {
        (Some(lng), Some(lat))
            if (-180.0..=180.0).contains(&lng) && (-90.0..=90.0).contains(&lat) =>
        {
            Ok((lng, lat))
        }
        _ => Err(SindexError::invalid("position out of range")),
    }
}

fn circle_bounds(lng: f64, lat: f64, radius_m: f64) -> BoundingBox {
    let dlat = (radius_m / EARTH_RADIUS_M).to_degrees();
    let cos_lat = lat.to_radians().cos().max(1e-9);
    let dlng = dlat / cos_lat;

    let min_lat = (lat - dlat).max(-90.0);
    let max_lat = (lat + dlat).min(90.0);
    let (min_lng, max_lng) = if dlng >= 180.0 || min_lat <= -90.0 || max_lat >= 90.0 {
        (-180.0, 180.0)
    } else {
        ((lng - dlng).max(-180.0), (lng + dlng).min(180.0))
    };

    BoundingBox {
        min_lng,
        min_lat,
        max_lng,
        max_lat,
    }
}

fn grid_xy(lng: f64, lat: f64) -> (u64, u64) {
    let scale = |unit: f64| ((unit * GRID as f64) as u64).min(GRID - 1);
    (
        scale((lng + 180.0) / 360.0),
        scale((lat + 90.0) / 180.0),
    )
}

fn spread_bits(mut v: u64) -> u64 {
    v &= 0x3fff_ffff;
    v = (v | (v << 16)) & 0x0000_ffff_0000_ffff;
    v = (v | (v << 8)) & 0x00ff_00ff_00ff_00ff;
    v = (v | (v << 4)) & 0x0f0f_0f0f_0f0f_0f0f;
    v = (v | (v << 2)) & 0x3333_3333_3333_3333;
    v = (v | (v << 1)) & 0x5555_5555_5555_5555;
    v
}

/// Cell id for grid coordinates already shifted down to `level`.
fn cell_id(x: u64, y: u64, level: u32) -> u64 {
    let morton = spread_bits(x) | (spread_bits(y) << 1);
    ((morton << 1) | 1) << (2 * (MAX_CELL_LEVEL - level))
}

/// Leaf cell containing a point.
pub fn point_cell(lng: f64, lat: f64) -> u64 {
    let (x, y) = grid_xy(lng, lat);
    cell_id(x, y, MAX_CELL_LEVEL)
}

/// Quadtree level of a cell id.
pub fn cell_level(cell: u64) -> u32 {
    MAX_CELL_LEVEL - cell.trailing_zeros() / 2
}

/// Inclusive range of leaf ids under a cell.
pub fn cell_range(cell: u64) -> (u64, u64) {
    let lsb = cell & cell.wrapping_neg();
    (cell - (lsb - 1), cell + (lsb - 1))
}

pub fn cell_contains(cell: u64, other: u64) -> bool {
    let (lo, hi) = cell_range(cell);
    lo <= other && other <= hi
}

/// Cover a bounding box with the finest cells that fit the cell budget.
fn cover(bounds: &BoundingBox) -> Vec<u64> {
    let (x0, y0) = grid_xy(bounds.min_lng, bounds.min_lat);
    let (x1, y1) = grid_xy(bounds.max_lng, bounds.max_lat);

    for level in (0..=MAX_CELL_LEVEL).rev() {
        let shift = MAX_CELL_LEVEL - level;
        let (cx0, cx1, cy0, cy1) = (x0 >> shift, x1 >> shift, y0 >> shift, y1 >> shift);
        let count = (cx1 - cx0 + 1).saturating_mul(cy1 - cy0 + 1);
        if count > MAX_REGION_CELLS as u64 {
            continue;
        }
        let mut cells = Vec::with_capacity(count as usize);
        for cy in cy0..=cy1 {
            for cx in cx0..=cx1 {
                cells.push(cell_id(cx, cy, level));
            }
        }
        cells.sort_unstable();
        return cells;
    }

    // Level 0 always fits in a single cell.
    vec![cell_id(0, 0, 0)]
}
