//! Polygon helpers shared by annotations, tissue masks and coverage.

use geo::{
    Area, BooleanOps, Coord, CoordinatePosition, LineString, MultiPolygon, Polygon, Validation,
};
use geo::coordinate_position::CoordPos;

use crate::error::ConfigError;

/// Build a region from a closed ring of vertices.
///
/// Self-intersecting or otherwise invalid rings are repaired by a boolean
/// union with the empty set, which resolves crossings into simple parts.
pub(crate) fn build_region(vertices: Vec<Coord<f64>>) -> MultiPolygon<f64> {
    let polygon = Polygon::new(LineString::from(vertices), Vec::new());
    if polygon.is_valid() {
        return MultiPolygon::new(vec![polygon]);
    }
    // Union with the empty set splits self-intersections into simple parts
    // and keeps every lobe, unlike a zero-width buffer which may drop some.
    MultiPolygon::new(vec![polygon]).union(&MultiPolygon::new(Vec::new()))
}

/// The axis-aligned tile footprint spanned by its corner points.
pub(crate) fn tile_polygon(corners: &[Coord<f64>; 4]) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![Polygon::new(
        LineString::from(corners.to_vec()),
        Vec::new(),
    )])
}

/// Fraction of `tile` covered by `region`, in `[0, 1]`.
pub(crate) fn overlap_ratio(tile: &MultiPolygon<f64>, region: &MultiPolygon<f64>) -> f64 {
    let tile_area = tile.unsigned_area();
    if tile_area == 0.0 {
        return 0.0;
    }
    tile.intersection(region).unsigned_area() / tile_area
}

/// Whether every corner lies inside `region` or on its boundary.
pub(crate) fn contains_all(region: &MultiPolygon<f64>, corners: &[Coord<f64>; 4]) -> bool {
    corners
        .iter()
        .all(|corner| region.coordinate_position(corner) != CoordPos::Outside)
}

/// Union many regions, merging pairwise to keep intermediate shapes small.
pub(crate) fn union_all(mut parts: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    while parts.len() > 1 {
        parts = parts
            .chunks(2)
            .map(|pair| {
                pair[1..]
                    .iter()
                    .fold(pair[0].clone(), |merged, next| merged.union(next))
            })
            .collect();
    }
    parts.pop().unwrap_or_else(|| MultiPolygon::new(Vec::new()))
}

/// Reject thresholds outside `[0, 1]`.
pub(crate) fn validate_threshold(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::ThresholdOutOfRange { name, value })
    }
}
