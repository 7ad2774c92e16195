//! Geometry utilities shared by the index builder and the query engine.
//!
//! Point-in-ring uses the even-odd (crossing number) rule with a half-open
//! edge convention: a point exactly on a left or bottom edge counts as
//! inside, a point on a right or top edge as outside. Two polygons sharing
//! an edge therefore never both claim a point lying on it.

use geo::{LineString, Polygon};

use crate::error::{ContainmentError, GeometryError};
use crate::models::{BoundingBox, Geometry};

/// A closed ring needs three distinct corners plus the repeated first one
pub const MIN_RING_POSITIONS: usize = 4;

/// Reject coordinates that are non-finite or outside WGS84 degree ranges.
pub fn validate_coordinate(longitude: f64, latitude: f64) -> Result<(), ContainmentError> {
    let reject = |reason| ContainmentError::InvalidCoordinate {
        longitude,
        latitude,
        reason,
    };

    if !longitude.is_finite() {
        return Err(reject("longitude is not a finite number"));
    }
    if !latitude.is_finite() {
        return Err(reject("latitude is not a finite number"));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(reject("longitude must be within [-180, 180]"));
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(reject("latitude must be within [-90, 90]"));
    }
    Ok(())
}

/// Check that a ring is closed, long enough and made of finite coordinates.
pub fn validate_ring(ring: &LineString<f64>) -> Result<(), GeometryError> {
    let len = ring.0.len();
    if len == 0 {
        return Err(GeometryError::EmptyRing);
    }
    if len < MIN_RING_POSITIONS {
        return Err(GeometryError::TooFewPositions(len));
    }
    if ring.coords().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(GeometryError::NonFinite);
    }
    if !ring.is_closed() {
        return Err(GeometryError::UnclosedRing);
    }
    Ok(())
}

/// Validate every ring of every polygon in the geometry.
pub fn validate_geometry(geometry: &Geometry) -> Result<(), GeometryError> {
    let polygons = geometry.polygons();
    if polygons.is_empty() {
        return Err(GeometryError::EmptyMultiPolygon);
    }
    for polygon in polygons {
        validate_ring(polygon.exterior())?;
        for hole in polygon.interiors() {
            validate_ring(hole)?;
        }
    }
    Ok(())
}

fn ring_bounds(ring: &LineString<f64>) -> Result<BoundingBox, GeometryError> {
    validate_ring(ring)?;
    let mut coords = ring.coords();
    // validate_ring guarantees at least one coordinate
    let first = coords.next().ok_or(GeometryError::EmptyRing)?;
    let init = BoundingBox::from_point(first.x, first.y);
    Ok(coords.fold(init, |b, c| b.union(&BoundingBox::from_point(c.x, c.y))))
}

/// Bounding box of the exterior ring(s).
///
/// Holes never extend the box. For a multipolygon the result is the union
/// of every member's exterior box; any degenerate exterior makes the whole
/// geometry degenerate.
pub fn compute_bounding_box(geometry: &Geometry) -> Result<BoundingBox, GeometryError> {
    let polygons = geometry.polygons();
    if polygons.is_empty() {
        return Err(GeometryError::EmptyMultiPolygon);
    }
    let boxes = polygons
        .iter()
        .map(|p| ring_bounds(p.exterior()))
        .collect::<Result<Vec<_>, _>>()?;
    BoundingBox::union_all(&boxes).ok_or(GeometryError::EmptyMultiPolygon)
}

/// Even-odd test of a point against a closed ring.
pub fn ring_contains(ring: &LineString<f64>, x: f64, y: f64) -> bool {
    let mut inside = false;
    for line in ring.lines() {
        let (a, b) = (line.start, line.end);
        if (a.y > y) != (b.y > y) {
            let cross_x = a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y);
            if x < cross_x {
                inside = !inside;
            }
        }
    }
    inside
}

/// Inside the exterior and outside every hole
pub fn polygon_contains(polygon: &Polygon<f64>, x: f64, y: f64) -> bool {
    ring_contains(polygon.exterior(), x, y)
        && !polygon.interiors().iter().any(|hole| ring_contains(hole, x, y))
}

/// Contained by any member polygon
pub fn geometry_contains(geometry: &Geometry, x: f64, y: f64) -> bool {
    geometry
        .polygons()
        .iter()
        .any(|polygon| polygon_contains(polygon, x, y))
}
