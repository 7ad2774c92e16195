//! Boundary features and their geometry.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

/// Areal geometry of a boundary feature.
///
/// Coordinates are (longitude, latitude) pairs. The first ring of each
/// polygon is the exterior, the rest are holes.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl Geometry {
    /// Member polygons; a single polygon yields itself
    pub fn polygons(&self) -> &[Polygon<f64>] {
        match self {
            Geometry::Polygon(polygon) => std::slice::from_ref(polygon),
            Geometry::MultiPolygon(multi) => &multi.0,
        }
    }
}

/// A boundary feature: identifier plus areal geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: String,
    pub geometry: Geometry,
}

impl Feature {
    pub fn new(id: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            id: id.into(),
            geometry,
        }
    }
}

type RingCoords = Vec<[f64; 2]>;

/// Serialized form of a [`Geometry`], nested like GeoJSON coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "geometryType", content = "coordinates")]
pub enum GeometryRecord {
    Polygon(Vec<RingCoords>),
    MultiPolygon(Vec<Vec<RingCoords>>),
}

fn ring_record(ring: &LineString<f64>) -> RingCoords {
    ring.coords().map(|c| [c.x, c.y]).collect()
}

fn polygon_record(polygon: &Polygon<f64>) -> Vec<RingCoords> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(ring_record)
        .collect()
}

fn polygon_from_record(rings: Vec<RingCoords>) -> Polygon<f64> {
    let mut rings = rings.into_iter().map(|ring| {
        LineString::new(ring.into_iter().map(|[x, y]| Coord { x, y }).collect())
    });
    let exterior = rings.next().unwrap_or_else(|| LineString::new(Vec::new()));
    Polygon::new(exterior, rings.collect())
}

impl From<&Geometry> for GeometryRecord {
    fn from(geometry: &Geometry) -> Self {
        match geometry {
            Geometry::Polygon(polygon) => GeometryRecord::Polygon(polygon_record(polygon)),
            Geometry::MultiPolygon(multi) => {
                GeometryRecord::MultiPolygon(multi.iter().map(polygon_record).collect())
            }
        }
    }
}

impl From<GeometryRecord> for Geometry {
    fn from(record: GeometryRecord) -> Self {
        match record {
            GeometryRecord::Polygon(rings) => Geometry::Polygon(polygon_from_record(rings)),
            GeometryRecord::MultiPolygon(polygons) => Geometry::MultiPolygon(MultiPolygon::new(
                polygons.into_iter().map(polygon_from_record).collect(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_with_hole() -> Geometry {
        let record = GeometryRecord::Polygon(vec![
            vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0]],
            vec![[1.0, 1.0], [2.0, 1.0], [2.0, 2.0], [1.0, 2.0], [1.0, 1.0]],
        ]);
        Geometry::from(record)
    }

    #[test]
    fn test_record_keeps_ring_order() {
        let geometry = square_with_hole();
        let Geometry::Polygon(polygon) = &geometry else {
            panic!("expected polygon");
        };
        assert_eq!(polygon.exterior().0.len(), 5);
        assert_eq!(polygon.interiors().len(), 1);
        let expected = GeometryRecord::Polygon(vec![
            vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0]],
            vec![[1.0, 1.0], [2.0, 1.0], [2.0, 2.0], [1.0, 2.0], [1.0, 1.0]],
        ]);
        assert_eq!(GeometryRecord::from(&geometry), expected);
    }

    #[test]
    fn test_record_serializes_with_type_tag() {
        let record = GeometryRecord::from(&square_with_hole());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["geometryType"], "Polygon");
        assert_eq!(json["coordinates"][1][0], serde_json::json!([1.0, 1.0]));
    }

    #[test]
    fn test_unclosed_record_ring_is_closed() {
        let geometry = Geometry::from(GeometryRecord::Polygon(vec![vec![
            [0.0, 0.0],
            [1.0, 0.0],
            [1.0, 1.0],
        ]]));
        let Geometry::Polygon(polygon) = geometry else {
            panic!("expected polygon");
        };
        assert_eq!(polygon.exterior().0.len(), 4);
        assert!(polygon.exterior().is_closed());
    }

    #[test]
    fn test_polygons_view() {
        let single = square_with_hole();
        assert_eq!(single.polygons().len(), 1);

        let multi = Geometry::from(GeometryRecord::MultiPolygon(vec![
            vec![vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]],
            vec![vec![[5.0, 5.0], [6.0, 5.0], [6.0, 6.0], [5.0, 5.0]]],
        ]));
        assert_eq!(multi.polygons().len(), 2);
    }
}
