//! Boundary feature extraction from GeoJSON datasets.
//!
//! Only the document shape is strict: it must be JSON with a `features`
//! array. Individual features are read leniently so that one bad record
//! reduces coverage instead of failing the whole build.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::BuildError;
use crate::models::Geometry;

/// Geometry of a dataset feature as found in the source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceGeometry {
    Supported(Geometry),
    /// Geometry of a type the index does not handle (e.g. `Point`)
    Unsupported(String),
    Missing,
}

/// A feature read from the dataset, before indexing
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFeature {
    pub id: String,
    pub geometry: SourceGeometry,
}

/// Read a GeoJSON dataset from disk; `.gz` files are decompressed.
pub fn read_features_from_path(path: &Path) -> Result<Vec<SourceFeature>, BuildError> {
    info!("Reading boundary dataset from {}", path.display());

    let file = File::open(path).map_err(|source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader: Box<dyn Read> = if path.extension().is_some_and(|e| e == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    read_features(BufReader::new(reader))
}

/// Read every feature of a GeoJSON `FeatureCollection`.
pub fn read_features<R: Read>(reader: R) -> Result<Vec<SourceFeature>, BuildError> {
    let document: Value =
        serde_json::from_reader(reader).map_err(|source| BuildError::Parse { source })?;

    if let Some(kind) = document.get("type").and_then(Value::as_str) {
        if kind != "FeatureCollection" {
            return Err(BuildError::NotFeatureCollection(format!(
                "document type is {kind:?}"
            )));
        }
    }

    let features = match document.get("features") {
        Some(Value::Array(features)) => features,
        Some(_) => {
            return Err(BuildError::NotFeatureCollection(
                "\"features\" is not an array".to_string(),
            ))
        }
        None => {
            return Err(BuildError::NotFeatureCollection(
                "missing \"features\" member".to_string(),
            ))
        }
    };

    let parsed: Vec<SourceFeature> = features
        .iter()
        .enumerate()
        .map(|(position, feature)| parse_feature(position, feature))
        .collect();

    info!("Read {} features from dataset", parsed.len());
    Ok(parsed)
}

fn feature_id(position: usize, feature: &Value) -> String {
    match feature.get("id") {
        Some(Value::String(id)) => return id.clone(),
        Some(Value::Number(id)) => return id.to_string(),
        _ => {}
    }
    feature
        .get("properties")
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("feature-{position}"))
}

fn parse_feature(position: usize, feature: &Value) -> SourceFeature {
    let id = feature_id(position, feature);
    let geometry = match feature.get("geometry") {
        None | Some(Value::Null) => SourceGeometry::Missing,
        Some(geometry) => parse_geometry(&id, geometry),
    };
    SourceFeature { id, geometry }
}

fn parse_geometry(id: &str, geometry: &Value) -> SourceGeometry {
    let coordinates = geometry.get("coordinates");
    match geometry.get("type").and_then(Value::as_str) {
        Some("Polygon") => SourceGeometry::Supported(Geometry::Polygon(parse_polygon(
            id,
            coordinates,
        ))),
        Some("MultiPolygon") => {
            let polygons: Vec<Polygon<f64>> = coordinates
                .and_then(Value::as_array)
                .map(|polygons| polygons.iter().map(|p| parse_polygon(id, Some(p))).collect())
                .unwrap_or_default();
            SourceGeometry::Supported(Geometry::MultiPolygon(MultiPolygon::new(polygons)))
        }
        Some(other) => SourceGeometry::Unsupported(other.to_string()),
        None => SourceGeometry::Unsupported("<untyped>".to_string()),
    }
}

fn parse_polygon(id: &str, rings: Option<&Value>) -> Polygon<f64> {
    let mut rings = rings
        .and_then(Value::as_array)
        .map(|rings| rings.iter().map(|r| parse_ring(id, r)).collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter();
    let exterior = rings.next().unwrap_or_else(|| LineString::new(Vec::new()));
    // Polygon::new closes any open ring
    Polygon::new(exterior, rings.collect())
}

/// A ring with any unreadable position is dropped to an empty ring.
fn parse_ring(id: &str, ring: &Value) -> LineString<f64> {
    let coords = ring
        .as_array()
        .and_then(|positions| positions.iter().map(parse_position).collect::<Option<Vec<_>>>());
    match coords {
        Some(coords) => LineString::new(coords),
        None => {
            debug!("Feature {} has an unreadable ring", id);
            LineString::new(Vec::new())
        }
    }
}

fn parse_position(position: &Value) -> Option<Coord<f64>> {
    let position = position.as_array()?;
    let x = position.first()?.as_f64()?;
    let y = position.get(1)?.as_f64()?;
    Some(Coord { x, y })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn read(document: Value) -> Vec<SourceFeature> {
        read_features(document.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_reads_polygon_and_multipolygon() {
        let features = read(json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "id": "sea", "properties": {},
                 "geometry": {"type": "Polygon",
                              "coordinates": [[[0, 0], [2, 0], [2, 2], [0, 2], [0, 0]]]}},
                {"type": "Feature", "id": 7, "properties": {},
                 "geometry": {"type": "MultiPolygon",
                              "coordinates": [[[[0, 0], [1, 0], [1, 1], [0, 0]]],
                                              [[[5, 5], [6, 5], [6, 6], [5, 5]]]]}}
            ]
        }));

        assert_eq!(features.len(), 2);
        assert_eq!(features[0].id, "sea");
        assert!(matches!(
            features[0].geometry,
            SourceGeometry::Supported(Geometry::Polygon(_))
        ));
        assert_eq!(features[1].id, "7");
        let SourceGeometry::Supported(geometry) = &features[1].geometry else {
            panic!("expected multipolygon");
        };
        assert_eq!(geometry.polygons().len(), 2);
    }

    #[test]
    fn test_ids_fall_back_to_name_then_position() {
        let features = read(json!({
            "features": [
                {"properties": {"name": "Bothnian Bay"}, "geometry": null},
                {"properties": {}, "geometry": null}
            ]
        }));
        assert_eq!(features[0].id, "Bothnian Bay");
        assert_eq!(features[1].id, "feature-1");
    }

    #[test]
    fn test_missing_and_unsupported_geometry() {
        let features = read(json!({
            "type": "FeatureCollection",
            "features": [
                {"id": "a", "geometry": null},
                {"id": "b"},
                {"id": "c", "geometry": {"type": "Point", "coordinates": [10.0, 54.0]}},
                {"id": "d", "geometry": {"coordinates": []}}
            ]
        }));
        assert_eq!(features[0].geometry, SourceGeometry::Missing);
        assert_eq!(features[1].geometry, SourceGeometry::Missing);
        assert_eq!(
            features[2].geometry,
            SourceGeometry::Unsupported("Point".to_string())
        );
        assert_eq!(
            features[3].geometry,
            SourceGeometry::Unsupported("<untyped>".to_string())
        );
    }

    #[test]
    fn test_malformed_ring_becomes_empty() {
        let features = read(json!({
            "features": [
                {"id": "bad", "geometry": {"type": "Polygon",
                 "coordinates": [[[0, 0], ["x", 1], [1, 1], [0, 0]],
                                 [[0.2, 0.2], [0.4, 0.2], [0.4, 0.4], [0.2, 0.2]]]}}
            ]
        }));
        let SourceGeometry::Supported(Geometry::Polygon(polygon)) = &features[0].geometry else {
            panic!("expected polygon");
        };
        assert!(polygon.exterior().0.is_empty());
        assert_eq!(polygon.interiors().len(), 1);
    }

    #[test]
    fn test_open_ring_is_closed() {
        let features = read(json!({
            "features": [
                {"id": "open", "geometry": {"type": "Polygon",
                 "coordinates": [[[0, 0], [1, 0], [1, 1]]]}}
            ]
        }));
        let SourceGeometry::Supported(Geometry::Polygon(polygon)) = &features[0].geometry else {
            panic!("expected polygon");
        };
        assert!(polygon.exterior().is_closed());
        assert_eq!(polygon.exterior().0.len(), 4);
    }

    #[test]
    fn test_unparsable_dataset_is_fatal() {
        assert!(matches!(
            read_features("{\"features\": [".as_bytes()),
            Err(BuildError::Parse { .. })
        ));
        assert!(matches!(
            read_features("{\"type\": \"Feature\"}".as_bytes()),
            Err(BuildError::NotFeatureCollection(_))
        ));
        assert!(matches!(
            read_features("{\"features\": {}}".as_bytes()),
            Err(BuildError::NotFeatureCollection(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = read_features_from_path(Path::new("/nonexistent/baltic.geojson")).unwrap_err();
        assert!(matches!(err, BuildError::Io { .. }));
    }
}
