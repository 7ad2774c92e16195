//! Cross-validation against independent containment implementations.
//!
//! A database-backed service answering the same question can be wrapped in
//! [`ContainmentOracle`] and compared with the engine via [`cross_check`].

use geo::{Contains, Point};
use tracing::warn;

use super::index::SpatialTree;
use super::service::ContainmentEngine;
use crate::error::OracleError;
use crate::models::{Feature, Geometry};

/// Anything that can answer "is this point inside the sea polygons"
pub trait ContainmentOracle {
    fn contains(&self, longitude: f64, latitude: f64) -> Result<bool, OracleError>;
}

impl ContainmentOracle for ContainmentEngine {
    fn contains(&self, longitude: f64, latitude: f64) -> Result<bool, OracleError> {
        self.check_containment(longitude, latitude)
            .map(|c| c.in_polygon)
            .map_err(|e| OracleError(e.to_string()))
    }
}

/// Brute-force reference implementation backed by `geo`.
///
/// `geo` treats boundary points as outside, so answers may differ from the
/// engine for points lying exactly on an edge.
pub struct GeoOracle {
    features: Vec<Feature>,
}

impl GeoOracle {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    /// Oracle over the well-formed items of a tree
    pub fn from_tree(tree: &SpatialTree) -> Self {
        let features = tree
            .items()
            .filter(|item| item.defect().is_none())
            .map(|item| Feature::new(item.feature_id(), item.geometry().clone()))
            .collect();
        Self::new(features)
    }
}

impl ContainmentOracle for GeoOracle {
    fn contains(&self, longitude: f64, latitude: f64) -> Result<bool, OracleError> {
        let point = Point::new(longitude, latitude);
        Ok(self.features.iter().any(|f| match &f.geometry {
            Geometry::Polygon(polygon) => polygon.contains(&point),
            Geometry::MultiPolygon(multi) => multi.contains(&point),
        }))
    }
}

/// A point on which two implementations disagree.
///
/// `None` marks an implementation that returned an error.
#[derive(Debug, Clone, PartialEq)]
pub struct Disagreement {
    pub longitude: f64,
    pub latitude: f64,
    pub subject: Option<bool>,
    pub oracle: Option<bool>,
}

/// Compare `subject` with `oracle` on every point.
pub fn cross_check<S, O>(subject: &S, oracle: &O, points: &[(f64, f64)]) -> Vec<Disagreement>
where
    S: ContainmentOracle + ?Sized,
    O: ContainmentOracle + ?Sized,
{
    let answer = |name: &str, result: Result<bool, OracleError>, lon: f64, lat: f64| match result
    {
        Ok(inside) => Some(inside),
        Err(e) => {
            warn!("{} failed at ({}, {}): {}", name, lon, lat, e);
            None
        }
    };

    points
        .iter()
        .filter_map(|&(longitude, latitude)| {
            let subject = answer(
                "subject",
                subject.contains(longitude, latitude),
                longitude,
                latitude,
            );
            let oracle = answer(
                "oracle",
                oracle.contains(longitude, latitude),
                longitude,
                latitude,
            );
            (subject.is_none() || oracle.is_none() || subject != oracle).then_some(Disagreement {
                longitude,
                latitude,
                subject,
                oracle,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeometryRecord;
    use crate::pip::boundary::{SourceFeature, SourceGeometry};
    use crate::pip::builder::{build_index, BuildOptions};
    use crate::pip::BALTIC_CHART_AREA;

    struct Always(bool);

    impl ContainmentOracle for Always {
        fn contains(&self, _: f64, _: f64) -> Result<bool, OracleError> {
            Ok(self.0)
        }
    }

    struct Offline;

    impl ContainmentOracle for Offline {
        fn contains(&self, _: f64, _: f64) -> Result<bool, OracleError> {
            Err(OracleError("connection refused".to_string()))
        }
    }

    fn engine() -> ContainmentEngine {
        let features = vec![SourceFeature {
            id: "sea".to_string(),
            geometry: SourceGeometry::Supported(Geometry::from(GeometryRecord::MultiPolygon(
                vec![
                    vec![
                        vec![[10.0, 54.0], [20.0, 54.0], [15.0, 60.0], [10.0, 54.0]],
                        vec![[14.0, 55.0], [16.0, 55.0], [15.0, 56.0], [14.0, 55.0]],
                    ],
                    vec![vec![[21.0, 58.0], [25.0, 58.0], [25.0, 61.0], [21.0, 58.0]]],
                ],
            ))),
        }];
        let (artifact, _) = build_index(features, &BuildOptions::default());
        ContainmentEngine::from_artifact(artifact, BALTIC_CHART_AREA).unwrap()
    }

    fn grid() -> Vec<(f64, f64)> {
        (0..40)
            .flat_map(|i| {
                (0..30).map(move |j| (9.013 + i as f64 * 0.4107, 53.021 + j as f64 * 0.2713))
            })
            .collect()
    }

    #[test]
    fn test_engine_agrees_with_geo() {
        let engine = engine();
        let oracle = GeoOracle::from_tree(&engine.load_index().unwrap().artifact().tree);
        assert!(cross_check(&engine, &oracle, &grid()).is_empty());
    }

    #[test]
    fn test_reports_disagreements() {
        let engine = engine();
        let points = [(15.0, 57.0), (30.0, 65.0)];
        let found = cross_check(&engine, &Always(true), &points);
        assert_eq!(
            found,
            vec![Disagreement {
                longitude: 30.0,
                latitude: 65.0,
                subject: Some(false),
                oracle: Some(true),
            }]
        );
    }

    #[test]
    fn test_oracle_errors_are_reported_not_raised() {
        let engine = engine();
        let found = cross_check(&engine, &Offline, &[(15.0, 57.0)]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].oracle, None);
        assert_eq!(found[0].subject, Some(true));
    }

    #[test]
    fn test_invalid_point_is_an_engine_error() {
        let engine = engine();
        let found = cross_check(&engine, &Always(false), &[(200.0, 0.0)]);
        assert_eq!(found[0].subject, None);
    }
}
