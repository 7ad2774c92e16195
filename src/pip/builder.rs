//! Offline index construction.

use chrono::Utc;
use geo::{LineString, Polygon};
use rayon::prelude::*;
use tracing::{info, warn};

use super::artifact::{IndexArtifact, INDEX_FORMAT, INDEX_VERSION};
use super::boundary::{SourceFeature, SourceGeometry};
use super::geometry::compute_bounding_box;
use super::index::{IndexItem, SpatialTree};
use crate::models::{BoundingBox, Geometry};

/// Parameters for [`build_index`]
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Maximum entries per tree node
    pub node_capacity: usize,
    /// Label of the dataset recorded in the artifact
    pub source: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            node_capacity: SpatialTree::DEFAULT_NODE_CAPACITY,
            source: "unknown".to_string(),
        }
    }
}

/// Per-build feature counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Features stored in the index, suspect ones included
    pub indexed: usize,
    /// Features left out for missing or unsupported geometry
    pub skipped: usize,
    /// Indexed features whose geometry failed validation
    pub suspect: usize,
}

/// Empty every ring holding a NaN or infinite coordinate.
///
/// Such rings cannot be written to the artifact; emptying them keeps the
/// feature indexed and marked defective.
fn drop_non_finite_rings(geometry: Geometry) -> Geometry {
    fn clean(ring: LineString<f64>) -> LineString<f64> {
        if ring.coords().all(|c| c.x.is_finite() && c.y.is_finite()) {
            ring
        } else {
            LineString::new(Vec::new())
        }
    }
    fn clean_polygon(polygon: Polygon<f64>) -> Polygon<f64> {
        let (exterior, interiors) = polygon.into_inner();
        Polygon::new(clean(exterior), interiors.into_iter().map(clean).collect())
    }

    match geometry {
        Geometry::Polygon(polygon) => Geometry::Polygon(clean_polygon(polygon)),
        Geometry::MultiPolygon(multi) => {
            Geometry::MultiPolygon(multi.into_iter().map(clean_polygon).collect())
        }
    }
}

enum Prepared {
    Item { item: IndexItem, suspect: bool },
    Skipped,
}

fn prepare(feature: SourceFeature) -> Prepared {
    let geometry = match feature.geometry {
        SourceGeometry::Supported(geometry) => geometry,
        SourceGeometry::Unsupported(kind) => {
            warn!(
                "Skipping feature {}: unsupported geometry type {}",
                feature.id, kind
            );
            return Prepared::Skipped;
        }
        SourceGeometry::Missing => {
            warn!("Skipping feature {}: no geometry", feature.id);
            return Prepared::Skipped;
        }
    };

    let bbox = match compute_bounding_box(&geometry) {
        Ok(bbox) => bbox,
        Err(e) => {
            warn!(
                "Feature {} has degenerate geometry ({}), indexing with a zero bounding box",
                feature.id, e
            );
            BoundingBox::ZERO
        }
    };

    let item = IndexItem::new(feature.id, bbox, drop_non_finite_rings(geometry));
    let suspect = match item.defect() {
        Some(defect) => {
            warn!("Feature {} is suspect: {}", item.feature_id(), defect);
            true
        }
        None => false,
    };
    Prepared::Item { item, suspect }
}

/// Build a bulk-loaded index from dataset features.
///
/// Per-feature problems never abort the build: unsupported or missing
/// geometry is skipped, degenerate geometry is indexed with a zero box.
pub fn build_index(
    features: Vec<SourceFeature>,
    options: &BuildOptions,
) -> (IndexArtifact, BuildReport) {
    info!(
        "Building spatial index for {} features...",
        features.len()
    );

    let prepared: Vec<Prepared> = features.into_par_iter().map(prepare).collect();

    let mut report = BuildReport::default();
    let mut items = Vec::with_capacity(prepared.len());
    for outcome in prepared {
        match outcome {
            Prepared::Item { item, suspect } => {
                report.indexed += 1;
                if suspect {
                    report.suspect += 1;
                }
                items.push(item);
            }
            Prepared::Skipped => report.skipped += 1,
        }
    }

    let tree = SpatialTree::bulk_load(items, options.node_capacity);

    info!(
        "Spatial index built with {} entries (height {}, {} skipped, {} suspect)",
        report.indexed,
        tree.height(),
        report.skipped,
        report.suspect
    );

    let artifact = IndexArtifact {
        format: INDEX_FORMAT.to_string(),
        version: INDEX_VERSION.to_string(),
        item_count: report.indexed,
        built_at: Utc::now(),
        source: options.source.clone(),
        node_capacity: options.node_capacity.max(2),
        tree,
    };
    (artifact, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeometryError;
    use crate::models::GeometryRecord;
    use geo::MultiPolygon;

    fn feature(id: &str, geometry: SourceGeometry) -> SourceFeature {
        SourceFeature {
            id: id.to_string(),
            geometry,
        }
    }

    fn square(x0: f64, y0: f64) -> SourceGeometry {
        SourceGeometry::Supported(Geometry::from(GeometryRecord::Polygon(vec![vec![
            [x0, y0],
            [x0 + 1.0, y0],
            [x0 + 1.0, y0 + 1.0],
            [x0, y0 + 1.0],
            [x0, y0],
        ]])))
    }

    #[test]
    fn test_report_counts() {
        let features = vec![
            feature("a", square(0.0, 0.0)),
            feature("b", square(3.0, 3.0)),
            feature("point", SourceGeometry::Unsupported("Point".to_string())),
            feature("none", SourceGeometry::Missing),
            feature(
                "empty",
                SourceGeometry::Supported(Geometry::MultiPolygon(MultiPolygon::new(vec![]))),
            ),
        ];
        let (artifact, report) = build_index(features, &BuildOptions::default());

        assert_eq!(
            report,
            BuildReport {
                indexed: 3,
                skipped: 2,
                suspect: 1
            }
        );
        assert_eq!(artifact.item_count, 3);
        assert_eq!(artifact.tree.len(), 3);
        assert_eq!(artifact.format, INDEX_FORMAT);
        assert_eq!(artifact.version, INDEX_VERSION);
    }

    #[test]
    fn test_degenerate_feature_gets_zero_box() {
        let broken = SourceGeometry::Supported(Geometry::from(GeometryRecord::Polygon(vec![
            vec![],
        ])));
        let (artifact, report) = build_index(
            vec![feature("broken", broken), feature("ok", square(5.0, 5.0))],
            &BuildOptions::default(),
        );
        assert_eq!(report.suspect, 1);

        let broken = artifact
            .tree
            .items()
            .find(|i| i.feature_id() == "broken")
            .unwrap();
        assert_eq!(*broken.bbox(), BoundingBox::ZERO);
        assert!(broken.defect().is_some());
    }

    #[test]
    fn test_bad_hole_keeps_exterior_box() {
        let geometry = SourceGeometry::Supported(Geometry::from(GeometryRecord::Polygon(vec![
            vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0]],
            vec![[1.0, 1.0], [2.0, 2.0]],
        ])));
        let (artifact, report) =
            build_index(vec![feature("holey", geometry)], &BuildOptions::default());
        assert_eq!(report.suspect, 1);
        let item = artifact.tree.items().next().unwrap();
        assert_eq!(*item.bbox(), BoundingBox::new(0.0, 0.0, 4.0, 4.0));
    }

    #[test]
    fn test_non_finite_rings_are_emptied() {
        let geometry = SourceGeometry::Supported(Geometry::from(GeometryRecord::Polygon(vec![
            vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0]],
            vec![[1.0, 1.0], [f64::NAN, 1.0], [2.0, 2.0], [1.0, 1.0]],
        ])));
        let (artifact, report) =
            build_index(vec![feature("nan-hole", geometry)], &BuildOptions::default());
        assert_eq!(report.suspect, 1);

        let item = artifact.tree.items().next().unwrap();
        assert_eq!(*item.bbox(), BoundingBox::new(0.0, 0.0, 4.0, 4.0));
        assert_eq!(item.defect(), Some(&GeometryError::EmptyRing));
        let Geometry::Polygon(polygon) = item.geometry() else {
            panic!("expected polygon");
        };
        assert_eq!(polygon.exterior().0.len(), 5);
        assert!(polygon.interiors()[0].0.is_empty());
        assert!(artifact.check_finite().is_ok());
    }

    #[test]
    fn test_options_recorded() {
        let options = BuildOptions {
            node_capacity: 4,
            source: "baltic.geojson".to_string(),
        };
        let features = (0..50)
            .map(|i| feature(&format!("f{i}"), square(i as f64, 0.0)))
            .collect();
        let (artifact, _) = build_index(features, &options);
        assert_eq!(artifact.source, "baltic.geojson");
        assert_eq!(artifact.node_capacity, 4);
        assert_eq!(artifact.tree.verify().unwrap(), 50);
    }

    #[test]
    fn test_empty_dataset() {
        let (artifact, report) = build_index(vec![], &BuildOptions::default());
        assert_eq!(report, BuildReport::default());
        assert!(artifact.tree.is_empty());
    }
}
