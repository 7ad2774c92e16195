//! Containment query service.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::artifact::IndexArtifact;
use super::geometry::{geometry_contains, validate_coordinate};
use super::index::IndexItem;
use crate::config::EngineConfig;
use crate::error::{ContainmentError, IndexError};
use crate::models::BoundingBox;

/// Hand-tuned chart area around the Baltic Sea
pub const BALTIC_CHART_AREA: BoundingBox = BoundingBox {
    min_x: 9.0,
    min_y: 53.0,
    max_x: 31.0,
    max_y: 66.0,
};

/// Answer for one query point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Containment {
    /// Inside one of the indexed polygons
    #[serde(rename = "inBaltic")]
    pub in_polygon: bool,
    /// Inside the chart-area rectangle
    #[serde(rename = "inChartArea")]
    pub in_region: bool,
    pub longitude: f64,
    pub latitude: f64,
}

/// Load state of the engine's index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    NotLoaded,
    Loaded { items: usize },
    /// Loading failed; polygon queries answer `false` from now on
    Unavailable,
}

/// A verified index held for the lifetime of the process.
#[derive(Debug)]
pub struct LoadedIndex {
    artifact: IndexArtifact,
    malformed: usize,
}

impl LoadedIndex {
    pub fn new(artifact: IndexArtifact) -> Self {
        let malformed = artifact
            .tree
            .items()
            .filter(|item| item.defect().is_some())
            .count();
        Self {
            artifact,
            malformed,
        }
    }

    pub fn len(&self) -> usize {
        self.artifact.item_count
    }

    pub fn is_empty(&self) -> bool {
        self.artifact.item_count == 0
    }

    /// Items whose geometry failed validation at load
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.artifact.built_at
    }

    pub fn artifact(&self) -> &IndexArtifact {
        &self.artifact
    }

    /// Items whose bounding box could contain the point
    pub fn candidates(&self, longitude: f64, latitude: f64) -> Vec<&IndexItem> {
        self.artifact.tree.locate_point(longitude, latitude)
    }

    /// Exact test against the candidates, stopping at the first hit.
    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        self.candidates(longitude, latitude).into_iter().any(|item| {
            if let Some(defect) = item.defect() {
                warn!(
                    "Skipping malformed candidate {}: {}",
                    item.feature_id(),
                    defect
                );
                return false;
            }
            geometry_contains(item.geometry(), longitude, latitude)
        })
    }
}

/// Determines whether coordinates fall within the indexed sea polygons.
///
/// The index is loaded on first use and shared read-only afterwards. A load
/// failure is logged once and leaves the engine degraded: polygon answers
/// become `false` while the chart-area test keeps working.
pub struct ContainmentEngine {
    index_path: Option<PathBuf>,
    chart_area: BoundingBox,
    index: OnceLock<Option<Arc<LoadedIndex>>>,
}

impl ContainmentEngine {
    /// Engine that loads its index from `index_path` on first use
    pub fn new(index_path: impl Into<PathBuf>, chart_area: BoundingBox) -> Self {
        Self {
            index_path: Some(index_path.into()),
            chart_area,
            index: OnceLock::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.index_path.clone(), config.chart_area)
    }

    /// Engine over an index that is already in memory
    pub fn from_artifact(
        artifact: IndexArtifact,
        chart_area: BoundingBox,
    ) -> Result<Self, IndexError> {
        artifact.verify()?;
        let index = OnceLock::new();
        let _ = index.set(Some(Arc::new(LoadedIndex::new(artifact))));
        Ok(Self {
            index_path: None,
            chart_area,
            index,
        })
    }

    /// Load the index once; concurrent first callers wait for one load.
    pub fn load_index(&self) -> Option<Arc<LoadedIndex>> {
        self.index
            .get_or_init(|| {
                let Some(path) = &self.index_path else {
                    error!("No spatial index configured; polygon containment disabled");
                    return None;
                };
                info!("Loading spatial index from {}", path.display());
                match IndexArtifact::load(path) {
                    Ok(artifact) => {
                        let loaded = LoadedIndex::new(artifact);
                        info!(
                            "Spatial index loaded with {} entries (built {})",
                            loaded.len(),
                            loaded.built_at()
                        );
                        if loaded.malformed() > 0 {
                            warn!(
                                "{} indexed features have malformed geometry and will be skipped",
                                loaded.malformed()
                            );
                        }
                        Some(Arc::new(loaded))
                    }
                    Err(e) => {
                        error!(
                            "Spatial index unavailable, polygon containment disabled: {}",
                            e
                        );
                        None
                    }
                }
            })
            .clone()
    }

    pub fn status(&self) -> IndexStatus {
        match self.index.get() {
            None => IndexStatus::NotLoaded,
            Some(None) => IndexStatus::Unavailable,
            Some(Some(index)) => IndexStatus::Loaded { items: index.len() },
        }
    }

    pub fn validate_coordinate(&self, longitude: f64, latitude: f64) -> Result<(), ContainmentError> {
        validate_coordinate(longitude, latitude)
    }

    /// Cheap rectangle test, independent of the index
    pub fn is_in_region(&self, longitude: f64, latitude: f64) -> bool {
        self.chart_area.contains_point(longitude, latitude)
    }

    /// Exact polygon containment; `false` when the index is unavailable.
    pub fn is_in_polygon_set(&self, longitude: f64, latitude: f64) -> bool {
        match self.load_index() {
            Some(index) => index.contains(longitude, latitude),
            None => false,
        }
    }

    /// Feature ids surviving the bounding-box pruning stage
    pub fn candidates(&self, longitude: f64, latitude: f64) -> Vec<String> {
        self.load_index()
            .map(|index| {
                index
                    .candidates(longitude, latitude)
                    .iter()
                    .map(|item| item.feature_id().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Validate the point, then report both containment flags.
    pub fn check_containment(
        &self,
        longitude: f64,
        latitude: f64,
    ) -> Result<Containment, ContainmentError> {
        self.validate_coordinate(longitude, latitude)?;

        let result = Containment {
            in_polygon: self.is_in_polygon_set(longitude, latitude),
            in_region: self.is_in_region(longitude, latitude),
            longitude,
            latitude,
        };
        debug!(
            "Containment at ({}, {}): polygon={} region={}",
            longitude, latitude, result.in_polygon, result.in_region
        );
        Ok(result)
    }
}
