//! Persisted form of the spatial index.
//!
//! The artifact is a JSON document carrying a format tag, a version, the
//! item count, build metadata and the arena tree. Paths ending in `.gz` are
//! gzip-compressed.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use super::index::SpatialTree;
use crate::error::IndexError;

/// Format tag every artifact starts with
pub const INDEX_FORMAT: &str = "baltic-pip-index";
/// Artifact layout version understood by this build
pub const INDEX_VERSION: &str = "1";

/// Serialized spatial index plus metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexArtifact {
    pub format: String,
    pub version: String,
    pub item_count: usize,
    pub built_at: DateTime<Utc>,
    /// Dataset the index was built from
    pub source: String,
    pub node_capacity: usize,
    pub tree: SpatialTree,
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "gz")
}

impl IndexArtifact {
    /// Check the format tag, version and tree structure.
    pub fn verify(&self) -> Result<(), IndexError> {
        if self.format != INDEX_FORMAT {
            return Err(IndexError::Format {
                found: self.format.clone(),
            });
        }
        if self.version != INDEX_VERSION {
            return Err(IndexError::Version {
                found: self.version.clone(),
                expected: INDEX_VERSION,
            });
        }
        let reachable = self.tree.verify()?;
        if reachable != self.item_count {
            return Err(IndexError::Structure(format!(
                "header declares {} items but the tree holds {}",
                self.item_count, reachable
            )));
        }
        Ok(())
    }

    /// Reject NaN and infinite values, which JSON would write as `null`.
    pub fn check_finite(&self) -> Result<(), IndexError> {
        if let Some(slot) = self.tree.nodes().iter().position(|n| !n.bbox().is_finite()) {
            return Err(IndexError::NonFinite(format!("bounding box of node {slot}")));
        }
        for item in self.tree.items() {
            let finite_rings = item
                .geometry()
                .polygons()
                .iter()
                .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
                .all(|ring| ring.coords().all(|c| c.x.is_finite() && c.y.is_finite()));
            if !item.bbox().is_finite() || !finite_rings {
                return Err(IndexError::NonFinite(format!(
                    "feature {}",
                    item.feature_id()
                )));
            }
        }
        Ok(())
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), IndexError> {
        serde_json::to_writer(writer, self).map_err(|source| IndexError::Encode { source })
    }

    /// Decode and verify an artifact.
    pub fn read_from<R: Read>(reader: R) -> Result<Self, IndexError> {
        let artifact: IndexArtifact =
            serde_json::from_reader(reader).map_err(|source| IndexError::Decode { source })?;
        artifact.verify()?;
        Ok(artifact)
    }

    /// Write the artifact atomically: a crashed write never leaves a
    /// truncated file at `path`.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        self.check_finite()?;
        let io_err = |source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        {
            let writer = BufWriter::new(tmp.as_file_mut());
            if is_gzip(path) {
                let mut encoder = GzEncoder::new(writer, Compression::default());
                self.write_to(&mut encoder)?;
                encoder
                    .finish()
                    .and_then(|mut w| w.flush())
                    .map_err(io_err)?;
            } else {
                let mut writer = writer;
                self.write_to(&mut writer)?;
                writer.flush().map_err(io_err)?;
            }
        }
        tmp.persist(path).map_err(|e| io_err(e.error))?;

        info!(
            "Wrote index with {} items to {}",
            self.item_count,
            path.display()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let file = File::open(path).map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if is_gzip(path) {
            Self::read_from(BufReader::new(GzDecoder::new(file)))
        } else {
            Self::read_from(BufReader::new(file))
        }
    }
}
