//! Error types for the containment engine and the index builder.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Rejected query input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContainmentError {
    /// Longitude or latitude is non-finite or out of range.
    #[error("invalid coordinate ({longitude}, {latitude}): {reason}")]
    InvalidCoordinate {
        longitude: f64,
        latitude: f64,
        reason: &'static str,
    },
}

/// Structural problems in a single feature's rings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("ring has no positions")]
    EmptyRing,
    #[error("ring has {0} positions, at least 4 are required")]
    TooFewPositions(usize),
    #[error("ring contains a non-finite coordinate")]
    NonFinite,
    #[error("ring is not closed")]
    UnclosedRing,
    #[error("multipolygon has no member polygons")]
    EmptyMultiPolygon,
}

/// Failures while persisting or loading an index artifact.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to access index file {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to decode index artifact: {source}")]
    Decode { source: serde_json::Error },
    #[error("failed to encode index artifact: {source}")]
    Encode { source: serde_json::Error },
    #[error("unrecognised index format tag {found:?}")]
    Format { found: String },
    #[error("unsupported index version {found:?} (expected {expected:?})")]
    Version {
        found: String,
        expected: &'static str,
    },
    #[error("corrupt index structure: {0}")]
    Structure(String),
    /// JSON has no encoding for NaN or infinity
    #[error("index holds a non-finite value in {0}")]
    NonFinite(String),
}

/// Failures while reading a boundary dataset. These abort the build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to read dataset {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("dataset is not valid JSON: {source}")]
    Parse { source: serde_json::Error },
    #[error("dataset is not a GeoJSON FeatureCollection: {0}")]
    NotFeatureCollection(String),
}

/// Failure reported by a containment oracle.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("oracle failed: {0}")]
pub struct OracleError(pub String);
