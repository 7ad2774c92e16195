//! Point-in-polygon (PIP) containment engine.
//!
//! Builds a bulk-loaded R-tree over sea boundary polygons offline and
//! answers "is this coordinate inside the sea" at runtime with bounding-box
//! pruning followed by an exact even-odd test.

mod artifact;
mod boundary;
mod builder;
pub mod geometry;
mod index;
mod oracle;
mod service;

pub use artifact::{IndexArtifact, INDEX_FORMAT, INDEX_VERSION};
pub use boundary::{read_features, read_features_from_path, SourceFeature, SourceGeometry};
pub use builder::{build_index, BuildOptions, BuildReport};
pub use index::{IndexItem, IndexNode, NodeId, SpatialTree};
pub use oracle::{cross_check, ContainmentOracle, Disagreement, GeoOracle};
pub use service::{
    Containment, ContainmentEngine, IndexStatus, LoadedIndex, BALTIC_CHART_AREA,
};
