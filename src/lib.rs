//! Baltic PIP - decides whether a coordinate lies within the Baltic Sea.
//!
//! This library provides the offline index builder and the runtime
//! containment engine shared by the `build-index` and `query` binaries.

pub mod config;
pub mod error;
pub mod models;
pub mod pip;

pub use error::{BuildError, ContainmentError, GeometryError, IndexError, OracleError};
pub use models::{BoundingBox, Feature, Geometry};
pub use pip::{Containment, ContainmentEngine};
