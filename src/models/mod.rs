//! Core data models for the containment engine.

pub mod bbox;
pub mod feature;

pub use bbox::BoundingBox;
pub use feature::{Feature, Geometry, GeometryRecord};
