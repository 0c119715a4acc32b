//! Domain models - entities, live data records, content hashing
//!
//! This module contains the canonical data types used throughout the engine:
//! - `Entity` / `EntityGraph` - the destination hierarchy snapshot
//! - `LiveDataRecord` - a single live status update for one entity
//! - `SchemaValidator` - field-level validation of live data
//! - `content_hash` - change detection fingerprint

pub mod content_hash;
pub mod entity;
pub mod livedata;

// Re-export commonly used types at module level
pub use content_hash::content_hash;
pub use entity::{Entity, EntityGraph, EntityType};
pub use livedata::{LiveDataRecord, LiveDataValidator, SchemaValidator, ValidationError, ValidationErrors};
