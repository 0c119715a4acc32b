//! Services - synchronization logic and per-destination state
//!
//! This module contains the core engine services:
//! - `destination` - Facade exposing one destination's entities and live data
//! - `aggregator` - TTL-cached entity graph with single-flight rebuilds
//! - `live_sync` - Transactional live data change detection
//! - `annotations` - Static method annotation table (`@cache|<minutes>`)
//! - `producer` - Interface implemented by each destination's data source

pub mod aggregator;
pub mod annotations;
pub mod destination;
pub mod live_sync;
pub mod producer;

// Re-export commonly used types
pub use aggregator::EntityAggregator;
pub use annotations::{Annotations, Behavior};
pub use destination::Destination;
pub use live_sync::{LiveDataSynchronizer, UpdateOutcome};
pub use producer::{DestinationProducer, ProducerContext};
