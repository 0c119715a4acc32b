//! Error types shared across the engine

use std::sync::Arc;
use thiserror::Error;

/// Failures raised by a cache backend
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cache backend failure: {0}")]
    Backend(String),
}

/// Errors surfaced by the synchronization engine
#[derive(Debug, Error)]
pub enum SyncError {
    /// A producer operation the destination never implemented
    #[error("{0} is not implemented for this destination")]
    Unimplemented(&'static str),
    /// A producer call failed while fetching or mapping upstream data
    #[error("producer failure: {0}")]
    Producer(#[from] anyhow::Error),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Fatal configuration problem detected at construction
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The one-time initialization failed; every caller sees the same failure
    #[error("destination initialization failed: {0}")]
    Initialization(#[source] Arc<SyncError>),
    #[error("live data record has no entity id")]
    MissingRecordId,
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
