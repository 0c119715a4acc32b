//! Producer interface implemented once per destination
//!
//! A producer maps upstream data into entities and live data records. Every
//! builder defaults to `SyncError::Unimplemented`, so a destination only
//! overrides what it supports; calling a missing builder is fatal for the
//! operation that needed it.

use crate::domain::entity::{Entity, EntityType};
use crate::domain::livedata::LiveDataRecord;
use crate::error::SyncError;
use crate::infra::config::Config;
use crate::io::cache::Cache;
use crate::services::annotations::Annotations;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Upstream data source for one destination
#[async_trait]
pub trait DestinationProducer: Send + Sync {
    /// Method annotations, parsed once at construction
    fn annotations(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// One-time setup before any entity is built (login, token fetch, ...)
    async fn init(&self, _ctx: &ProducerContext) -> Result<(), SyncError> {
        Ok(())
    }

    async fn build_destination_entity(&self, _ctx: &ProducerContext) -> Result<Entity, SyncError> {
        Err(SyncError::Unimplemented("build_destination_entity"))
    }

    async fn build_park_entities(&self, _ctx: &ProducerContext) -> Result<Vec<Entity>, SyncError> {
        Err(SyncError::Unimplemented("build_park_entities"))
    }

    async fn build_attraction_entities(&self, _ctx: &ProducerContext) -> Result<Vec<Entity>, SyncError> {
        Err(SyncError::Unimplemented("build_attraction_entities"))
    }

    async fn build_show_entities(&self, _ctx: &ProducerContext) -> Result<Vec<Entity>, SyncError> {
        Err(SyncError::Unimplemented("build_show_entities"))
    }

    async fn build_restaurant_entities(&self, _ctx: &ProducerContext) -> Result<Vec<Entity>, SyncError> {
        Err(SyncError::Unimplemented("build_restaurant_entities"))
    }

    async fn build_entity_live_data(&self, _ctx: &ProducerContext) -> Result<Vec<LiveDataRecord>, SyncError> {
        Err(SyncError::Unimplemented("build_entity_live_data"))
    }
}

/// Everything a producer may use while building: config, the destination's
/// cache, and the annotation bindings declared by the producer
pub struct ProducerContext {
    config: Config,
    cache: Arc<dyn Cache>,
    annotations: Annotations,
}

impl ProducerContext {
    pub fn new(config: Config, cache: Arc<dyn Cache>, annotations: Annotations) -> Self {
        Self { config, cache, annotations }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    /// Run `f` under the behaviour declared for `method`
    pub async fn invoke<T, F, Fut>(&self, method: &str, args: &[Value], f: F) -> Result<T, SyncError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        self.annotations.invoke(self.cache.as_ref(), method, args, f).await
    }

    /// Entity skeleton carrying this destination's timezone
    pub fn base_entity(&self, id: &str, name: &str, entity_type: EntityType) -> Entity {
        Entity::base(id, name, entity_type, self.config.timezone())
    }
}
