//! Per-destination facade
//!
//! Owns the producer, its annotation bindings, the entity aggregator, the
//! live data synchronizer and the notifier for one destination. Every public
//! accessor runs the producer's `init` first, exactly once per instance.

use crate::domain::entity::{Entity, EntityGraph, EntityType};
use crate::domain::livedata::{LiveDataRecord, LiveDataValidator, SchemaValidator};
use crate::error::SyncError;
use crate::infra::config::Config;
use crate::infra::metrics::SyncMetrics;
use crate::infra::single_flight::SingleFlight;
use crate::io::cache::Cache;
use crate::io::notify::{ListenerId, Notification, Notifier};
use crate::services::aggregator::EntityAggregator;
use crate::services::annotations::Annotations;
use crate::services::live_sync::{LiveDataSynchronizer, UpdateOutcome};
use crate::services::producer::{DestinationProducer, ProducerContext};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct Destination {
    producer: Arc<dyn DestinationProducer>,
    ctx: Arc<ProducerContext>,
    cache: Arc<dyn Cache>,
    entities: EntityAggregator,
    live: LiveDataSynchronizer,
    notifier: Arc<Notifier>,
    metrics: Arc<SyncMetrics>,
    init: SingleFlight<Result<(), Arc<SyncError>>>,
}

impl Destination {
    /// Wire a destination. Fails only on invalid configuration.
    pub fn new(
        config: Config,
        producer: Arc<dyn DestinationProducer>,
        cache: Arc<dyn Cache>,
    ) -> Result<Self, SyncError> {
        config.validate()?;

        let annotations = Annotations::from_table(producer.annotations());
        let livedata_ttl = config.livedata_ttl();
        let destination_id = config.destination_id().to_string();
        let ctx = Arc::new(ProducerContext::new(config, cache.clone(), annotations));

        let metrics = Arc::new(SyncMetrics::new());
        let notifier = Arc::new(Notifier::new());
        let entities = EntityAggregator::new(producer.clone(), ctx.clone(), metrics.clone());
        let live = LiveDataSynchronizer::new(
            cache.clone(),
            Arc::new(SchemaValidator),
            notifier.clone(),
            metrics.clone(),
            livedata_ttl,
        );

        info!(
            destination_id = %destination_id,
            annotations = %ctx.annotations().len(),
            "destination_created"
        );

        Ok(Self {
            producer,
            ctx,
            cache,
            entities,
            live,
            notifier,
            metrics,
            init: SingleFlight::new(),
        })
    }

    /// Replace the live data validator
    pub fn with_validator(mut self, validator: Arc<dyn LiveDataValidator>) -> Self {
        self.live = LiveDataSynchronizer::new(
            self.cache.clone(),
            validator,
            self.notifier.clone(),
            self.metrics.clone(),
            self.ctx.config().livedata_ttl(),
        );
        self
    }

    pub fn config(&self) -> &Config {
        self.ctx.config()
    }

    async fn ensure_init(&self) -> Result<(), SyncError> {
        self.init
            .run(|| async {
                debug!(destination_id = %self.ctx.config().destination_id(), "destination_init");
                self.producer.init(&self.ctx).await.map_err(|e| {
                    error!(destination_id = %self.ctx.config().destination_id(), error = %e, "destination_init_failed");
                    Arc::new(e)
                })
            })
            .await
            .map_err(SyncError::Initialization)
    }

    pub async fn get_destination_entity(&self) -> Result<Entity, SyncError> {
        self.ensure_init().await?;
        self.entities.destination_entity().await
    }

    pub async fn get_all_entities(&self) -> Result<EntityGraph, SyncError> {
        self.ensure_init().await?;
        self.entities.all_entities().await
    }

    async fn entities_of(&self, entity_type: EntityType) -> Result<Vec<Entity>, SyncError> {
        self.ensure_init().await?;
        self.entities.entities_of(entity_type).await
    }

    pub async fn get_destination_entities(&self) -> Result<Vec<Entity>, SyncError> {
        self.entities_of(EntityType::Destination).await
    }

    pub async fn get_park_entities(&self) -> Result<Vec<Entity>, SyncError> {
        self.entities_of(EntityType::Park).await
    }

    pub async fn get_attraction_entities(&self) -> Result<Vec<Entity>, SyncError> {
        self.entities_of(EntityType::Attraction).await
    }

    pub async fn get_show_entities(&self) -> Result<Vec<Entity>, SyncError> {
        self.entities_of(EntityType::Show).await
    }

    pub async fn get_restaurant_entities(&self) -> Result<Vec<Entity>, SyncError> {
        self.entities_of(EntityType::Restaurant).await
    }

    pub async fn get_entity_from_id(&self, id: &str) -> Result<Option<Entity>, SyncError> {
        self.ensure_init().await?;
        self.entities.entity_from_id(id).await
    }

    /// Apply one live data record to entity `id`
    pub async fn update_entity_live_data(
        &self,
        id: &str,
        data: LiveDataRecord,
    ) -> Result<UpdateOutcome, SyncError> {
        self.ensure_init().await?;
        self.live.update(&self.entities, id, data).await
    }

    /// Fetch the producer's live data batch and apply every record.
    ///
    /// A failing record is logged and counted; the rest of the batch still
    /// runs. Returns the batch with showtimes normalized.
    pub async fn get_entity_live_data(&self) -> Result<Vec<LiveDataRecord>, SyncError> {
        self.ensure_init().await?;

        let mut batch = self
            .ctx
            .invoke("build_entity_live_data", &[], || self.producer.build_entity_live_data(&self.ctx))
            .await?;

        let mut applied = 0usize;
        for record in batch.iter_mut() {
            record.normalize_showtimes();

            let Some(id) = record.id().map(str::to_string) else {
                warn!(error = %SyncError::MissingRecordId, "livedata_batch_item_failed");
                self.metrics.record_batch_failure();
                continue;
            };

            match self.live.update(&self.entities, &id, record.clone()).await {
                Ok(_) => applied += 1,
                Err(e) => {
                    warn!(entity_id = %id, error = %e, "livedata_batch_item_failed");
                    self.metrics.record_batch_failure();
                }
            }
        }

        debug!(records = %batch.len(), applied = %applied, "livedata_batch_applied");
        Ok(batch)
    }

    /// Last persisted live data for `id`, if any
    pub async fn stored_live_data(&self, id: &str) -> Result<Option<Value>, SyncError> {
        self.live.stored(id).await
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.notifier.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Forward notifications into a bounded channel, dropping when full
    pub fn forward_to_channel(
        &self,
        buffer_size: usize,
    ) -> Result<(ListenerId, mpsc::Receiver<Notification>), SyncError> {
        self.notifier.forward_to_channel(buffer_size)
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }
}
