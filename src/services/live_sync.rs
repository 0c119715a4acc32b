//! Transactional live data ingestion
//!
//! Each update runs a read-compare-write inside a cache transaction scoped
//! to the entity id. The stored value and its content hash are written in
//! the same commit. Notifications are queued while the transaction is open
//! and emitted only after it has been committed and released.

use crate::domain::content_hash::content_hash;
use crate::domain::livedata::{LiveDataRecord, LiveDataValidator};
use crate::error::{CacheError, SyncError};
use crate::infra::metrics::SyncMetrics;
use crate::io::cache::Cache;
use crate::io::notify::{ErrorKind, Notification, Notifier};
use crate::services::aggregator::EntityAggregator;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Cache key holding an entity's last stored live data
pub fn livedata_key(entity_id: &str) -> String {
    format!("{entity_id}_livedata")
}

/// Cache key holding the content hash of `livedata_key`'s value
pub fn livedata_hash_key(entity_id: &str) -> String {
    format!("{entity_id}_livedata_hash")
}

/// What a single `update` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// New content persisted and a `liveupdate` emitted
    Changed,
    /// Content hash matched the stored one; nothing written
    Unchanged,
    /// No entity with this id; `error` emitted
    UnknownEntity,
    /// Schema validation failed; `error` emitted
    Invalid,
    /// The transaction failed; logged, nothing emitted, nothing propagated
    TransactionFailed,
}

pub struct LiveDataSynchronizer {
    cache: Arc<dyn Cache>,
    validator: Arc<dyn LiveDataValidator>,
    notifier: Arc<Notifier>,
    metrics: Arc<SyncMetrics>,
    ttl: Duration,
}

impl LiveDataSynchronizer {
    pub fn new(
        cache: Arc<dyn Cache>,
        validator: Arc<dyn LiveDataValidator>,
        notifier: Arc<Notifier>,
        metrics: Arc<SyncMetrics>,
        ttl: Duration,
    ) -> Self {
        Self { cache, validator, notifier, metrics, ttl }
    }

    /// Apply one live data record to entity `id`.
    ///
    /// Only a failure to resolve the entity graph is returned as an error;
    /// every other condition is reported through the outcome.
    pub async fn update(
        &self,
        entities: &EntityAggregator,
        id: &str,
        mut data: LiveDataRecord,
    ) -> Result<UpdateOutcome, SyncError> {
        data.normalize_showtimes();

        if entities.entity_from_id(id).await?.is_none() {
            warn!(entity_id = %id, "livedata_unknown_entity");
            self.metrics.record_unknown_entity();
            self.notifier.emit(&Notification::Error {
                entity_id: id.to_string(),
                kind: ErrorKind::UnknownEntityLiveData,
                detail: json!({ "data": data }),
            });
            return Ok(UpdateOutcome::UnknownEntity);
        }

        let errors = self.validator.validate(&data);
        if !errors.is_empty() {
            warn!(entity_id = %id, errors = %errors.len(), "livedata_invalid");
            self.metrics.record_invalid();
            self.notifier.emit(&Notification::Error {
                entity_id: id.to_string(),
                kind: ErrorKind::InvalidLiveData,
                detail: json!({ "errors": errors.as_slice(), "data": data }),
            });
            return Ok(UpdateOutcome::Invalid);
        }

        let mut queued = Vec::new();
        let outcome = match self.apply(id, data.to_value(), &mut queued).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(entity_id = %id, error = %e, "livedata_transaction_failed");
                self.metrics.record_transaction_fault();
                queued.clear();
                UpdateOutcome::TransactionFailed
            }
        };

        match outcome {
            UpdateOutcome::Changed => self.metrics.record_changed(),
            UpdateOutcome::Unchanged => self.metrics.record_unchanged(),
            _ => {}
        }

        // Transaction is closed by now; listeners never run under the lock
        for notification in queued {
            self.notifier.emit(&notification);
        }
        Ok(outcome)
    }

    async fn apply(
        &self,
        id: &str,
        value: Value,
        queued: &mut Vec<Notification>,
    ) -> Result<UpdateOutcome, CacheError> {
        let mut tx = self.cache.begin(id).await?;
        let hash_key = livedata_hash_key(id);

        let stored_hash = tx.get(&hash_key).await?;
        let new_hash = content_hash(Some(&value));

        let unchanged = match (stored_hash.as_ref().and_then(Value::as_str), new_hash.as_deref()) {
            (Some(stored), Some(new)) => stored == new,
            _ => false,
        };
        if unchanged {
            tx.commit().await?;
            debug!(entity_id = %id, "livedata_unchanged");
            return Ok(UpdateOutcome::Unchanged);
        }

        queued.push(Notification::LiveUpdate { entity_id: id.to_string(), data: value.clone() });
        tx.set(&livedata_key(id), value, self.ttl).await?;
        tx.set(&hash_key, new_hash.map(Value::String).unwrap_or(Value::Null), self.ttl).await?;
        tx.commit().await?;

        debug!(entity_id = %id, "livedata_changed");
        Ok(UpdateOutcome::Changed)
    }

    /// Last persisted live data for an entity
    pub async fn stored(&self, id: &str) -> Result<Option<Value>, SyncError> {
        Ok(self.cache.get(&livedata_key(id)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{Entity, EntityType};
    use crate::domain::livedata::SchemaValidator;
    use crate::infra::config::Config;
    use crate::io::cache::{CacheTransaction, MemoryStore, ScopedCache};
    use crate::services::annotations::Annotations;
    use crate::services::producer::{DestinationProducer, ProducerContext};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct OneRide;

    #[async_trait]
    impl DestinationProducer for OneRide {
        async fn build_destination_entity(&self, ctx: &ProducerContext) -> Result<Entity, SyncError> {
            Ok(ctx.base_entity("resort", "Resort", EntityType::Destination))
        }
        async fn build_park_entities(&self, _ctx: &ProducerContext) -> Result<Vec<Entity>, SyncError> {
            Ok(Vec::new())
        }
        async fn build_attraction_entities(&self, ctx: &ProducerContext) -> Result<Vec<Entity>, SyncError> {
            Ok(vec![ctx.base_entity("E1", "Ride", EntityType::Attraction)])
        }
        async fn build_show_entities(&self, _ctx: &ProducerContext) -> Result<Vec<Entity>, SyncError> {
            Ok(Vec::new())
        }
        async fn build_restaurant_entities(&self, _ctx: &ProducerContext) -> Result<Vec<Entity>, SyncError> {
            Ok(Vec::new())
        }
    }

    /// Cache whose transactions always fail on commit
    struct BrokenCommitCache(ScopedCache);

    struct BrokenTransaction<'a>(Box<dyn CacheTransaction + 'a>);

    #[async_trait]
    impl CacheTransaction for BrokenTransaction<'_> {
        async fn get(&mut self, key: &str) -> Result<Option<Value>, CacheError> {
            self.0.get(key).await
        }
        async fn set(&mut self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
            self.0.set(key, value, ttl).await
        }
        async fn commit(self: Box<Self>) -> Result<(), CacheError> {
            Err(CacheError::Backend("disk full".to_string()))
        }
    }

    #[async_trait]
    impl Cache for BrokenCommitCache {
        async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
            self.0.get(key).await
        }
        async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
            self.0.set(key, value, ttl).await
        }
        async fn begin<'a>(&'a self, scope: &str) -> Result<Box<dyn CacheTransaction + 'a>, CacheError> {
            Ok(Box::new(BrokenTransaction(self.0.begin(scope).await?)))
        }
    }

    struct Harness {
        sync: LiveDataSynchronizer,
        entities: EntityAggregator,
        events: Arc<Mutex<Vec<Notification>>>,
        metrics: Arc<SyncMetrics>,
    }

    fn harness(cache: Arc<dyn Cache>) -> Harness {
        let config = Config::default().with_destination_id("resort");
        let metrics = Arc::new(SyncMetrics::new());
        let ctx = Arc::new(ProducerContext::new(config, cache.clone(), Annotations::default()));
        let entities = EntityAggregator::new(Arc::new(OneRide), ctx, metrics.clone());

        let notifier = Arc::new(Notifier::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        notifier.subscribe(move |n| sink.lock().push(n.clone()));

        let sync = LiveDataSynchronizer::new(
            cache,
            Arc::new(SchemaValidator),
            notifier,
            metrics.clone(),
            Duration::from_secs(180 * 86_400),
        );
        Harness { sync, entities, events, metrics }
    }

    fn record(value: Value) -> LiveDataRecord {
        LiveDataRecord::from(value)
    }

    #[tokio::test]
    async fn test_transaction_fault_is_swallowed() {
        let scoped = ScopedCache::new(MemoryStore::new(), "resort", 1);
        let store = scoped.store().clone();
        let h = harness(Arc::new(BrokenCommitCache(scoped)));

        let outcome = h
            .sync
            .update(&h.entities, "E1", record(json!({"status": "OPERATING"})))
            .await
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::TransactionFailed);
        assert!(h.events.lock().is_empty());
        assert_eq!(store.write_count(), 0);
        assert_eq!(h.metrics.summary().transaction_faults, 1);
    }

    #[tokio::test]
    async fn test_listener_runs_after_lock_released() {
        let scoped = ScopedCache::new(MemoryStore::new(), "resort", 1);
        let h = harness(Arc::new(scoped.clone()));

        let locked_during_emit = Arc::new(AtomicBool::new(true));
        let flag = locked_during_emit.clone();
        h.sync.notifier.subscribe(move |_| flag.store(scoped.is_locked("E1"), Ordering::SeqCst));

        let outcome = h.sync.update(&h.entities, "E1", record(json!({"status": "DOWN"}))).await.unwrap();

        assert_eq!(outcome, UpdateOutcome::Changed);
        assert!(!locked_during_emit.load(Ordering::SeqCst));
        assert_eq!(h.events.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_hash_stored_alongside_value() {
        let cache: Arc<dyn Cache> = Arc::new(ScopedCache::new(MemoryStore::new(), "resort", 1));
        let h = harness(cache.clone());
        let data = json!({"status": "OPERATING"});

        h.sync.update(&h.entities, "E1", record(data.clone())).await.unwrap();

        assert_eq!(cache.get(&livedata_key("E1")).await.unwrap(), Some(data.clone()));
        assert_eq!(
            cache.get(&livedata_hash_key("E1")).await.unwrap(),
            content_hash(Some(&data)).map(Value::String)
        );
    }
}
