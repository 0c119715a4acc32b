//! Entity graph aggregation with a TTL-cached snapshot
//!
//! The graph is rebuilt from the producer when the last build is older than
//! the configured TTL. The snapshot mutex is held for the whole rebuild, so
//! concurrent callers that find it stale wait for one rebuild instead of
//! each starting their own.

use crate::domain::entity::{Entity, EntityGraph, EntityType, FIELD_ENTITY_TYPE, FIELD_TIMEZONE};
use crate::error::SyncError;
use crate::infra::metrics::SyncMetrics;
use crate::services::producer::{DestinationProducer, ProducerContext};
use anyhow::anyhow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;
use tracing::{debug, info};

struct Snapshot {
    graph: EntityGraph,
    built_at: Instant,
}

/// Builds and caches every entity beneath one destination
pub struct EntityAggregator {
    producer: Arc<dyn DestinationProducer>,
    ctx: Arc<ProducerContext>,
    /// Built once per instance, never rebuilt
    destination: OnceCell<Entity>,
    snapshot: Mutex<Option<Snapshot>>,
    ttl: Duration,
    metrics: Arc<SyncMetrics>,
}

impl EntityAggregator {
    pub fn new(
        producer: Arc<dyn DestinationProducer>,
        ctx: Arc<ProducerContext>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        let ttl = ctx.config().entities_ttl();
        Self {
            producer,
            ctx,
            destination: OnceCell::new(),
            snapshot: Mutex::new(None),
            ttl,
            metrics,
        }
    }

    /// The destination entity, built on first use and memoized
    pub async fn destination_entity(&self) -> Result<Entity, SyncError> {
        let entity = self
            .destination
            .get_or_try_init(|| async {
                let mut entity = self
                    .ctx
                    .invoke("build_destination_entity", &[], || {
                        self.producer.build_destination_entity(&self.ctx)
                    })
                    .await?;
                if entity.id().is_none() {
                    return Err(SyncError::Producer(anyhow!("destination entity has no _id")));
                }
                entity.set_default(FIELD_ENTITY_TYPE, EntityType::Destination.as_str());
                entity.set_default(FIELD_TIMEZONE, self.ctx.config().timezone());
                debug!(destination_id = ?entity.id(), "destination_entity_built");
                Ok(entity)
            })
            .await?;
        Ok(entity.clone())
    }

    /// Current entity graph, rebuilt if the snapshot is stale
    pub async fn all_entities(&self) -> Result<EntityGraph, SyncError> {
        let mut snapshot = self.snapshot.lock().await;
        if let Some(current) = snapshot.as_ref() {
            if current.built_at.elapsed() < self.ttl {
                return Ok(current.graph.clone());
            }
        }

        let start = Instant::now();
        let graph = self.rebuild().await?;
        let rebuild_us = start.elapsed().as_micros() as u64;

        self.metrics.record_rebuild(rebuild_us);
        info!(
            destination_id = %self.ctx.config().destination_id(),
            entities = %graph.len(),
            rebuild_us = %rebuild_us,
            "entity_graph_rebuilt"
        );

        *snapshot = Some(Snapshot { graph: graph.clone(), built_at: Instant::now() });
        Ok(graph)
    }

    async fn rebuild(&self) -> Result<EntityGraph, SyncError> {
        let destination = self.destination_entity().await?;
        let destination_id = destination.id().unwrap_or_default().to_string();

        let parks = self
            .ctx
            .invoke("build_park_entities", &[], || self.producer.build_park_entities(&self.ctx))
            .await?;
        let attractions = self
            .ctx
            .invoke("build_attraction_entities", &[], || {
                self.producer.build_attraction_entities(&self.ctx)
            })
            .await?;
        let shows = self
            .ctx
            .invoke("build_show_entities", &[], || self.producer.build_show_entities(&self.ctx))
            .await?;
        let restaurants = self
            .ctx
            .invoke("build_restaurant_entities", &[], || {
                self.producer.build_restaurant_entities(&self.ctx)
            })
            .await?;

        let mut graph = Vec::with_capacity(1 + parks.len() + attractions.len() + shows.len() + restaurants.len());
        graph.push(destination);
        for (entity_type, children) in [
            (EntityType::Park, parks),
            (EntityType::Attraction, attractions),
            (EntityType::Show, shows),
            (EntityType::Restaurant, restaurants),
        ] {
            graph.extend(children.into_iter().map(|child| self.adopt(child, entity_type, &destination_id)));
        }

        Ok(graph.into())
    }

    /// Stamp the destination back-reference and fill defaults on a child
    fn adopt(&self, mut child: Entity, entity_type: EntityType, destination_id: &str) -> Entity {
        child.set_default(FIELD_ENTITY_TYPE, entity_type.as_str());
        child.set_default(FIELD_TIMEZONE, self.ctx.config().timezone());
        child.with_destination_id(destination_id)
    }

    pub async fn entities_of(&self, entity_type: EntityType) -> Result<Vec<Entity>, SyncError> {
        let graph = self.all_entities().await?;
        Ok(graph.iter().filter(|e| e.entity_type() == Some(entity_type)).cloned().collect())
    }

    /// Linear scan of the current graph; `None` when absent
    pub async fn entity_from_id(&self, id: &str) -> Result<Option<Entity>, SyncError> {
        let graph = self.all_entities().await?;
        Ok(graph.iter().find(|e| e.id() == Some(id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::config::Config;
    use crate::io::cache::{MemoryStore, ScopedCache};
    use crate::services::annotations::Annotations;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingProducer {
        destination_builds: AtomicU32,
        park_builds: AtomicU32,
        fail_attractions: AtomicBool,
    }

    #[async_trait]
    impl DestinationProducer for CountingProducer {
        async fn build_destination_entity(&self, ctx: &ProducerContext) -> Result<Entity, SyncError> {
            self.destination_builds.fetch_add(1, Ordering::SeqCst);
            Ok(ctx.base_entity("resort", "Resort", EntityType::Destination))
        }

        async fn build_park_entities(&self, ctx: &ProducerContext) -> Result<Vec<Entity>, SyncError> {
            self.park_builds.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(vec![ctx.base_entity("park1", "Park One", EntityType::Park)])
        }

        async fn build_attraction_entities(&self, ctx: &ProducerContext) -> Result<Vec<Entity>, SyncError> {
            if self.fail_attractions.load(Ordering::SeqCst) {
                return Err(SyncError::Producer(anyhow!("upstream 503")));
            }
            let mut untyped = Entity::default();
            untyped.set("_id", "ride2");
            Ok(vec![ctx.base_entity("ride1", "Ride One", EntityType::Attraction), untyped])
        }

        async fn build_show_entities(&self, ctx: &ProducerContext) -> Result<Vec<Entity>, SyncError> {
            Ok(vec![ctx.base_entity("show1", "Show One", EntityType::Show)])
        }

        async fn build_restaurant_entities(&self, ctx: &ProducerContext) -> Result<Vec<Entity>, SyncError> {
            Ok(vec![ctx.base_entity("food1", "Food One", EntityType::Restaurant)])
        }
    }

    fn aggregator(producer: Arc<CountingProducer>) -> (EntityAggregator, Arc<SyncMetrics>) {
        let config = Config::default().with_destination_id("resort").with_timezone("Europe/Paris");
        let cache = Arc::new(ScopedCache::new(MemoryStore::new(), "resort", 1));
        let ctx = Arc::new(ProducerContext::new(config, cache, Annotations::default()));
        let metrics = Arc::new(SyncMetrics::new());
        (EntityAggregator::new(producer, ctx, metrics.clone()), metrics)
    }

    #[tokio::test]
    async fn test_graph_order_and_back_references() {
        let (agg, _) = aggregator(Arc::new(CountingProducer::default()));
        let graph = agg.all_entities().await.unwrap();

        let ids: Vec<&str> = graph.iter().map(|e| e.id().unwrap()).collect();
        assert_eq!(ids, vec!["resort", "park1", "ride1", "ride2", "show1", "food1"]);
        assert_eq!(graph[0].destination_id(), None);
        for child in graph.iter().skip(1) {
            assert_eq!(child.destination_id(), Some("resort"));
            assert_eq!(child.timezone(), Some("Europe/Paris"));
        }
        // Producer left entityType off; the builder slot supplies it
        assert_eq!(graph[3].entity_type(), Some(EntityType::Attraction));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reused_within_ttl() {
        let producer = Arc::new(CountingProducer::default());
        let (agg, metrics) = aggregator(producer.clone());

        let first = agg.all_entities().await.unwrap();
        tokio::time::advance(Duration::from_secs(299)).await;
        let second = agg.all_entities().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(metrics.graph_rebuilds(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        let third = agg.all_entities().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(metrics.graph_rebuilds(), 2);
        assert_eq!(producer.park_builds.load(Ordering::SeqCst), 2);
        // Destination entity is memoized for the instance lifetime
        assert_eq!(producer.destination_builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_stale_reads_share_one_rebuild() {
        let producer = Arc::new(CountingProducer::default());
        let (agg, metrics) = aggregator(producer.clone());
        let agg = Arc::new(agg);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let agg = agg.clone();
            handles.push(tokio::spawn(async move { agg.all_entities().await.unwrap() }));
        }
        let graphs: Vec<EntityGraph> = join_all(handles).await;

        assert!(graphs.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(metrics.graph_rebuilds(), 1);
        assert_eq!(producer.park_builds.load(Ordering::SeqCst), 1);
    }

    async fn join_all(handles: Vec<tokio::task::JoinHandle<EntityGraph>>) -> Vec<EntityGraph> {
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_builder_failure_propagates_and_is_not_cached() {
        let producer = Arc::new(CountingProducer::default());
        producer.fail_attractions.store(true, Ordering::SeqCst);
        let (agg, metrics) = aggregator(producer.clone());

        assert!(matches!(agg.all_entities().await, Err(SyncError::Producer(_))));
        assert_eq!(metrics.graph_rebuilds(), 0);

        producer.fail_attractions.store(false, Ordering::SeqCst);
        assert_eq!(agg.all_entities().await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_filters_and_lookup() {
        let (agg, _) = aggregator(Arc::new(CountingProducer::default()));

        let parks = agg.entities_of(EntityType::Park).await.unwrap();
        assert_eq!(parks.len(), 1);
        assert_eq!(agg.entities_of(EntityType::Attraction).await.unwrap().len(), 2);
        assert_eq!(agg.entities_of(EntityType::Destination).await.unwrap().len(), 1);

        assert_eq!(agg.entity_from_id("show1").await.unwrap().unwrap().entity_type(), Some(EntityType::Show));
        assert!(agg.entity_from_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unimplemented_builder_is_fatal() {
        struct Empty;
        #[async_trait]
        impl DestinationProducer for Empty {}

        let config = Config::default();
        let cache = Arc::new(ScopedCache::new(MemoryStore::new(), "x", 1));
        let ctx = Arc::new(ProducerContext::new(config, cache, Annotations::default()));
        let agg = EntityAggregator::new(Arc::new(Empty), ctx, Arc::new(SyncMetrics::new()));

        assert!(matches!(
            agg.all_entities().await,
            Err(SyncError::Unimplemented("build_destination_entity"))
        ));
    }
}
