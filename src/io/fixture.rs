//! Fixture-backed destination producer
//!
//! Serves a destination from a JSON document shaped like:
//!
//! ```json
//! {
//!   "destination": { "_id": "resort", "name": "Resort" },
//!   "parks": [ ... ], "attractions": [ ... ], "shows": [ ... ], "restaurants": [ ... ],
//!   "livedata": [ { "id": "E1", "status": "OPERATING" } ]
//! }
//! ```
//!
//! When backed by a file, the document is re-read on every call so edits to
//! `livedata` show up on the next poll. Entity sections go through the
//! `read_entities` annotation and are memoized for a few minutes.

use crate::domain::entity::{Entity, EntityType};
use crate::domain::livedata::LiveDataRecord;
use crate::error::SyncError;
use crate::services::producer::{DestinationProducer, ProducerContext};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, info};

const ANNOTATIONS: &[(&str, &str)] = &[("read_entities", "@cache|5")];

enum Source {
    File(PathBuf),
    Document(Value),
}

pub struct FixtureDestination {
    source: Source,
}

impl FixtureDestination {
    /// Read the document from `path` on each call
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self { source: Source::File(path.into()) }
    }

    /// Serve a fixed in-memory document
    pub fn from_document(document: Value) -> Self {
        Self { source: Source::Document(document) }
    }

    async fn document(&self) -> Result<Value, SyncError> {
        match &self.source {
            Source::Document(doc) => Ok(doc.clone()),
            Source::File(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read fixture: {}", path.display()))?;
                let doc = serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse fixture: {}", path.display()))?;
                Ok(doc)
            }
        }
    }

    async fn section(&self, name: &str) -> Result<Value, SyncError> {
        let mut doc = self.document().await?;
        Ok(doc.get_mut(name).map(Value::take).unwrap_or(Value::Null))
    }

    async fn read_entities(
        &self,
        ctx: &ProducerContext,
        name: &str,
        entity_type: EntityType,
    ) -> Result<Vec<Entity>, SyncError> {
        let items: Vec<Entity> = ctx
            .invoke("read_entities", &[json!(name)], || async {
                match self.section(name).await? {
                    Value::Null => Ok(Vec::new()),
                    value => serde_json::from_value(value)
                        .with_context(|| format!("Fixture section {name} is not a list of objects"))
                        .map_err(SyncError::from),
                }
            })
            .await?;

        debug!(section = %name, entities = %items.len(), "fixture_section_read");
        Ok(items
            .into_iter()
            .map(|mut entity| {
                entity.set_default("entityType", entity_type.as_str());
                entity
            })
            .collect())
    }
}

#[async_trait]
impl DestinationProducer for FixtureDestination {
    fn annotations(&self) -> &'static [(&'static str, &'static str)] {
        ANNOTATIONS
    }

    async fn init(&self, ctx: &ProducerContext) -> Result<(), SyncError> {
        // Fail early on an unreadable fixture
        self.document().await?;
        info!(destination_id = %ctx.config().destination_id(), "fixture_loaded");
        Ok(())
    }

    async fn build_destination_entity(&self, ctx: &ProducerContext) -> Result<Entity, SyncError> {
        let config = ctx.config();
        let mut entity = ctx.base_entity(config.destination_id(), config.destination_name(), EntityType::Destination);

        if let Value::Object(fields) = self.section("destination").await? {
            for (field, value) in fields {
                entity.set(&field, value);
            }
        }
        Ok(entity)
    }

    async fn build_park_entities(&self, ctx: &ProducerContext) -> Result<Vec<Entity>, SyncError> {
        self.read_entities(ctx, "parks", EntityType::Park).await
    }

    async fn build_attraction_entities(&self, ctx: &ProducerContext) -> Result<Vec<Entity>, SyncError> {
        self.read_entities(ctx, "attractions", EntityType::Attraction).await
    }

    async fn build_show_entities(&self, ctx: &ProducerContext) -> Result<Vec<Entity>, SyncError> {
        self.read_entities(ctx, "shows", EntityType::Show).await
    }

    async fn build_restaurant_entities(&self, ctx: &ProducerContext) -> Result<Vec<Entity>, SyncError> {
        self.read_entities(ctx, "restaurants", EntityType::Restaurant).await
    }

    async fn build_entity_live_data(&self, _ctx: &ProducerContext) -> Result<Vec<LiveDataRecord>, SyncError> {
        match self.section("livedata").await? {
            Value::Null => Ok(Vec::new()),
            Value::Array(records) => Ok(records.into_iter().map(LiveDataRecord::from).collect()),
            _ => Err(SyncError::Producer(anyhow!("fixture livedata must be an array"))),
        }
    }
}
