//! Entity model - destinations, parks, attractions, shows, restaurants

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Field holding the unique internal identifier
pub const FIELD_ID: &str = "_id";
/// Field holding the entity type discriminator
pub const FIELD_ENTITY_TYPE: &str = "entityType";
/// Field holding the IANA timezone name
pub const FIELD_TIMEZONE: &str = "timezone";
/// Back-reference from a child entity to its destination
pub const FIELD_DESTINATION_ID: &str = "_destinationId";

/// Entity type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Destination,
    Park,
    Attraction,
    Show,
    Restaurant,
}

impl EntityType {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Destination => "DESTINATION",
            EntityType::Park => "PARK",
            EntityType::Attraction => "ATTRACTION",
            EntityType::Show => "SHOW",
            EntityType::Restaurant => "RESTAURANT",
        }
    }

    /// Parse from the wire representation (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DESTINATION" => Some(EntityType::Destination),
            "PARK" => Some(EntityType::Park),
            "ATTRACTION" => Some(EntityType::Attraction),
            "SHOW" => Some(EntityType::Show),
            "RESTAURANT" => Some(EntityType::Restaurant),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain entity: an open JSON object with a few well-known fields
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Map<String, Value>);

impl Entity {
    /// Build the minimal entity shape shared by every producer
    pub fn base(id: &str, name: &str, entity_type: EntityType, timezone: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(FIELD_ID.to_string(), Value::from(id));
        fields.insert("name".to_string(), Value::from(name));
        fields.insert(FIELD_ENTITY_TYPE.to_string(), Value::from(entity_type.as_str()));
        fields.insert(FIELD_TIMEZONE.to_string(), Value::from(timezone));
        Self(fields)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get(FIELD_ID).and_then(Value::as_str)
    }

    pub fn entity_type(&self) -> Option<EntityType> {
        self.0.get(FIELD_ENTITY_TYPE).and_then(Value::as_str).and_then(EntityType::parse)
    }

    pub fn timezone(&self) -> Option<&str> {
        self.0.get(FIELD_TIMEZONE).and_then(Value::as_str)
    }

    pub fn destination_id(&self) -> Option<&str> {
        self.0.get(FIELD_DESTINATION_ID).and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }

    /// Fill a field only when the producer left it out
    pub fn set_default(&mut self, field: &str, value: impl Into<Value>) {
        self.0.entry(field.to_string()).or_insert_with(|| value.into());
    }

    /// Stamp the destination back-reference onto a child entity
    pub fn with_destination_id(mut self, destination_id: &str) -> Self {
        self.set(FIELD_DESTINATION_ID, destination_id);
        self
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Immutable snapshot of every entity beneath one destination.
///
/// Order: the destination first, then parks, attractions, shows, restaurants.
pub type EntityGraph = Arc<[Entity]>;
