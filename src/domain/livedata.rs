//! Live data records and the live data schema
//!
//! A live data record is an open JSON object describing the current
//! operational state of one entity (status, queues, showtimes).

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smallvec::SmallVec;

pub const FIELD_RECORD_ID: &str = "id";
pub const FIELD_SHOWTIMES: &str = "showtimes";
pub const FIELD_START_TIME: &str = "startTime";

/// Operational status values accepted by the schema
pub const STATUS_VALUES: [&str; 4] = ["OPERATING", "DOWN", "CLOSED", "REFURBISHMENT"];

/// Queue types accepted under `queue`
const WAIT_QUEUES: [&str; 2] = ["STANDBY", "SINGLE_RIDER"];
const RETURN_QUEUES: [&str; 2] = ["RETURN_TIME", "PAID_RETURN_TIME"];
const BOARDING_GROUP_QUEUE: &str = "BOARDING_GROUP";
const RETURN_STATES: [&str; 3] = ["AVAILABLE", "TEMP_FULL", "FINISHED"];
const BOARDING_STATES: [&str; 3] = ["AVAILABLE", "PAUSED", "CLOSED"];

/// One live data update for a single entity
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LiveDataRecord(Map<String, Value>);

impl LiveDataRecord {
    /// Entity id this record targets, when the producer set one
    pub fn id(&self) -> Option<&str> {
        self.0.get(FIELD_RECORD_ID).and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Sort `showtimes` ascending by start time.
    ///
    /// Only entries with a parseable `startTime` move, and only among the
    /// positions those entries already occupy. Entries without one keep
    /// their index. The sort is stable for equal start times.
    pub fn normalize_showtimes(&mut self) {
        let Some(Value::Array(showtimes)) = self.0.get_mut(FIELD_SHOWTIMES) else {
            return;
        };

        let mut slots = Vec::new();
        let mut timed = Vec::new();
        for (idx, entry) in showtimes.iter().enumerate() {
            if let Some(start) = start_time(entry) {
                slots.push(idx);
                timed.push((start, entry.clone()));
            }
        }
        if timed.len() < 2 {
            return;
        }

        timed.sort_by_key(|(start, _)| *start);
        for (slot, (_, entry)) in slots.into_iter().zip(timed) {
            showtimes[slot] = entry;
        }
    }
}

impl From<Value> for LiveDataRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self(fields),
            _ => Self::default(),
        }
    }
}

/// Parse a showtime's `startTime` into an absolute instant
fn start_time(entry: &Value) -> Option<DateTime<FixedOffset>> {
    entry.get(FIELD_START_TIME).and_then(Value::as_str).and_then(parse_timestamp)
}

fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok()
}

/// A single field-level schema violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// JSON pointer to the offending field (empty for the record itself)
    pub path: String,
    pub message: String,
}

impl ValidationError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

pub type ValidationErrors = SmallVec<[ValidationError; 4]>;

/// Validates a live data record before it is persisted
pub trait LiveDataValidator: Send + Sync {
    /// Returns every violation found; empty means the record is valid
    fn validate(&self, record: &LiveDataRecord) -> ValidationErrors;
}

/// Built-in validator for the live data schema
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl LiveDataValidator for SchemaValidator {
    fn validate(&self, record: &LiveDataRecord) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        let fields = record.fields();

        if let Some(id) = fields.get(FIELD_RECORD_ID) {
            if !id.is_string() {
                errors.push(ValidationError::new("/id", "must be string"));
            }
        }

        match fields.get("status") {
            None => errors.push(ValidationError::new("", "must have required property 'status'")),
            Some(Value::String(s)) if STATUS_VALUES.contains(&s.as_str()) => {}
            Some(_) => errors.push(ValidationError::new(
                "/status",
                format!("must be equal to one of the allowed values: {}", STATUS_VALUES.join(", ")),
            )),
        }

        if let Some(queue) = fields.get("queue") {
            validate_queue(queue, &mut errors);
        }
        if let Some(showtimes) = fields.get(FIELD_SHOWTIMES) {
            validate_schedule("/showtimes", showtimes, &mut errors);
        }
        if let Some(hours) = fields.get("operatingHours") {
            validate_schedule("/operatingHours", hours, &mut errors);
        }
        if let Some(updated) = fields.get("lastUpdated") {
            validate_timestamp("/lastUpdated", updated, false, &mut errors);
        }

        errors
    }
}

fn validate_queue(queue: &Value, errors: &mut ValidationErrors) {
    let Some(queues) = queue.as_object() else {
        errors.push(ValidationError::new("/queue", "must be object"));
        return;
    };

    for (name, entry) in queues {
        let path = format!("/queue/{name}");
        let Some(entry) = entry.as_object() else {
            errors.push(ValidationError::new(path, "must be object"));
            continue;
        };

        if WAIT_QUEUES.contains(&name.as_str()) {
            match entry.get("waitTime") {
                None | Some(Value::Null) => {}
                Some(Value::Number(n)) if n.as_u64().is_some() => {}
                Some(_) => errors.push(ValidationError::new(
                    format!("{path}/waitTime"),
                    "must be a non-negative integer or null",
                )),
            }
        } else if RETURN_QUEUES.contains(&name.as_str()) {
            validate_enum(&format!("{path}/state"), entry.get("state"), &RETURN_STATES, errors);
            validate_timestamp(&format!("{path}/returnStart"), entry.get("returnStart").unwrap_or(&Value::Null), true, errors);
            validate_timestamp(&format!("{path}/returnEnd"), entry.get("returnEnd").unwrap_or(&Value::Null), true, errors);
        } else if name == BOARDING_GROUP_QUEUE {
            validate_enum(
                &format!("{path}/allocationStatus"),
                entry.get("allocationStatus"),
                &BOARDING_STATES,
                errors,
            );
        } else {
            errors.push(ValidationError::new(path, "unknown queue type"));
        }
    }
}

fn validate_enum(path: &str, value: Option<&Value>, allowed: &[&str], errors: &mut ValidationErrors) {
    match value {
        Some(Value::String(s)) if allowed.contains(&s.as_str()) => {}
        None => errors.push(ValidationError::new(path, "is required")),
        Some(_) => errors.push(ValidationError::new(
            path,
            format!("must be equal to one of the allowed values: {}", allowed.join(", ")),
        )),
    }
}

fn validate_timestamp(path: &str, value: &Value, nullable: bool, errors: &mut ValidationErrors) {
    match value {
        Value::Null if nullable => {}
        Value::String(s) if parse_timestamp(s).is_some() => {}
        Value::String(_) => errors.push(ValidationError::new(path, "must match format \"date-time\"")),
        _ => errors.push(ValidationError::new(path, "must be string")),
    }
}

/// Showtimes and operating hours share one shape: `{type, startTime, endTime}`
fn validate_schedule(path: &str, value: &Value, errors: &mut ValidationErrors) {
    let Some(entries) = value.as_array() else {
        errors.push(ValidationError::new(path, "must be array"));
        return;
    };

    for (idx, entry) in entries.iter().enumerate() {
        let entry_path = format!("{path}/{idx}");
        let Some(obj) = entry.as_object() else {
            errors.push(ValidationError::new(entry_path, "must be object"));
            continue;
        };
        match obj.get("type") {
            Some(Value::String(_)) => {}
            None => errors.push(ValidationError::new(&entry_path, "must have required property 'type'")),
            Some(_) => errors.push(ValidationError::new(format!("{entry_path}/type"), "must be string")),
        }
        for field in [FIELD_START_TIME, "endTime"] {
            if let Some(ts) = obj.get(field) {
                validate_timestamp(&format!("{entry_path}/{field}"), ts, true, errors);
            }
        }
    }
}
