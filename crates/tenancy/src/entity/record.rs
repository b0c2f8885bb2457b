//! Entity instances.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{BackendError, TenancyResult};

/// One instance of an entity type, held as JSON attributes.
///
/// A record remembers the attribute values it had when it was last loaded
/// or saved. That snapshot is what write protection compares against: a
/// record without one has never been persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity: String,
    attributes: Map<String, Value>,
    stored: Option<Map<String, Value>>,
}

impl Record {
    /// Creates a new, unsaved record.
    pub fn new(entity: impl Into<String>) -> Self {
        Self::from_attributes(entity, Map::new())
    }

    /// Creates a new, unsaved record from attributes.
    pub fn from_attributes(entity: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            entity: entity.into(),
            attributes,
            stored: None,
        }
    }

    /// Rebuilds a persisted record from what a store returned.
    pub fn from_storage(entity: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            entity: entity.into(),
            stored: Some(attributes.clone()),
            attributes,
        }
    }

    /// Creates a new, unsaved record from a serializable struct.
    pub fn from_typed<T: Serialize>(entity: impl Into<String>, value: &T) -> TenancyResult<Self> {
        let entity = entity.into();
        match serde_json::to_value(value)? {
            Value::Object(attributes) => Ok(Self::from_attributes(entity, attributes)),
            other => Err(BackendError::SerializationError {
                message: format!("{} must serialize to an object, got {}", entity, other),
            }
            .into()),
        }
    }

    /// Deserializes the attributes into a struct.
    pub fn to_typed<T: DeserializeOwned>(&self) -> TenancyResult<T> {
        Ok(serde_json::from_value(Value::Object(self.attributes.clone()))?)
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Entity type name.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Current attribute values.
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Consumes the record, returning its attributes.
    pub fn into_attributes(self) -> Map<String, Value> {
        self.attributes
    }

    /// Returns an attribute, treating JSON null as absent.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field).filter(|v| !v.is_null())
    }

    /// Returns a string attribute.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Writes an attribute without any tenant checks.
    ///
    /// Writes to a tenant attribute are still checked when the record is
    /// saved; use [`Tenancy::assign`](crate::Tenancy::assign) to be told
    /// at assignment time.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(field.into(), value.into());
    }

    /// Returns `true` once the record has been loaded from or written to a store.
    pub fn is_persisted(&self) -> bool {
        self.stored.is_some()
    }

    /// Returns the value an attribute had when the record was last persisted.
    pub fn stored_value(&self, field: &str) -> Option<&Value> {
        self.stored
            .as_ref()
            .and_then(|stored| stored.get(field))
            .filter(|v| !v.is_null())
    }

    /// Returns `true` if an attribute differs from its persisted value.
    pub fn is_changed(&self, field: &str) -> bool {
        self.get(field) != self.stored_value(field)
    }

    /// Records the current attributes as persisted.
    pub(crate) fn mark_persisted(&mut self) {
        self.stored = Some(self.attributes.clone());
    }
}
