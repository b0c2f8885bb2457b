//! In-process store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::core::{EntityStore, order_and_limit, record_key};
use crate::entity::{EntitySchema, Record};
use crate::error::{BackendError, TenancyResult};
use crate::scope::Query;

#[derive(Debug, Default)]
struct Table {
    // Insertion order is the natural result order.
    rows: Vec<(String, Map<String, Value>)>,
}

impl Table {
    fn position(&self, key: &str) -> Option<usize> {
        self.rows.iter().position(|(k, _)| k == key)
    }
}

/// Keeps records in memory, one table per entity type.
///
/// Useful for tests and for applications that want tenant scoping over
/// process-local data.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records of an entity type, ignoring all filters.
    pub fn len(&self, entity: &str) -> usize {
        self.tables.read().get(entity).map_or(0, |t| t.rows.len())
    }

    /// Returns `true` if the store holds no records of the entity type.
    pub fn is_empty(&self, entity: &str) -> bool {
        self.len(entity) == 0
    }

    fn matching(&self, schema: &EntitySchema, query: &Query) -> Vec<Record> {
        let predicate = query.predicate();
        self.tables
            .read()
            .get(schema.name())
            .map(|table| {
                table
                    .rows
                    .iter()
                    .filter(|(_, attrs)| predicate.matches(attrs))
                    .map(|(_, attrs)| Record::from_storage(schema.name(), attrs.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn primary_key<'a>(
    schema: &EntitySchema,
    attributes: &'a Map<String, Value>,
) -> TenancyResult<&'a Value> {
    attributes
        .get(schema.primary_key())
        .filter(|v| !v.is_null())
        .ok_or_else(|| {
            BackendError::QueryError {
                message: format!(
                    "{} record has no {} attribute",
                    schema.name(),
                    schema.primary_key()
                ),
            }
            .into()
        })
}

#[async_trait]
impl EntityStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn select(&self, schema: &EntitySchema, query: &Query) -> TenancyResult<Vec<Record>> {
        let mut records = self.matching(schema, query);
        order_and_limit(&mut records, query);
        Ok(records)
    }

    async fn count(&self, schema: &EntitySchema, query: &Query) -> TenancyResult<u64> {
        Ok(self.matching(schema, query).len() as u64)
    }

    async fn insert(
        &self,
        schema: &EntitySchema,
        attributes: &Map<String, Value>,
    ) -> TenancyResult<()> {
        let key = record_key(schema.name(), primary_key(schema, attributes)?)?;
        let mut tables = self.tables.write();
        let table = tables.entry(schema.name().to_string()).or_default();
        if table.position(&key).is_some() {
            return Err(BackendError::QueryError {
                message: format!("{}/{} already exists", schema.name(), key),
            }
            .into());
        }
        table.rows.push((key, attributes.clone()));
        Ok(())
    }

    async fn update(
        &self,
        schema: &EntitySchema,
        id: &Value,
        attributes: &Map<String, Value>,
    ) -> TenancyResult<()> {
        let key = record_key(schema.name(), id)?;
        let mut tables = self.tables.write();
        let row = tables
            .get_mut(schema.name())
            .and_then(|table| table.position(&key).map(|i| &mut table.rows[i]));
        match row {
            Some((_, stored)) => {
                *stored = attributes.clone();
                Ok(())
            }
            None => Err(BackendError::RecordNotFound {
                entity: schema.name().to_string(),
                id: key,
            }
            .into()),
        }
    }

    async fn delete(&self, schema: &EntitySchema, id: &Value) -> TenancyResult<bool> {
        let key = record_key(schema.name(), id)?;
        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(schema.name()) else {
            return Ok(false);
        };
        match table.position(&key) {
            Some(i) => {
                table.rows.remove(i);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
