//! Persistence seam.
//!
//! This module defines the [`EntityStore`] trait, the persistence collaborator
//! the tenancy layer delegates to. Stores know nothing about tenants: every
//! query they receive has already been rewritten by the scope registry, and
//! every record they are asked to write has already been stamped and
//! validated by the lifecycle hooks.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::entity::{EntitySchema, Record};
use crate::error::{BackendError, TenancyResult};
use crate::scope::{Query, SortOrder};

/// Storage operations over JSON records.
///
/// # Example
///
/// ```ignore
/// use helios_tenancy::core::EntityStore;
/// use helios_tenancy::scope::Query;
/// use helios_tenancy::EntitySchema;
///
/// async fn names<S: EntityStore>(store: &S) -> helios_tenancy::TenancyResult<Vec<String>> {
///     let schema = EntitySchema::new("Project");
///     let records = store.select(&schema, &Query::new("Project").unscoped()).await?;
///     Ok(records.iter().filter_map(|r| r.get_str("name").map(String::from)).collect())
/// }
/// ```
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Returns a human-readable name for this store.
    fn backend_name(&self) -> &'static str;

    /// Returns the records matching every condition of `query`, honoring
    /// its ordering and limit.
    async fn select(&self, schema: &EntitySchema, query: &Query) -> TenancyResult<Vec<Record>>;

    /// Counts the records matching `query`. Ordering and limit are ignored.
    async fn count(&self, schema: &EntitySchema, query: &Query) -> TenancyResult<u64>;

    /// Returns `true` if at least one record matches `query`.
    async fn exists(&self, schema: &EntitySchema, query: &Query) -> TenancyResult<bool> {
        Ok(self.count(schema, query).await? > 0)
    }

    /// Inserts a new record. The attributes must contain the primary key.
    async fn insert(
        &self,
        schema: &EntitySchema,
        attributes: &Map<String, Value>,
    ) -> TenancyResult<()>;

    /// Replaces the attributes of the record with primary key `id`.
    ///
    /// Returns [`BackendError::RecordNotFound`] if no such record exists.
    async fn update(
        &self,
        schema: &EntitySchema,
        id: &Value,
        attributes: &Map<String, Value>,
    ) -> TenancyResult<()>;

    /// Removes the record with primary key `id`. Returns `false` if it did
    /// not exist.
    async fn delete(&self, schema: &EntitySchema, id: &Value) -> TenancyResult<bool>;
}

#[async_trait]
impl<T: EntityStore + ?Sized> EntityStore for Arc<T> {
    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }

    async fn select(&self, schema: &EntitySchema, query: &Query) -> TenancyResult<Vec<Record>> {
        (**self).select(schema, query).await
    }

    async fn count(&self, schema: &EntitySchema, query: &Query) -> TenancyResult<u64> {
        (**self).count(schema, query).await
    }

    async fn exists(&self, schema: &EntitySchema, query: &Query) -> TenancyResult<bool> {
        (**self).exists(schema, query).await
    }

    async fn insert(
        &self,
        schema: &EntitySchema,
        attributes: &Map<String, Value>,
    ) -> TenancyResult<()> {
        (**self).insert(schema, attributes).await
    }

    async fn update(
        &self,
        schema: &EntitySchema,
        id: &Value,
        attributes: &Map<String, Value>,
    ) -> TenancyResult<()> {
        (**self).update(schema, id, attributes).await
    }

    async fn delete(&self, schema: &EntitySchema, id: &Value) -> TenancyResult<bool> {
        (**self).delete(schema, id).await
    }
}

/// Canonical text form of a primary key value.
///
/// Strings are used verbatim, integers in decimal. Other JSON types cannot be
/// primary keys.
pub fn record_key(entity: &str, id: &Value) -> TenancyResult<String> {
    match id {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        other => Err(BackendError::QueryError {
            message: format!("{} primary key must be a string or integer, got {}", entity, other),
        }
        .into()),
    }
}

/// Orders two attribute values the way the stores sort them: nulls first,
/// then numbers, then strings, then booleans.
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Bool(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Sorts and truncates in-memory results according to `query`.
pub(crate) fn order_and_limit(records: &mut Vec<Record>, query: &Query) {
    if let Some((field, order)) = query.ordering() {
        records.sort_by(|a, b| {
            let ordering = compare_values(a.attributes().get(field), b.attributes().get(field));
            match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });
    }
    if let Some(limit) = query.max_results() {
        records.truncate(limit);
    }
}
