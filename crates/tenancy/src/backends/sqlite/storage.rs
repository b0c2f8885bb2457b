//! EntityStore implementation for SQLite.

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{ErrorCode, params_from_iter};
use serde_json::{Map, Value};

use crate::core::{EntityStore, record_key};
use crate::entity::{EntitySchema, Record};
use crate::error::{BackendError, TenancyError, TenancyResult};
use crate::scope::{Predicate, Query, SortOrder};

use super::SqliteStore;

fn internal_error(message: String) -> TenancyError {
    TenancyError::Backend(BackendError::Internal {
        backend_name: "sqlite".to_string(),
        message,
        source: None,
    })
}

fn serialization_error(message: String) -> TenancyError {
    TenancyError::Backend(BackendError::SerializationError { message })
}

/// JSON path addressing one top-level attribute.
fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('\\', "\\\\").replace('"', "\\\""))
}

/// A WHERE clause fragment and its positional parameters.
#[derive(Debug, Default)]
struct SqlFilter {
    params: Vec<SqlValue>,
}

impl SqlFilter {
    fn compile(&mut self, predicate: &Predicate) -> TenancyResult<String> {
        match predicate {
            Predicate::Eq { field, value } => self.compile_eq(field, value),
            Predicate::IsNull { field } => {
                self.params.push(SqlValue::Text(json_path(field)));
                Ok("json_extract(data, ?) IS NULL".to_string())
            }
            Predicate::And(parts) if parts.is_empty() => Ok("1".to_string()),
            Predicate::Or(parts) if parts.is_empty() => Ok("0".to_string()),
            Predicate::And(parts) => self.compile_joined(parts, " AND "),
            Predicate::Or(parts) => self.compile_joined(parts, " OR "),
        }
    }

    fn compile_eq(&mut self, field: &str, value: &Value) -> TenancyResult<String> {
        let bound = match value {
            // Equality with null never holds.
            Value::Null => return Ok("0".to_string()),
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().ok_or_else(|| {
                    serialization_error(format!("unsupported number {} for {}", n, field))
                })?),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
        };
        self.params.push(SqlValue::Text(json_path(field)));
        self.params.push(bound);
        Ok("json_extract(data, ?) = ?".to_string())
    }

    fn compile_joined(&mut self, parts: &[Predicate], sep: &str) -> TenancyResult<String> {
        let clauses = parts
            .iter()
            .map(|p| self.compile(p))
            .collect::<TenancyResult<Vec<_>>>()?;
        Ok(format!("({})", clauses.join(sep)))
    }
}

/// Builds `FROM records WHERE ...` for a query, without ordering.
fn where_clause(schema: &EntitySchema, query: &Query) -> TenancyResult<(String, Vec<SqlValue>)> {
    let mut filter = SqlFilter::default();
    filter.params.push(SqlValue::Text(schema.name().to_string()));
    let condition = filter.compile(&query.predicate())?;
    Ok((
        format!("FROM records WHERE entity = ? AND {}", condition),
        filter.params,
    ))
}

fn parse_document(entity: &str, data: &str) -> TenancyResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(attributes)) => Ok(attributes),
        Ok(_) => Err(serialization_error(format!(
            "stored {} document is not an object",
            entity
        ))),
        Err(e) => Err(serialization_error(format!(
            "Failed to parse stored {} document: {}",
            entity, e
        ))),
    }
}

#[async_trait]
impl EntityStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn select(&self, schema: &EntitySchema, query: &Query) -> TenancyResult<Vec<Record>> {
        let (from_where, mut params) = where_clause(schema, query)?;
        let mut sql = format!("SELECT data {}", from_where);

        match query.ordering() {
            Some((field, order)) => {
                let direction = match order {
                    SortOrder::Ascending => "ASC",
                    SortOrder::Descending => "DESC",
                };
                sql.push_str(&format!(" ORDER BY json_extract(data, ?) {}, rowid", direction));
                params.push(SqlValue::Text(json_path(field)));
            }
            None => sql.push_str(" ORDER BY rowid"),
        }
        if let Some(limit) = query.max_results() {
            sql.push_str(" LIMIT ?");
            params.push(SqlValue::Integer(limit as i64));
        }

        tracing::trace!(sql = %sql, "sqlite select");

        let conn = self.get_connection()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| internal_error(format!("Failed to prepare select: {}", e)))?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| row.get::<_, String>(0))
            .map_err(|e| internal_error(format!("Failed to run select: {}", e)))?;

        let mut records = Vec::new();
        for row in rows {
            let data = row.map_err(|e| internal_error(format!("Failed to read row: {}", e)))?;
            records.push(Record::from_storage(
                schema.name(),
                parse_document(schema.name(), &data)?,
            ));
        }
        Ok(records)
    }

    async fn count(&self, schema: &EntitySchema, query: &Query) -> TenancyResult<u64> {
        let (from_where, params) = where_clause(schema, query)?;
        let sql = format!("SELECT COUNT(*) {}", from_where);
        let conn = self.get_connection()?;
        let count: i64 = conn
            .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))
            .map_err(|e| internal_error(format!("Failed to count records: {}", e)))?;
        Ok(count as u64)
    }

    async fn exists(&self, schema: &EntitySchema, query: &Query) -> TenancyResult<bool> {
        let (from_where, params) = where_clause(schema, query)?;
        let sql = format!("SELECT EXISTS (SELECT 1 {})", from_where);
        let conn = self.get_connection()?;
        let exists: bool = conn
            .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))
            .map_err(|e| internal_error(format!("Failed to check existence: {}", e)))?;
        Ok(exists)
    }

    async fn insert(
        &self,
        schema: &EntitySchema,
        attributes: &Map<String, Value>,
    ) -> TenancyResult<()> {
        let id = attributes
            .get(schema.primary_key())
            .filter(|v| !v.is_null())
            .ok_or_else(|| {
                TenancyError::Backend(BackendError::QueryError {
                    message: format!(
                        "{} record has no {} attribute",
                        schema.name(),
                        schema.primary_key()
                    ),
                })
            })?;
        let key = record_key(schema.name(), id)?;
        let data = serde_json::to_string(attributes)?;
        let now = chrono::Utc::now().to_rfc3339();

        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO records (entity, id, data, updated_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![schema.name(), key, data, now],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                TenancyError::Backend(BackendError::QueryError {
                    message: format!("{}/{} already exists", schema.name(), key),
                })
            }
            _ => internal_error(format!("Failed to insert record: {}", e)),
        })?;

        Ok(())
    }

    async fn update(
        &self,
        schema: &EntitySchema,
        id: &Value,
        attributes: &Map<String, Value>,
    ) -> TenancyResult<()> {
        let key = record_key(schema.name(), id)?;
        let data = serde_json::to_string(attributes)?;
        let now = chrono::Utc::now().to_rfc3339();

        let conn = self.get_connection()?;
        let changed = conn
            .execute(
                "UPDATE records SET data = ?1, updated_at = ?2 WHERE entity = ?3 AND id = ?4",
                rusqlite::params![data, now, schema.name(), key],
            )
            .map_err(|e| internal_error(format!("Failed to update record: {}", e)))?;

        if changed == 0 {
            return Err(TenancyError::Backend(BackendError::RecordNotFound {
                entity: schema.name().to_string(),
                id: key,
            }));
        }
        Ok(())
    }

    async fn delete(&self, schema: &EntitySchema, id: &Value) -> TenancyResult<bool> {
        let key = record_key(schema.name(), id)?;
        let conn = self.get_connection()?;
        let changed = conn
            .execute(
                "DELETE FROM records WHERE entity = ?1 AND id = ?2",
                rusqlite::params![schema.name(), key],
            )
            .map_err(|e| internal_error(format!("Failed to delete record: {}", e)))?;
        Ok(changed > 0)
    }
}
