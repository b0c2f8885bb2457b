//! SQLite schema definitions and migrations.

use rusqlite::Connection;

use crate::error::{BackendError, TenancyError, TenancyResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

fn internal_error(message: String) -> TenancyError {
    TenancyError::Backend(BackendError::Internal {
        backend_name: "sqlite".to_string(),
        message,
        source: None,
    })
}

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> TenancyResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
        tracing::info!(version = SCHEMA_VERSION, "created sqlite schema");
    } else if current_version > SCHEMA_VERSION {
        return Err(internal_error(format!(
            "database schema version {} is newer than supported version {}",
            current_version, SCHEMA_VERSION
        )));
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> TenancyResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| internal_error(format!("Failed to create schema_version table: {}", e)))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> TenancyResult<()> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| internal_error(format!("Failed to clear schema_version: {}", e)))?;

    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
        .map_err(|e| internal_error(format!("Failed to set schema_version: {}", e)))?;

    Ok(())
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> TenancyResult<()> {
    // One table for every entity type; attributes live in the JSON document.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS records (
            entity TEXT NOT NULL,
            id TEXT NOT NULL,
            data TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (entity, id)
        )",
        [],
    )
    .map_err(|e| internal_error(format!("Failed to create records table: {}", e)))?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_entity ON records (entity)",
        [],
    )
    .map_err(|e| internal_error(format!("Failed to create records index: {}", e)))?;

    Ok(())
}
