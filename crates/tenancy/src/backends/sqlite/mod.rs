//! SQLite store.
//!
//! Records of every entity type share one table and are kept as JSON
//! documents. Predicates are compiled to `json_extract` conditions with bound
//! parameters, so attribute values never reach the SQL text.
//!
//! # Example
//!
//! ```no_run
//! use helios_tenancy::backends::sqlite::SqliteStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::in_memory()?;
//! store.init_schema()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE records (
//!     entity TEXT NOT NULL,
//!     id TEXT NOT NULL,
//!     data TEXT NOT NULL,  -- JSON attributes
//!     updated_at TEXT NOT NULL,
//!     PRIMARY KEY (entity, id)
//! );
//! ```

mod backend;
mod schema;
mod storage;

pub use backend::{SqliteStore, SqliteStoreConfig};
pub use schema::SCHEMA_VERSION;
