//! Store implementations.
//!
//! | Store | Feature | Description |
//! |-------|---------|-------------|
//! | Memory | always | Process-local tables, useful for tests |
//! | SQLite | `sqlite` | Embedded database holding JSON documents |
//!
//! # Example
//!
//! ```no_run
//! use helios_tenancy::backends::MemoryStore;
//! # #[cfg(feature = "sqlite")]
//! use helios_tenancy::backends::sqlite::SqliteStore;
//!
//! let store = MemoryStore::new();
//!
//! # #[cfg(feature = "sqlite")]
//! # fn sqlite() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::open("./data/tenancy.db")?;
//! store.init_schema()?;
//! # Ok(())
//! # }
//! ```

mod memory;

pub use memory::MemoryStore;

#[cfg(feature = "sqlite")]
pub mod sqlite;
