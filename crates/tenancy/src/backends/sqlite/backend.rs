//! SQLite store setup.

use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, TenancyError, TenancyResult};

use super::schema;

/// Stores records as JSON documents in SQLite.
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteStoreConfig,
    is_memory: bool,
}

impl Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for file databases.
    #[serde(default = "default_true")]
    pub enable_wal: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
        }
    }
}

impl SqliteStore {
    /// Creates a store over a private in-memory database.
    pub fn in_memory() -> TenancyResult<Self> {
        // Every connection to ":memory:" opens a separate database, so the
        // pool is limited to one.
        let config = SqliteStoreConfig {
            max_connections: 1,
            ..Default::default()
        };
        Self::build(SqliteConnectionManager::memory(), config, true)
    }

    /// Opens or creates a file-based database.
    pub fn open<P: AsRef<Path>>(path: P) -> TenancyResult<Self> {
        Self::with_config(path, SqliteStoreConfig::default())
    }

    /// Opens a file-based database with custom configuration.
    pub fn with_config<P: AsRef<Path>>(path: P, config: SqliteStoreConfig) -> TenancyResult<Self> {
        Self::build(SqliteConnectionManager::file(path.as_ref()), config, false)
    }

    fn build(
        manager: SqliteConnectionManager,
        config: SqliteStoreConfig,
        is_memory: bool,
    ) -> TenancyResult<Self> {
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms as u64);
        let enable_wal = config.enable_wal && !is_memory;
        let manager = manager.with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            if enable_wal {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            }
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .build(manager)
            .map_err(|e| {
                TenancyError::Backend(BackendError::ConnectionFailed {
                    backend_name: "sqlite".to_string(),
                    message: e.to_string(),
                })
            })?;

        tracing::debug!(
            is_memory,
            max_connections = config.max_connections,
            "opened sqlite store"
        );

        Ok(Self {
            pool,
            config,
            is_memory,
        })
    }

    /// Creates or migrates the database schema.
    pub fn init_schema(&self) -> TenancyResult<()> {
        let conn = self.get_connection()?;
        schema::initialize_schema(&conn)
    }

    /// Get a connection from the pool.
    pub(crate) fn get_connection(
        &self,
    ) -> TenancyResult<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            TenancyError::Backend(BackendError::ConnectionFailed {
                backend_name: "sqlite".to_string(),
                message: e.to_string(),
            })
        })
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }
}
