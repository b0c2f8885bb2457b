//! Helios Tenancy
//!
//! Tenant isolation over a shared data store. Every record of an entity type
//! registered for tenant scoping is invisible to, and unwritable by, any
//! execution context that is not acting on behalf of that record's tenant.
//!
//! # Features
//!
//! - **Current tenant per execution context**: task-local inside explicit
//!   scopes, thread-local on plain threads, with scoped override-and-restore
//! - **Named query filters**: any number of filters per entity type, combined
//!   with AND and suspendable per entity type or globally
//! - **Tenant registration**: binds an entity type to its tenant attribute
//!   and installs an always-on `"tenant"` filter
//! - **Tenant enforcement**: write-once tenant attribute, auto-population,
//!   and cross-tenant association checks on every save
//!
//! Available store features:
//! - `sqlite` (default) - SQLite store with in-memory and file modes
//!
//! # Architecture
//!
//! - [`tenant`] - Current tenant, scoped overrides, fallback and id policies
//! - [`scope`] - Predicates, queries and the named filter registry
//! - [`entity`] - Entity schemas and records
//! - [`tenancy`] - Registration and the assembled [`Tenancy`]
//! - [`hooks`] / [`enforcement`] - The write pipeline and tenant enforcement
//! - [`repository`] - Filtered reads and enforced writes over a store
//! - [`core`] / [`backends`] - The store seam and its implementations
//! - [`config`] - Configuration from code, `serde`, environment or CLI
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use helios_tenancy::backends::MemoryStore;
//! use helios_tenancy::tenant::{self, TenantId};
//! use helios_tenancy::{EntitySchema, Queryable, Record, Repository, Tenancy, TenantScoping};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = Tenancy::builder();
//! builder
//!     .entity(EntitySchema::new("Account"))?
//!     .entity(EntitySchema::new("Project").belongs_to("account", "Account"))?
//!     .register_tenant_scoping("Project", TenantScoping::owned_by("Account"))?;
//! let tenancy = Arc::new(builder.build()?);
//! let repo = Repository::new(tenancy.clone(), MemoryStore::new());
//! let projects = tenancy.entity("Project");
//!
//! tenant::with_tenant_async(TenantId::new("a"), async {
//!     repo.save(&mut Record::new("Project").with("name", "foobar")).await
//! })
//! .await?;
//! tenant::with_tenant_async(TenantId::new("b"), async {
//!     repo.save(&mut Record::new("Project").with("name", "baz")).await
//! })
//! .await?;
//!
//! let seen_by_a = tenant::with_tenant_async(TenantId::new("a"), repo.find(projects.all())).await?;
//! assert_eq!(seen_by_a.len(), 1);
//! assert_eq!(seen_by_a[0].get_str("name"), Some("foobar"));
//!
//! let everything = repo.find(projects.unscoped()).await?;
//! assert_eq!(everything.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! # Propagation
//!
//! The tenant context does not follow spawned tasks on its own. Wrap the
//! spawned future with [`tenant::propagate`] at every asynchronous boundary.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backends;
pub mod config;
pub mod core;
pub mod enforcement;
pub mod entity;
pub mod error;
pub mod hooks;
pub mod repository;
pub mod scope;
pub mod tenancy;
pub mod tenant;

// Re-export commonly used types
pub use config::TenancyConfig;
pub use entity::{BelongsTo, EntitySchema, Record};
pub use error::{
    BackendError, ConfigurationError, TenancyError, TenancyResult, TenantError, ValidationDetail,
    ValidationError, ValidationErrors, ValidationKind,
};
pub use hooks::{HookContext, LifecycleHook};
pub use repository::Repository;
pub use tenancy::{
    EntityRef, Queryable, Tenancy, TenancyBuilder, TenantBinding, TenantScoped, TenantScoping,
};
pub use tenant::{TenantContext, TenantId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
