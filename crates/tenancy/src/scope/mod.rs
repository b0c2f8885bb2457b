//! Named, composable, suspendable query filters.
//!
//! Any number of independent filters can be attached to one entity type's
//! query path. Each filter is a predicate-producing function; the filters of
//! an entity type are combined with AND in registration order, on top of the
//! caller's own conditions. A filter can be suspended for one entity type or
//! for all of them for the duration of a block.
//!
//! # Example
//!
//! ```
//! use helios_tenancy::scope::{FilterScope, Predicate, Query, ScopeRegistry};
//! use helios_tenancy::tenant::{NoFallback, TenantContext, TenantId};
//!
//! let mut registry = ScopeRegistry::new();
//! registry
//!     .register("Project", "tenant", |env| {
//!         Ok(Predicate::eq("account_id", env.require_tenant()?.to_value()))
//!     })
//!     .unwrap();
//!
//! let cx = TenantContext::for_tenant(TenantId::new("acme"));
//! let query = registry
//!     .apply_filters(Query::new("Project"), &cx, &NoFallback)
//!     .unwrap();
//! assert_eq!(query.conditions(), &[Predicate::eq("account_id", "acme")]);
//! ```

mod predicate;
mod query;
mod registry;
mod suspension;

pub use predicate::Predicate;
pub use query::{Query, SortOrder};
pub use registry::{FilterEnv, FilterFn, ScopeRegistry};
pub use suspension::{FilterScope, SuspensionGuard, suspend, with_suspended, with_suspended_async};

/// Name of the filter installed by tenant registration.
pub const TENANT_FILTER: &str = "tenant";

/// Name of an entity type's default filter.
pub const DEFAULT_FILTER: &str = "default";
