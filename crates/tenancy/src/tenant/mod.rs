//! Per-execution-context tenant state.
//!
//! This module holds the "current tenant" of an execution context and the
//! operations that read, replace and temporarily override it.
//!
//! # Core Types
//!
//! - [`TenantId`] - Opaque tenant identifier, an integer or string key
//! - [`TenantContext`] - Current tenant plus filter suppression flags of one context
//! - [`TenantGuard`] - Restores the enclosing tenant when dropped
//! - [`TenantFallback`] - Injectable policy for contexts without a tenant
//! - [`TenantIdPolicy`] - Validation rules for tenant identifiers
//!
//! # Examples
//!
//! ```
//! use helios_tenancy::tenant::{self, TenantId};
//!
//! tenant::with_tenant(TenantId::new("acme"), || {
//!     assert_eq!(tenant::current_tenant(), Some(TenantId::new("acme")));
//! });
//! assert_eq!(tenant::current_tenant(), None);
//! ```

pub(crate) mod context;
mod fallback;
mod id;
mod policy;

pub use context::{
    TenantContext, TenantGuard, current_tenant, enter_tenant, propagate, reset,
    set_current_tenant, with_tenant, with_tenant_async, without_scoping, without_scoping_async,
};
pub use fallback::{FixedTenant, NoFallback, TenantFallback};
pub use id::TenantId;
pub use policy::TenantIdPolicy;
