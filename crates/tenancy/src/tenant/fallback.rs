//! Injectable fallback for contexts that never set a tenant.
//!
//! Scoped reads and auto-population fail with a missing-tenant error when no
//! tenant is set. Interactive or administrative contexts may prefer a
//! fallback instead; which one is a deployment decision, so it is passed to
//! [`TenancyBuilder::fallback`](crate::TenancyBuilder::fallback) rather than
//! built in.

use std::fmt;

use super::id::TenantId;

/// Supplies a tenant when the execution context has none.
pub trait TenantFallback: Send + Sync {
    /// Returns the tenant to act on behalf of, or `None` to fail the
    /// operation with a missing-tenant error.
    fn fallback_tenant(&self) -> Option<TenantId>;
}

/// Never supplies a tenant. This is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallback;

impl TenantFallback for NoFallback {
    fn fallback_tenant(&self) -> Option<TenantId> {
        None
    }
}

/// Always supplies the same tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedTenant(TenantId);

impl FixedTenant {
    /// Creates a fallback to `tenant`.
    pub fn new(tenant: impl Into<TenantId>) -> Self {
        Self(tenant.into())
    }

    /// Returns the fallback tenant.
    pub fn tenant(&self) -> &TenantId {
        &self.0
    }
}

impl TenantFallback for FixedTenant {
    fn fallback_tenant(&self) -> Option<TenantId> {
        Some(self.0.clone())
    }
}

impl<F> TenantFallback for F
where
    F: Fn() -> Option<TenantId> + Send + Sync,
{
    fn fallback_tenant(&self) -> Option<TenantId> {
        self()
    }
}

impl fmt::Debug for dyn TenantFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TenantFallback")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policies() {
        assert_eq!(NoFallback.fallback_tenant(), None);
        assert_eq!(
            FixedTenant::new("acme").fallback_tenant(),
            Some(TenantId::new("acme"))
        );

        let closure = || Some(TenantId::from(1));
        assert_eq!(closure.fallback_tenant(), Some(TenantId::from(1)));
    }
}
