//! Reentrant filter suspension.
//!
//! Suspending a filter sets a flag on the calling execution context and puts
//! the previous flag back when the block exits. Because every suspension keeps
//! its own saved value, nested suspensions unwind like a stack.

use std::future::Future;
use std::marker::PhantomData;

use crate::tenant::TenantContext;
use crate::tenant::context::modify_active;

/// Where a suspension applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterScope {
    /// Every entity type.
    All,
    /// One entity type.
    Entity(String),
}

impl FilterScope {
    /// Shorthand for [`FilterScope::Entity`].
    pub fn entity(name: impl Into<String>) -> Self {
        FilterScope::Entity(name.into())
    }
}

/// Restores the previous suppression flag when dropped.
#[must_use = "the filter is resumed as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SuspensionGuard {
    filter: String,
    scope: FilterScope,
    previous: Option<bool>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for SuspensionGuard {
    fn drop(&mut self) {
        let filter = std::mem::take(&mut self.filter);
        let scope = self.scope.clone();
        let previous = self.previous;
        modify_active(|cx| cx.set_suppression(scope, filter, previous));
    }
}

/// Suspends `filter` within `scope` until the returned guard is dropped.
pub fn suspend(filter: impl Into<String>, scope: FilterScope) -> SuspensionGuard {
    let filter = filter.into();
    let previous = modify_active(|cx| {
        let previous = cx.suppression(&scope, &filter);
        cx.set_suppression(scope.clone(), filter.clone(), Some(true));
        previous
    });
    tracing::trace!(filter = %filter, scope = ?scope, "filter suspended");
    SuspensionGuard {
        filter,
        scope,
        previous,
        _not_send: PhantomData,
    }
}

/// Runs `f` with `filter` suspended within `scope`.
///
/// `f` runs in its own scope derived from the caller's context, so the
/// previous state is back on every exit path.
///
/// ```
/// use helios_tenancy::scope::{self, FilterScope};
/// use helios_tenancy::tenant::TenantContext;
///
/// scope::with_suspended("tenant", FilterScope::entity("Project"), || {
///     let cx = TenantContext::snapshot();
///     assert!(cx.is_suppressed("Project", "tenant"));
///     assert!(!cx.is_suppressed("Task", "tenant"));
/// });
/// assert!(!TenantContext::snapshot().is_suppressed("Project", "tenant"));
/// ```
pub fn with_suspended<R>(filter: &str, scope: FilterScope, f: impl FnOnce() -> R) -> R {
    let mut cx = TenantContext::snapshot();
    cx.suppress(filter, scope);
    cx.sync_scope(f)
}

/// Async form of [`with_suspended`]: `fut` runs in its own scope derived
/// from the caller's context.
pub async fn with_suspended_async<F: Future>(filter: &str, scope: FilterScope, fut: F) -> F::Output {
    let mut cx = TenantContext::snapshot();
    cx.suppress(filter, scope);
    cx.scope(fut).await
}
