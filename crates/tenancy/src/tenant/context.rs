//! Execution-context tenant state.
//!
//! Every execution context owns one [`TenantContext`]: the current tenant plus
//! the filter suppression flags. Inside an explicit scope (see
//! [`TenantContext::scope`]) the value lives in a tokio task-local and travels
//! with the task across worker threads. Outside of any scope, plain threads
//! keep it in a thread-local. Code running on a tokio runtime outside of a
//! scope has no context at all: reads see an empty context and changes are
//! dropped with a warning, since a worker thread is shared by many tasks.
//! Enter a scope at every request boundary.
//!
//! Spawned tasks do not inherit the context. Propagate it explicitly:
//!
//! ```
//! use helios_tenancy::tenant::{self, TenantId};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! tenant::with_tenant_async(TenantId::new("acme"), async {
//!     let handle = tokio::spawn(tenant::propagate(async { tenant::current_tenant() }));
//!     assert_eq!(handle.await.unwrap(), Some(TenantId::new("acme")));
//! })
//! .await;
//! # }
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;

use super::id::TenantId;
use crate::scope::{FilterScope, TENANT_FILTER};

tokio::task_local! {
    static TASK_CONTEXT: RefCell<TenantContext>;
}

thread_local! {
    static THREAD_CONTEXT: RefCell<TenantContext> = RefCell::new(TenantContext::default());
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SuppressionKey {
    scope: FilterScope,
    filter: String,
}

/// Tenant state owned by one execution context.
///
/// Cloning a context takes a snapshot; mutating the snapshot never affects
/// the context it was taken from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TenantContext {
    current: Option<TenantId>,
    suppressed: HashMap<SuppressionKey, bool>,
}

impl TenantContext {
    /// Creates an empty context with no tenant and no suppressed filters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context acting on behalf of the given tenant.
    pub fn for_tenant(tenant: TenantId) -> Self {
        Self {
            current: Some(tenant),
            suppressed: HashMap::new(),
        }
    }

    /// Returns the current tenant of this context.
    pub fn current(&self) -> Option<&TenantId> {
        self.current.as_ref()
    }

    /// Replaces the current tenant of this context.
    pub fn set_current(&mut self, tenant: Option<TenantId>) {
        self.current = tenant;
    }

    /// Returns `true` if `filter` is suspended for `entity`, either for that
    /// entity type alone or globally.
    pub fn is_suppressed(&self, entity: &str, filter: &str) -> bool {
        self.flag(&FilterScope::All, filter)
            || self.flag(&FilterScope::Entity(entity.to_string()), filter)
    }

    /// Returns `true` if the tenant filter is suspended for `entity`.
    pub fn is_tenant_scoping_suspended(&self, entity: &str) -> bool {
        self.is_suppressed(entity, TENANT_FILTER)
    }

    /// Sets the suppression flag for `filter` within `scope`.
    pub fn suppress(&mut self, filter: impl Into<String>, scope: FilterScope) {
        self.set_suppression(scope, filter.into(), Some(true));
    }

    fn flag(&self, scope: &FilterScope, filter: &str) -> bool {
        self.suppression(scope, filter).unwrap_or(false)
    }

    pub(crate) fn suppression(&self, scope: &FilterScope, filter: &str) -> Option<bool> {
        self.suppressed
            .get(&SuppressionKey {
                scope: scope.clone(),
                filter: filter.to_string(),
            })
            .copied()
    }

    pub(crate) fn set_suppression(&mut self, scope: FilterScope, filter: String, flag: Option<bool>) {
        let key = SuppressionKey { scope, filter };
        match flag {
            Some(flag) => {
                self.suppressed.insert(key, flag);
            }
            None => {
                self.suppressed.remove(&key);
            }
        }
    }

    /// Takes a snapshot of the calling execution context.
    pub fn snapshot() -> Self {
        with_active(|cx| cx.clone())
    }

    /// Runs `fut` with this value as its execution context.
    ///
    /// The calling context is untouched; changes made inside `fut` are
    /// discarded when it completes.
    pub fn scope<F: Future>(self, fut: F) -> impl Future<Output = F::Output> {
        TASK_CONTEXT.scope(RefCell::new(self), fut)
    }

    /// Runs the synchronous closure `f` with this value as its execution context.
    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        TASK_CONTEXT.sync_scope(RefCell::new(self), f)
    }
}

enum Active {
    Task,
    Thread,
    Detached,
}

fn active() -> Active {
    if TASK_CONTEXT.try_with(|_| ()).is_ok() {
        Active::Task
    } else if tokio::runtime::Handle::try_current().is_ok() {
        Active::Detached
    } else {
        Active::Thread
    }
}

/// Runs `f` against the context of the caller: the task-local one inside a
/// scope, the thread-local one on a plain thread, and a throwaway empty one
/// on a runtime thread outside of any scope.
pub(crate) fn with_active<R>(f: impl FnOnce(&mut TenantContext) -> R) -> R {
    match active() {
        Active::Task => TASK_CONTEXT.with(|cell| f(&mut cell.borrow_mut())),
        Active::Thread => THREAD_CONTEXT.with(|cell| f(&mut cell.borrow_mut())),
        Active::Detached => f(&mut TenantContext::default()),
    }
}

/// Like [`with_active`], for changes to the context. A change made on a
/// runtime thread outside of any scope is dropped.
pub(crate) fn modify_active<R>(f: impl FnOnce(&mut TenantContext) -> R) -> R {
    if matches!(active(), Active::Detached) {
        tracing::warn!(
            "tenant context changed outside of a task scope on an async runtime; \
             change ignored, enter TenantContext::scope at the request boundary"
        );
    }
    with_active(f)
}

/// Returns the current tenant of the calling execution context.
pub fn current_tenant() -> Option<TenantId> {
    with_active(|cx| cx.current.clone())
}

/// Replaces the current tenant unconditionally.
///
/// On a runtime thread outside of any scope the change is ignored.
pub fn set_current_tenant(tenant: Option<TenantId>) {
    modify_active(|cx| cx.current = tenant);
}

/// Clears the tenant and every suppression flag of the calling context.
///
/// Intended for request-boundary hooks that reuse threads between requests.
/// On a runtime thread outside of any scope there is nothing to clear.
pub fn reset() {
    if !matches!(active(), Active::Detached) {
        with_active(|cx| *cx = TenantContext::default());
    }
}

/// Restores the previous tenant when dropped.
#[must_use = "the previous tenant is restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct TenantGuard {
    previous: Option<TenantId>,
    // Restoration must happen on the context that created the guard.
    _not_send: PhantomData<*const ()>,
}

impl Drop for TenantGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        modify_active(|cx| cx.current = previous);
    }
}

/// Sets the current tenant until the returned guard is dropped.
///
/// On a runtime thread outside of any scope the change is ignored.
pub fn enter_tenant(tenant: TenantId) -> TenantGuard {
    let previous = modify_active(|cx| cx.current.replace(tenant));
    TenantGuard {
        previous,
        _not_send: PhantomData,
    }
}

/// Runs `f` on behalf of `tenant`, restoring the enclosing tenant on every
/// exit path, including unwinding.
///
/// ```
/// use helios_tenancy::tenant::{self, TenantId};
///
/// tenant::with_tenant(TenantId::new("a"), || {
///     tenant::with_tenant(TenantId::new("b"), || {
///         assert_eq!(tenant::current_tenant(), Some(TenantId::new("b")));
///     });
///     assert_eq!(tenant::current_tenant(), Some(TenantId::new("a")));
/// });
/// ```
pub fn with_tenant<R>(tenant: TenantId, f: impl FnOnce() -> R) -> R {
    let mut cx = TenantContext::snapshot();
    cx.set_current(Some(tenant));
    cx.sync_scope(f)
}

/// Async form of [`with_tenant`]: `fut` runs in its own scope derived from
/// the caller's context with `tenant` as the current tenant.
pub async fn with_tenant_async<F: Future>(tenant: TenantId, fut: F) -> F::Output {
    let mut cx = TenantContext::snapshot();
    cx.set_current(Some(tenant));
    cx.scope(fut).await
}

/// Runs `f` with the tenant filter suspended for every entity type.
pub fn without_scoping<R>(f: impl FnOnce() -> R) -> R {
    crate::scope::with_suspended(TENANT_FILTER, FilterScope::All, f)
}

/// Async form of [`without_scoping`].
pub async fn without_scoping_async<F: Future>(fut: F) -> F::Output {
    crate::scope::with_suspended_async(TENANT_FILTER, FilterScope::All, fut).await
}

/// Wraps `fut` so that it runs with a snapshot of the caller's context.
///
/// Use it at every asynchronous boundary that starts a new task.
pub fn propagate<F: Future>(fut: F) -> impl Future<Output = F::Output> {
    TenantContext::snapshot().scope(fut)
}
