//! Write-pipeline hooks.
//!
//! A [`Repository`](crate::Repository) save runs the hooks registered for the
//! record's entity type in three phases, all strictly before the store is
//! called:
//!
//! 1. [`LifecycleHook::before_validation`] may adjust the record
//! 2. [`LifecycleHook::validate`] reports field-level failures; any failure
//!    aborts the save
//! 3. [`LifecycleHook::before_save`] may adjust the record one last time
//!
//! Any error returned by a hook aborts the save with nothing written.

use async_trait::async_trait;

use crate::core::EntityStore;
use crate::entity::{EntitySchema, Record};
use crate::error::{TenancyResult, ValidationErrors};
use crate::scope::Query;
use crate::tenancy::Tenancy;
use crate::tenant::{TenantContext, TenantId};

/// What a hook can see while a write is in progress.
///
/// The tenant context is the snapshot taken when the save started, so every
/// phase observes the same tenant and suppression state.
pub struct HookContext<'a> {
    tenancy: &'a Tenancy,
    schema: &'a EntitySchema,
    context: &'a TenantContext,
    store: &'a dyn EntityStore,
}

impl<'a> HookContext<'a> {
    /// Creates a hook context.
    pub fn new(
        tenancy: &'a Tenancy,
        schema: &'a EntitySchema,
        context: &'a TenantContext,
        store: &'a dyn EntityStore,
    ) -> Self {
        Self {
            tenancy,
            schema,
            context,
            store,
        }
    }

    /// The tenancy configuration.
    pub fn tenancy(&self) -> &Tenancy {
        self.tenancy
    }

    /// Schema of the record being written.
    pub fn schema(&self) -> &EntitySchema {
        self.schema
    }

    /// The tenant context the write runs in.
    pub fn context(&self) -> &TenantContext {
        self.context
    }

    /// The current tenant, or the fallback tenant when none is set.
    pub fn current_tenant(&self) -> Option<TenantId> {
        self.context
            .current()
            .cloned()
            .or_else(|| self.tenancy.fallback().fallback_tenant())
    }

    /// Runs a read through the normal, filtered access path.
    pub async fn select(&self, query: Query) -> TenancyResult<Vec<Record>> {
        let schema = self.tenancy.require_schema(query.entity())?;
        let query = self.tenancy.apply_filters_in(query, self.context)?;
        self.store.select(schema, &query).await
    }

    /// Checks existence through the normal, filtered access path.
    pub async fn exists(&self, query: Query) -> TenancyResult<bool> {
        let schema = self.tenancy.require_schema(query.entity())?;
        let query = self.tenancy.apply_filters_in(query, self.context)?;
        self.store.exists(schema, &query).await
    }
}

/// A participant in the write pipeline of one entity type.
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Runs before validation.
    fn before_validation(&self, _cx: &HookContext<'_>, _record: &mut Record) -> TenancyResult<()> {
        Ok(())
    }

    /// Adds field-level failures to `errors`. Returning an error instead
    /// aborts the save immediately.
    async fn validate(
        &self,
        _cx: &HookContext<'_>,
        _record: &Record,
        _errors: &mut ValidationErrors,
    ) -> TenancyResult<()> {
        Ok(())
    }

    /// Runs after validation, immediately before the store is called.
    fn before_save(&self, _cx: &HookContext<'_>, _record: &mut Record) -> TenancyResult<()> {
        Ok(())
    }
}
