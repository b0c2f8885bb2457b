//! Tenant-scoped access to a store.
//!
//! [`Repository`] is the only path between callers and an [`EntityStore`]:
//! reads go through the scope registry, writes go through the lifecycle hooks
//! of the record's entity type.

use std::sync::Arc;

use serde_json::Value;

use crate::core::EntityStore;
use crate::entity::{EntitySchema, Record};
use crate::error::{BackendError, TenancyResult, TenantError, ValidationErrors};
use crate::hooks::HookContext;
use crate::scope::{Predicate, Query, SortOrder};
use crate::tenancy::Tenancy;
use crate::tenant::{TenantContext, TenantId};

/// Reads and writes records through the tenancy rules.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use helios_tenancy::backends::MemoryStore;
/// use helios_tenancy::tenant::{self, TenantId};
/// use helios_tenancy::{EntitySchema, Queryable, Record, Repository, Tenancy, TenantScoping};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut builder = Tenancy::builder();
/// builder
///     .entity(EntitySchema::new("Account"))?
///     .entity(EntitySchema::new("Project").belongs_to("account", "Account"))?
///     .register_tenant_scoping("Project", TenantScoping::owned_by("Account"))?;
/// let tenancy = Arc::new(builder.build()?);
/// let repo = Repository::new(tenancy.clone(), MemoryStore::new());
///
/// tenant::with_tenant_async(TenantId::new("acme"), async {
///     let mut project = Record::new("Project").with("name", "foobar");
///     repo.save(&mut project).await?;
///     assert_eq!(project.get_str("account_id"), Some("acme"));
///
///     let visible = repo.find(tenancy.entity("Project").all()).await?;
///     assert_eq!(visible.len(), 1);
///     Ok::<_, helios_tenancy::TenancyError>(())
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Repository<S> {
    tenancy: Arc<Tenancy>,
    store: S,
}

impl<S: EntityStore> Repository<S> {
    /// Creates a repository over `store`.
    pub fn new(tenancy: Arc<Tenancy>, store: S) -> Self {
        Self { tenancy, store }
    }

    /// The tenancy configuration.
    pub fn tenancy(&self) -> &Arc<Tenancy> {
        &self.tenancy
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the records matching `query` after filters are applied.
    pub async fn find(&self, query: Query) -> TenancyResult<Vec<Record>> {
        let schema = self.tenancy.require_schema(query.entity())?;
        let query = self.tenancy.apply_filters(query)?;
        self.store.select(schema, &query).await
    }

    /// Returns the first record matching `query`.
    pub async fn find_one(&self, query: Query) -> TenancyResult<Option<Record>> {
        Ok(self.find(query.limit(1)).await?.into_iter().next())
    }

    /// Looks a record up by primary key through the filtered path.
    pub async fn find_by_id(
        &self,
        entity: &str,
        id: impl Into<Value>,
    ) -> TenancyResult<Option<Record>> {
        let schema = self.tenancy.require_schema(entity)?;
        let query = Query::new(entity).where_eq(schema.primary_key(), id);
        self.find_one(query).await
    }

    /// Counts the records matching `query` after filters are applied.
    pub async fn count(&self, query: Query) -> TenancyResult<u64> {
        let schema = self.tenancy.require_schema(query.entity())?;
        let query = self.tenancy.apply_filters(query)?;
        self.store.count(schema, &query).await
    }

    /// Returns `true` if any record matches `query` after filters are applied.
    pub async fn exists(&self, query: Query) -> TenancyResult<bool> {
        let schema = self.tenancy.require_schema(query.entity())?;
        let query = self.tenancy.apply_filters(query)?;
        self.store.exists(schema, &query).await
    }

    /// Validates and writes a record.
    ///
    /// New records are inserted (with a generated primary key if they have
    /// none), persisted ones are updated. On error the record is left as it
    /// was and nothing is written.
    pub async fn save(&self, record: &mut Record) -> TenancyResult<()> {
        self.persist(record, true).await
    }

    /// Writes a record without running validation hooks. The tenant
    /// attribute is still stamped and protected.
    pub async fn save_without_validation(&self, record: &mut Record) -> TenancyResult<()> {
        self.persist(record, false).await
    }

    /// Deletes a record if it is visible through the filtered path.
    ///
    /// Returns `false` if the record does not exist or belongs to another
    /// tenant.
    pub async fn delete(&self, record: &Record) -> TenancyResult<bool> {
        let schema = self.tenancy.require_schema(record.entity())?;
        let Some(id) = primary_key_of(schema, record) else {
            return Ok(false);
        };
        let visible = Query::new(record.entity()).where_eq(schema.primary_key(), id.clone());
        if !self.exists(visible).await? {
            tracing::debug!(entity = %record.entity(), id = %id, "delete skipped: not visible");
            return Ok(false);
        }
        self.store.delete(schema, &id).await
    }

    /// Returns the tenant whose `tenant_entity` record comes first by
    /// primary key, ignoring every filter.
    ///
    /// Intended for administrative contexts that want a "first known tenant"
    /// fallback: resolve it once and pass it to
    /// [`TenancyBuilder::fallback`](crate::TenancyBuilder::fallback) as a
    /// [`FixedTenant`](crate::tenant::FixedTenant).
    pub async fn first_known_tenant(
        &self,
        tenant_entity: &str,
    ) -> TenancyResult<Option<TenantId>> {
        let schema = self.tenancy.require_schema(tenant_entity)?;
        let query = Query::new(tenant_entity)
            .unscoped()
            .order_by(schema.primary_key(), SortOrder::Ascending)
            .limit(1);
        let first = self.store.select(schema, &query).await?;
        Ok(first
            .first()
            .and_then(|record| record.get(schema.primary_key()))
            .and_then(TenantId::from_value))
    }

    async fn persist(&self, record: &mut Record, validate: bool) -> TenancyResult<()> {
        // One snapshot for the whole pipeline, so every phase sees the same
        // tenant and suppression state.
        let context = TenantContext::snapshot();
        let entity = record.entity().to_string();
        let schema = self.tenancy.require_schema(&entity)?;
        let hooks = self.tenancy.hooks_for(&entity);
        let cx = HookContext::new(&self.tenancy, schema, &context, &self.store);

        // Hooks work on a copy; the caller's record only changes after the write.
        let mut pending = record.clone();

        for hook in hooks {
            hook.before_validation(&cx, &mut pending)?;
        }

        if validate {
            let mut errors = ValidationErrors::new();
            for hook in hooks {
                hook.validate(&cx, &pending, &mut errors).await?;
            }
            errors.into_result(&entity)?;
        }

        for hook in hooks {
            hook.before_save(&cx, &mut pending)?;
        }

        if pending.is_persisted() {
            let id = primary_key_of(schema, &pending).ok_or_else(|| {
                BackendError::QueryError {
                    message: format!("persisted {} record has no {}", entity, schema.primary_key()),
                }
            })?;
            self.ensure_writable(&cx, &id).await?;
            self.store.update(schema, &id, pending.attributes()).await?;
            tracing::debug!(entity = %entity, id = %id, "updated record");
        } else {
            if pending.get(schema.primary_key()).is_none() {
                pending.set(schema.primary_key(), uuid::Uuid::new_v4().to_string());
            }
            self.store.insert(schema, pending.attributes()).await?;
            tracing::debug!(entity = %entity, "inserted record");
        }

        pending.mark_persisted();
        *record = pending;
        Ok(())
    }

    /// Fails unless the stored row behind `id` belongs to the current tenant.
    ///
    /// Rows without a tenant count as writable; the save claims them.
    async fn ensure_writable(&self, cx: &HookContext<'_>, id: &Value) -> TenancyResult<()> {
        let schema = cx.schema();
        let entity = schema.name();
        let Some(binding) = self.tenancy.binding(entity) else {
            return Ok(());
        };
        if cx.context().is_tenant_scoping_suspended(entity) {
            return Ok(());
        }
        let tenant = cx.current_tenant().ok_or_else(|| TenantError::MissingTenant {
            entity: entity.to_string(),
        })?;

        let owned = binding
            .tenant_predicate(&tenant)
            .or(Predicate::is_null(binding.attribute()));
        let query = Query::new(entity)
            .unscoped()
            .where_eq(schema.primary_key(), id.clone())
            .filter(owned);
        if self.store.exists(schema, &query).await? {
            return Ok(());
        }
        tracing::warn!(entity = %entity, id = %id, tenant = %tenant, "update rejected: row not owned by current tenant");
        Err(BackendError::RecordNotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
        .into())
    }
}

/// The key the record is stored under: the persisted one if any.
fn primary_key_of(schema: &EntitySchema, record: &Record) -> Option<Value> {
    record
        .stored_value(schema.primary_key())
        .or_else(|| record.get(schema.primary_key()))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryStore;
    use crate::error::{TenancyError, TenantError};
    use crate::scope::Predicate;
    use crate::tenant::{self, with_tenant_async};
    use crate::{EntitySchema, Queryable, TenantScoping};

    fn repository() -> Repository<MemoryStore> {
        let mut builder = Tenancy::builder();
        builder
            .entity(EntitySchema::new("Account"))
            .unwrap()
            .entity(EntitySchema::new("Project").belongs_to("account", "Account"))
            .unwrap()
            .register_tenant_scoping("Project", TenantScoping::owned_by("Account"))
            .unwrap();
        Repository::new(Arc::new(builder.build().unwrap()), MemoryStore::new())
    }

    #[tokio::test]
    async fn test_save_generates_id_and_stamps_tenant() {
        let repo = repository();
        with_tenant_async(TenantId::new("a"), async {
            let mut project = Record::new("Project").with("name", "foobar");
            repo.save(&mut project).await.unwrap();
            assert!(project.is_persisted());
            assert!(project.get_str("id").is_some());
            assert_eq!(project.get_str("account_id"), Some("a"));
        })
        .await;
    }

    #[tokio::test]
    async fn test_save_without_tenant_fails_and_writes_nothing() {
        let repo = repository();
        tenant::reset();
        let mut project = Record::new("Project").with("name", "foobar");
        let err = repo.save(&mut project).await.unwrap_err();
        assert!(err.is_missing_tenant());
        assert!(!project.is_persisted());
        assert_eq!(project.get("account_id"), None);
        assert!(repo.store().is_empty("Project"));
    }

    #[tokio::test]
    async fn test_failed_update_leaves_record_untouched() {
        let repo = repository();
        with_tenant_async(TenantId::new("a"), async {
            let mut project = Record::new("Project").with("name", "foobar");
            repo.save(&mut project).await.unwrap();

            let mut hijacked = project.clone();
            hijacked.set("account_id", "b");
            let err = repo.save(&mut hijacked).await.unwrap_err();
            assert!(matches!(
                err,
                TenancyError::Tenant(TenantError::TenantImmutable { .. })
            ));
            assert_eq!(hijacked.get_str("account_id"), Some("b"));
            assert!(hijacked.is_changed("account_id"));

            let id = project.get("id").cloned().unwrap();
            let stored = repo.find_by_id("Project", id).await.unwrap().unwrap();
            assert_eq!(stored.get_str("account_id"), Some("a"));
        })
        .await;
    }

    #[tokio::test]
    async fn test_delete_is_scoped() {
        let repo = repository();
        let mut project = Record::new("Project").with("name", "foobar");
        with_tenant_async(TenantId::new("a"), repo.save(&mut project))
            .await
            .unwrap();

        let deleted = with_tenant_async(TenantId::new("b"), repo.delete(&project))
            .await
            .unwrap();
        assert!(!deleted);
        assert_eq!(repo.store().len("Project"), 1);

        let deleted = with_tenant_async(TenantId::new("a"), repo.delete(&project))
            .await
            .unwrap();
        assert!(deleted);
        assert!(repo.store().is_empty("Project"));
    }

    #[tokio::test]
    async fn test_find_one_and_count() {
        let repo = repository();
        with_tenant_async(TenantId::new("a"), async {
            for name in ["foobar", "qux"] {
                repo.save(&mut Record::new("Project").with("name", name))
                    .await
                    .unwrap();
            }
            let projects = repo.tenancy().entity("Project");
            assert_eq!(repo.count(projects.all()).await.unwrap(), 2);
            let found = repo
                .find_one(projects.all().filter(Predicate::eq("name", "qux")))
                .await
                .unwrap();
            assert_eq!(found.unwrap().get_str("name"), Some("qux"));
        })
        .await;
    }

    #[tokio::test]
    async fn test_first_known_tenant() {
        let repo = repository();
        assert_eq!(repo.first_known_tenant("Account").await.unwrap(), None);
        for id in [3, 1, 2] {
            repo.store()
                .insert(
                    repo.tenancy().schema("Account").unwrap(),
                    &serde_json::json!({"id": id}).as_object().cloned().unwrap(),
                )
                .await
                .unwrap();
        }
        assert_eq!(
            repo.first_known_tenant("Account").await.unwrap(),
            Some(TenantId::from(1))
        );
    }
}
