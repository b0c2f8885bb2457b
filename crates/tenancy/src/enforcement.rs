//! Tenant enforcement on writes.
//!
//! [`TenantEnforcement`] is installed as a lifecycle hook on every entity
//! type registered for tenant scoping. It
//!
//! - stamps the tenant attribute before validation and again before the
//!   write, keeping an explicit value and otherwise using the current tenant
//! - refuses to change a tenant attribute that is persisted and non-null
//! - rejects belongs-to references to tenant-scoped records that the
//!   current tenant cannot see
//!
//! All checks are skipped while tenant scoping is suspended for the entity
//! type, so administrative code can backfill or relink records on purpose.

use async_trait::async_trait;
use serde_json::Value;

use crate::entity::Record;
use crate::error::{TenancyResult, TenantError, ValidationErrors, ValidationKind};
use crate::hooks::{HookContext, LifecycleHook};
use crate::scope::{Query, TENANT_FILTER};
use crate::tenancy::TenantBinding;
use crate::tenant::{TenantContext, TenantId};

/// Lifecycle hook enforcing one entity type's tenant binding.
#[derive(Debug, Clone)]
pub struct TenantEnforcement {
    binding: TenantBinding,
}

impl TenantEnforcement {
    /// Creates the hook for a binding.
    pub fn new(binding: TenantBinding) -> Self {
        Self { binding }
    }

    /// The binding being enforced.
    pub fn binding(&self) -> &TenantBinding {
        &self.binding
    }

    /// Fills in the tenant attribute.
    ///
    /// An explicit value is kept as long as it does not reassign a persisted
    /// tenant. A missing value is taken from the current tenant, which fails
    /// with a missing-tenant error when there is none. A null left behind by
    /// a suspended write is backfilled here by the next regular save.
    pub fn stamp(&self, cx: &HookContext<'_>, record: &mut Record) -> TenancyResult<()> {
        let entity = self.binding.entity();
        if cx.context().is_tenant_scoping_suspended(entity) {
            return Ok(());
        }

        self.guard_immutable(record)?;

        let attribute = self.binding.attribute();
        if record.get(attribute).is_some() {
            return Ok(());
        }

        let tenant = cx
            .current_tenant()
            .ok_or_else(|| TenantError::MissingTenant {
                entity: entity.to_string(),
            })?;
        tracing::debug!(
            entity = %entity,
            attribute = %attribute,
            tenant = %tenant,
            "stamped tenant attribute"
        );
        record.set(attribute, tenant.to_value());
        Ok(())
    }

    /// Checks whether assigning `value` to the tenant attribute is allowed.
    ///
    /// Allowed while tenant scoping is suspended, for records that were never
    /// persisted, when the stored tenant is null, and when the value does not
    /// change.
    pub fn check_assignment(
        &self,
        context: &TenantContext,
        record: &Record,
        value: &Value,
    ) -> Result<(), TenantError> {
        if context.is_tenant_scoping_suspended(self.binding.entity()) {
            return Ok(());
        }
        self.check_against_stored(record, value)
    }

    fn guard_immutable(&self, record: &Record) -> Result<(), TenantError> {
        let attempted = record
            .get(self.binding.attribute())
            .cloned()
            .unwrap_or(Value::Null);
        self.check_against_stored(record, &attempted)
    }

    fn check_against_stored(&self, record: &Record, value: &Value) -> Result<(), TenantError> {
        let attribute = self.binding.attribute();
        match record.stored_value(attribute) {
            Some(stored) if stored != value => {
                tracing::warn!(
                    entity = %self.binding.entity(),
                    attribute = %attribute,
                    stored = %stored,
                    attempted = %value,
                    "rejected tenant reassignment"
                );
                Err(TenantError::TenantImmutable {
                    entity: self.binding.entity().to_string(),
                    attribute: attribute.to_string(),
                    stored: stored.clone(),
                    attempted: value.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    async fn check_associations(
        &self,
        cx: &HookContext<'_>,
        record: &Record,
        errors: &mut ValidationErrors,
    ) -> TenancyResult<()> {
        let tenancy = cx.tenancy();
        for association in cx.schema().associations() {
            let target = association.target();
            // References to the tenant owner itself are not scoped records.
            if target == self.binding.tenant_entity() || !tenancy.is_tenant_scoped(target) {
                continue;
            }
            let Some(foreign_key) = record.get(association.foreign_key()) else {
                continue;
            };

            let target_schema = tenancy.require_schema(target)?;
            let query =
                Query::new(target).where_eq(target_schema.primary_key(), foreign_key.clone());
            if !cx.exists(query).await? {
                tracing::warn!(
                    entity = %self.binding.entity(),
                    association = %association.name(),
                    target = %target,
                    "rejected cross-tenant association"
                );
                errors.add(
                    association.foreign_key(),
                    ValidationKind::CrossTenantAssociation {
                        association: association.name().to_string(),
                        target: target.to_string(),
                    },
                );
            }
        }
        Ok(())
    }

    fn check_current_tenant(
        &self,
        cx: &HookContext<'_>,
        record: &Record,
        errors: &mut ValidationErrors,
    ) {
        if !cx.tenancy().config().enforce_current_tenant_on_write {
            return;
        }
        let attribute = self.binding.attribute();
        let (Some(expected), Some(actual)) = (
            cx.current_tenant(),
            record.get(attribute).and_then(TenantId::from_value),
        ) else {
            return;
        };
        if expected != actual {
            errors.add(attribute, ValidationKind::TenantMismatch { expected, actual });
        }
    }

    async fn check_unique_fields(
        &self,
        cx: &HookContext<'_>,
        record: &Record,
        errors: &mut ValidationErrors,
    ) -> TenancyResult<()> {
        let attribute = self.binding.attribute();
        let Some(tenant) = record.get(attribute) else {
            return Ok(());
        };
        let primary_key = cx.schema().primary_key();

        for field in self.binding.unique_fields() {
            let Some(value) = record.get(field) else {
                continue;
            };
            // Scoped to the record's own tenant, which may differ from the
            // current one when enforcement of the current tenant is off.
            let query = Query::new(self.binding.entity())
                .without_filter(TENANT_FILTER)
                .where_eq(attribute, tenant.clone())
                .where_eq(field.as_str(), value.clone());
            let taken = cx
                .select(query)
                .await?
                .iter()
                .any(|other| other.get(primary_key) != record.get(primary_key));
            if taken {
                errors.add(
                    field.as_str(),
                    ValidationKind::NotUniqueWithinTenant {
                        value: value.clone(),
                    },
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LifecycleHook for TenantEnforcement {
    fn name(&self) -> &str {
        "tenant_enforcement"
    }

    fn before_validation(&self, cx: &HookContext<'_>, record: &mut Record) -> TenancyResult<()> {
        self.stamp(cx, record)
    }

    async fn validate(
        &self,
        cx: &HookContext<'_>,
        record: &Record,
        errors: &mut ValidationErrors,
    ) -> TenancyResult<()> {
        if cx
            .context()
            .is_tenant_scoping_suspended(self.binding.entity())
        {
            return Ok(());
        }
        self.check_associations(cx, record, errors).await?;
        self.check_current_tenant(cx, record, errors);
        self.check_unique_fields(cx, record, errors).await
    }

    fn before_save(&self, cx: &HookContext<'_>, record: &mut Record) -> TenancyResult<()> {
        self.stamp(cx, record)
    }
}
