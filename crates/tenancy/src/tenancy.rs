//! Tenant registration and the assembled tenancy configuration.
//!
//! [`TenancyBuilder`] is used once, single-threaded, at startup: it declares
//! entity types, attaches filters and hooks, and binds entity types to their
//! tenant. [`TenancyBuilder::build`] produces an immutable [`Tenancy`] that is
//! shared (usually through an `Arc`) by every execution context afterwards.
//!
//! # Example
//!
//! ```
//! use helios_tenancy::{EntitySchema, Queryable, Tenancy, TenantScoped, TenantScoping};
//! use helios_tenancy::scope::Predicate;
//! use helios_tenancy::tenant::{self, TenantId};
//!
//! # fn main() -> Result<(), helios_tenancy::ConfigurationError> {
//! let mut builder = Tenancy::builder();
//! builder
//!     .entity(EntitySchema::new("Account"))?
//!     .entity(EntitySchema::new("Project").belongs_to("account", "Account"))?
//!     .register_tenant_scoping("Project", TenantScoping::owned_by("Account"))?;
//! let tenancy = builder.build()?;
//!
//! let projects = tenancy.entity("Project");
//! assert!(projects.is_tenant_scoped());
//! assert_eq!(tenancy.binding("Project").unwrap().attribute(), "account_id");
//!
//! tenant::with_tenant(TenantId::new("acme"), || {
//!     let query = tenancy.apply_filters(projects.all()).unwrap();
//!     assert_eq!(query.conditions(), &[Predicate::eq("account_id", "acme")]);
//! });
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;

use crate::config::TenancyConfig;
use crate::enforcement::TenantEnforcement;
use crate::entity::{EntitySchema, Record};
use crate::error::{ConfigurationError, TenancyError, TenancyResult, TenantError};
use crate::hooks::LifecycleHook;
use crate::scope::{DEFAULT_FILTER, FilterEnv, Predicate, Query, ScopeRegistry, TENANT_FILTER};
use crate::tenant::{self, TenantContext, TenantFallback, TenantGuard, TenantId, TenantIdPolicy};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Options for [`TenancyBuilder::register_tenant_scoping`].
///
/// At least one of the tenant attribute and the tenant entity type must be
/// given; the other is derived by naming convention.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantScoping {
    attribute: Option<String>,
    tenant_entity: Option<String>,
    global_records: bool,
    unique_fields: Vec<String>,
}

impl TenantScoping {
    /// Starts with no attribute and no tenant entity type.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scopes by the primary key of `tenant_entity`, stored in the attribute
    /// derived from its name (`Account` becomes `account_id`).
    pub fn owned_by(tenant_entity: impl Into<String>) -> Self {
        Self::new().tenant_entity(tenant_entity)
    }

    /// Scopes by `attribute`, deriving the tenant entity type from its name
    /// (`account_id` becomes `Account`).
    pub fn by_attribute(attribute: impl Into<String>) -> Self {
        Self::new().attribute(attribute)
    }

    /// Sets the tenant attribute.
    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Sets the tenant entity type.
    pub fn tenant_entity(mut self, tenant_entity: impl Into<String>) -> Self {
        self.tenant_entity = Some(tenant_entity.into());
        self
    }

    /// Makes records with a null tenant visible to every tenant.
    pub fn with_global_records(mut self) -> Self {
        self.global_records = true;
        self
    }

    /// Requires `field` to be unique among the records of one tenant.
    pub fn unique_within_tenant(mut self, field: impl Into<String>) -> Self {
        self.unique_fields.push(field.into());
        self
    }
}

/// The resolved tenant binding of one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantBinding {
    entity: String,
    attribute: String,
    tenant_entity: String,
    global_records: bool,
    unique_fields: Vec<String>,
}

impl TenantBinding {
    /// The scoped entity type.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The attribute holding the tenant identifier.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// The entity type that represents a tenant.
    pub fn tenant_entity(&self) -> &str {
        &self.tenant_entity
    }

    /// Whether records with a null tenant are shared by all tenants.
    pub fn global_records(&self) -> bool {
        self.global_records
    }

    /// Fields that must be unique within one tenant.
    pub fn unique_fields(&self) -> &[String] {
        &self.unique_fields
    }

    /// The predicate selecting this tenant's records.
    pub fn tenant_predicate(&self, tenant: &TenantId) -> Predicate {
        let own = Predicate::eq(self.attribute.clone(), tenant.to_value());
        if self.global_records {
            own.or(Predicate::is_null(self.attribute.clone()))
        } else {
            own
        }
    }
}

/// Builds a [`Tenancy`].
pub struct TenancyBuilder {
    config: TenancyConfig,
    schemas: HashMap<String, EntitySchema>,
    bindings: HashMap<String, TenantBinding>,
    registry: ScopeRegistry,
    hooks: HashMap<String, Vec<Arc<dyn LifecycleHook>>>,
    fallback: Option<Box<dyn TenantFallback>>,
}

impl std::fmt::Debug for TenancyBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenancyBuilder")
            .field("config", &self.config)
            .field("schemas", &self.schemas)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

impl TenancyBuilder {
    fn new() -> Self {
        Self {
            config: TenancyConfig::default(),
            schemas: HashMap::new(),
            bindings: HashMap::new(),
            registry: ScopeRegistry::new(),
            hooks: HashMap::new(),
            fallback: None,
        }
    }

    /// Replaces the configuration.
    pub fn config(&mut self, config: TenancyConfig) -> &mut Self {
        self.config = config;
        self
    }

    /// Sets the policy used when a context has no tenant. Overrides
    /// `default_tenant` from the configuration.
    pub fn fallback(&mut self, fallback: impl TenantFallback + 'static) -> &mut Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Declares an entity type.
    pub fn entity(&mut self, schema: EntitySchema) -> Result<&mut Self, ConfigurationError> {
        if self.schemas.contains_key(schema.name()) {
            return Err(ConfigurationError::DuplicateEntity {
                entity: schema.name().to_string(),
            });
        }
        self.schemas.insert(schema.name().to_string(), schema);
        Ok(self)
    }

    /// Attaches a named filter to a declared entity type.
    pub fn filter<F>(
        &mut self,
        entity: &str,
        name: &str,
        predicate: F,
    ) -> Result<&mut Self, ConfigurationError>
    where
        F: Fn(&FilterEnv<'_>) -> TenancyResult<Predicate> + Send + Sync + 'static,
    {
        self.require_declared(entity)?;
        self.registry.register(entity, name, predicate)?;
        Ok(self)
    }

    /// Attaches the entity type's default filter. It composes with the tenant
    /// filter by intersection, in registration order.
    pub fn default_scope<F>(
        &mut self,
        entity: &str,
        predicate: F,
    ) -> Result<&mut Self, ConfigurationError>
    where
        F: Fn(&FilterEnv<'_>) -> TenancyResult<Predicate> + Send + Sync + 'static,
    {
        self.filter(entity, DEFAULT_FILTER, predicate)
    }

    /// Adds a lifecycle hook to a declared entity type's write pipeline.
    pub fn add_hook(
        &mut self,
        entity: &str,
        hook: impl LifecycleHook + 'static,
    ) -> Result<&mut Self, ConfigurationError> {
        self.require_declared(entity)?;
        self.hooks
            .entry(entity.to_string())
            .or_default()
            .push(Arc::new(hook));
        Ok(self)
    }

    /// Binds a declared entity type to its tenant.
    ///
    /// Resolves the tenant attribute and tenant entity type, installs the
    /// always-on `"tenant"` filter, and installs [`TenantEnforcement`] in the
    /// entity type's write pipeline.
    pub fn register_tenant_scoping(
        &mut self,
        entity: &str,
        scoping: TenantScoping,
    ) -> Result<&mut Self, ConfigurationError> {
        if self.bindings.contains_key(entity) {
            return Err(ConfigurationError::DuplicateRegistration {
                entity: entity.to_string(),
            });
        }
        self.require_declared(entity)?;

        let binding = resolve_binding(entity, scoping, &self.config.foreign_key_suffix)?;

        let filter_binding = binding.clone();
        self.registry.register(entity, TENANT_FILTER, move |env| {
            let tenant = env.require_tenant()?;
            Ok(filter_binding.tenant_predicate(&tenant))
        })?;

        self.hooks
            .entry(entity.to_string())
            .or_default()
            .push(Arc::new(TenantEnforcement::new(binding.clone())));

        tracing::info!(
            entity = %entity,
            attribute = %binding.attribute,
            tenant_entity = %binding.tenant_entity,
            "registered tenant scoping"
        );
        self.bindings.insert(entity.to_string(), binding);
        Ok(self)
    }

    /// Validates the setup and produces the immutable [`Tenancy`].
    pub fn build(self) -> Result<Tenancy, ConfigurationError> {
        self.config
            .validate()
            .map_err(|errors| ConfigurationError::InvalidConfig { errors })?;
        let id_policy = TenantIdPolicy::from_config(&self.config)?;

        for schema in self.schemas.values() {
            for association in schema.associations() {
                let target = association.target();
                let is_tenant_owner = self
                    .bindings
                    .get(schema.name())
                    .is_some_and(|b| b.tenant_entity == target);
                if !is_tenant_owner && !self.schemas.contains_key(target) {
                    return Err(ConfigurationError::UnknownEntity {
                        entity: target.to_string(),
                    });
                }
            }
        }

        let fallback = match self.fallback {
            Some(fallback) => fallback,
            None => self.config.fallback(),
        };

        Ok(Tenancy {
            config: self.config,
            schemas: self.schemas,
            bindings: self.bindings,
            registry: self.registry,
            hooks: self.hooks,
            fallback,
            id_policy,
        })
    }

    fn require_declared(&self, entity: &str) -> Result<(), ConfigurationError> {
        if self.schemas.contains_key(entity) {
            Ok(())
        } else {
            Err(ConfigurationError::UnknownEntity {
                entity: entity.to_string(),
            })
        }
    }
}

fn resolve_binding(
    entity: &str,
    scoping: TenantScoping,
    suffix: &str,
) -> Result<TenantBinding, ConfigurationError> {
    let (attribute, tenant_entity) = match (scoping.attribute, scoping.tenant_entity) {
        (Some(attribute), Some(tenant_entity)) => (attribute, tenant_entity),
        (None, Some(tenant_entity)) => {
            let attribute = format!("{}{}", snake_case(&tenant_entity), suffix);
            (attribute, tenant_entity)
        }
        (Some(attribute), None) => {
            let tenant_entity = attribute
                .strip_suffix(suffix)
                .filter(|stem| !stem.is_empty())
                .map(camel_case)
                .ok_or_else(|| ConfigurationError::UnresolvableTenantEntity {
                    entity: entity.to_string(),
                    attribute: attribute.clone(),
                })?;
            (attribute, tenant_entity)
        }
        (None, None) => {
            return Err(ConfigurationError::UnresolvableTenantAttribute {
                entity: entity.to_string(),
            });
        }
    };

    if !IDENTIFIER.is_match(&attribute) {
        return Err(ConfigurationError::InvalidAttributeName {
            entity: entity.to_string(),
            attribute,
        });
    }

    Ok(TenantBinding {
        entity: entity.to_string(),
        attribute,
        tenant_entity,
        global_records: scoping.global_records,
        unique_fields: scoping.unique_fields,
    })
}

/// `ProjectMember` becomes `project_member`.
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `project_member` becomes `ProjectMember`.
fn camel_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// The assembled, read-only tenancy configuration.
pub struct Tenancy {
    config: TenancyConfig,
    schemas: HashMap<String, EntitySchema>,
    bindings: HashMap<String, TenantBinding>,
    registry: ScopeRegistry,
    hooks: HashMap<String, Vec<Arc<dyn LifecycleHook>>>,
    fallback: Box<dyn TenantFallback>,
    id_policy: TenantIdPolicy,
}

impl fmt::Debug for Tenancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tenancy")
            .field("config", &self.config)
            .field("entities", &self.schemas.keys().collect::<Vec<_>>())
            .field("bindings", &self.bindings)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Tenancy {
    /// Starts building a tenancy configuration.
    pub fn builder() -> TenancyBuilder {
        TenancyBuilder::new()
    }

    /// The configuration in effect.
    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }

    /// The filter registry.
    pub fn registry(&self) -> &ScopeRegistry {
        &self.registry
    }

    /// The fallback policy for contexts without a tenant.
    pub fn fallback(&self) -> &dyn TenantFallback {
        self.fallback.as_ref()
    }

    /// A handle on an entity type.
    pub fn entity<'a>(&'a self, name: &'a str) -> EntityRef<'a> {
        EntityRef {
            tenancy: self,
            name,
        }
    }

    /// The schema of a declared entity type.
    pub fn schema(&self, entity: &str) -> Option<&EntitySchema> {
        self.schemas.get(entity)
    }

    pub(crate) fn require_schema(&self, entity: &str) -> TenancyResult<&EntitySchema> {
        self.schema(entity).ok_or_else(|| {
            ConfigurationError::UnknownEntity {
                entity: entity.to_string(),
            }
            .into()
        })
    }

    /// Returns `true` if the entity type is registered for tenant scoping.
    pub fn is_tenant_scoped(&self, entity: &str) -> bool {
        self.bindings.contains_key(entity)
    }

    /// The tenant binding of an entity type.
    pub fn binding(&self, entity: &str) -> Option<&TenantBinding> {
        self.bindings.get(entity)
    }

    /// The hooks run when saving records of an entity type.
    pub fn hooks_for(&self, entity: &str) -> &[Arc<dyn LifecycleHook>] {
        self.hooks.get(entity).map(Vec::as_slice).unwrap_or_default()
    }

    /// The current tenant of the calling context, or the fallback tenant.
    pub fn current_tenant(&self) -> Option<TenantId> {
        tenant::current_tenant().or_else(|| self.fallback.fallback_tenant())
    }

    /// Rewrites a query with the filters of its entity type, as seen from
    /// the calling execution context.
    pub fn apply_filters(&self, query: Query) -> TenancyResult<Query> {
        self.apply_filters_in(query, &TenantContext::snapshot())
    }

    /// Rewrites a query with the filters of its entity type, as seen from
    /// `context`.
    pub fn apply_filters_in(&self, query: Query, context: &TenantContext) -> TenancyResult<Query> {
        self.registry
            .apply_filters(query, context, self.fallback.as_ref())
    }

    /// Checks a tenant identifier against the configured policy.
    pub fn validate_tenant_id(&self, tenant: &TenantId) -> Result<(), TenantError> {
        self.id_policy.validate(tenant)
    }

    /// Validates `tenant` and runs `f` on its behalf.
    pub fn with_tenant<R>(&self, tenant: TenantId, f: impl FnOnce() -> R) -> TenancyResult<R> {
        self.validate_tenant_id(&tenant)?;
        Ok(tenant::with_tenant(tenant, f))
    }

    /// Async form of [`with_tenant`](Self::with_tenant).
    pub async fn with_tenant_async<F: Future>(
        &self,
        tenant: TenantId,
        fut: F,
    ) -> TenancyResult<F::Output> {
        self.validate_tenant_id(&tenant)?;
        Ok(tenant::with_tenant_async(tenant, fut).await)
    }

    /// Validates `tenant` and makes it current until the guard is dropped.
    pub fn enter(&self, tenant: TenantId) -> TenancyResult<TenantGuard> {
        self.validate_tenant_id(&tenant)?;
        Ok(tenant::enter_tenant(tenant))
    }

    /// Runs `f` with the tenant filter suspended for every entity type.
    pub fn without_scoping<R>(&self, f: impl FnOnce() -> R) -> R {
        tenant::without_scoping(f)
    }

    /// Assigns an attribute, refusing to reassign a persisted tenant.
    ///
    /// For the tenant attribute of a scoped entity type the assignment is
    /// allowed while tenant scoping is suspended, for records that were never
    /// persisted, when the stored tenant is null, and when the value is
    /// unchanged. Other attributes are assigned as is.
    pub fn assign(
        &self,
        record: &mut Record,
        field: &str,
        value: impl Into<Value>,
    ) -> TenancyResult<()> {
        let value = value.into();
        if let Some(binding) = self.bindings.get(record.entity())
            && binding.attribute() == field
        {
            TenantEnforcement::new(binding.clone()).check_assignment(
                &TenantContext::snapshot(),
                record,
                &value,
            )?;
        }
        record.set(field, value);
        Ok(())
    }
}

/// Capability of building queries against an entity type.
pub trait Queryable {
    /// The entity type name.
    fn entity_name(&self) -> &str;

    /// The normal access path: every registered filter applies.
    fn all(&self) -> Query {
        Query::new(self.entity_name())
    }

    /// The bypass path: no registered filter applies.
    fn unscoped(&self) -> Query {
        Query::new(self.entity_name()).unscoped()
    }
}

/// Capability of tenant-scoped entity types.
pub trait TenantScoped: Queryable {
    /// Returns `true` if the entity type is registered for tenant scoping.
    fn is_tenant_scoped(&self) -> bool;

    /// Records of an explicit tenant, regardless of the current one.
    fn for_tenant(&self, tenant: &TenantId) -> TenancyResult<Query>;

    /// Records of the current tenant, even while scoping is suspended.
    fn for_current_tenant(&self) -> TenancyResult<Query>;
}

/// A handle on one entity type of a [`Tenancy`].
#[derive(Clone, Copy)]
pub struct EntityRef<'a> {
    tenancy: &'a Tenancy,
    name: &'a str,
}

impl fmt::Debug for EntityRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityRef").field(&self.name).finish()
    }
}

impl EntityRef<'_> {
    fn binding(&self) -> TenancyResult<&TenantBinding> {
        self.tenancy.binding(self.name).ok_or_else(|| {
            TenancyError::from(ConfigurationError::NotTenantScoped {
                entity: self.name.to_string(),
            })
        })
    }
}

impl Queryable for EntityRef<'_> {
    fn entity_name(&self) -> &str {
        self.name
    }
}

impl TenantScoped for EntityRef<'_> {
    fn is_tenant_scoped(&self) -> bool {
        self.tenancy.is_tenant_scoped(self.name)
    }

    fn for_tenant(&self, tenant: &TenantId) -> TenancyResult<Query> {
        let binding = self.binding()?;
        Ok(self
            .all()
            .without_filter(TENANT_FILTER)
            .filter(binding.tenant_predicate(tenant)))
    }

    fn for_current_tenant(&self) -> TenancyResult<Query> {
        let tenant = self
            .tenancy
            .current_tenant()
            .ok_or_else(|| TenantError::MissingTenant {
                entity: self.name.to_string(),
            })?;
        self.for_tenant(&tenant)
    }
}
