//! Registry of named automatic query filters.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::predicate::Predicate;
use super::query::Query;
use crate::error::{ConfigurationError, TenancyResult, TenantError};
use crate::tenant::{TenantContext, TenantFallback, TenantId};

/// A filter's predicate-producing function.
pub type FilterFn = Arc<dyn Fn(&FilterEnv<'_>) -> TenancyResult<Predicate> + Send + Sync>;

/// What a filter function can read when it builds its predicate.
pub struct FilterEnv<'a> {
    entity: &'a str,
    context: &'a TenantContext,
    fallback: &'a dyn TenantFallback,
}

impl<'a> FilterEnv<'a> {
    /// Creates an environment for one entity type.
    pub fn new(
        entity: &'a str,
        context: &'a TenantContext,
        fallback: &'a dyn TenantFallback,
    ) -> Self {
        Self {
            entity,
            context,
            fallback,
        }
    }

    /// The entity type being queried.
    pub fn entity(&self) -> &str {
        self.entity
    }

    /// The execution context the query runs in.
    pub fn context(&self) -> &TenantContext {
        self.context
    }

    /// The current tenant, or the fallback policy's tenant when none is set.
    pub fn current_tenant(&self) -> Option<TenantId> {
        self.context
            .current()
            .cloned()
            .or_else(|| self.fallback.fallback_tenant())
    }

    /// Like [`current_tenant`](Self::current_tenant), but fails the query
    /// instead of letting it run unscoped.
    pub fn require_tenant(&self) -> TenancyResult<TenantId> {
        self.current_tenant().ok_or_else(|| {
            TenantError::MissingTenant {
                entity: self.entity.to_string(),
            }
            .into()
        })
    }
}

#[derive(Clone)]
struct NamedFilter {
    name: String,
    predicate: FilterFn,
}

/// Named filters per entity type, in registration order.
///
/// The registry is filled during single-threaded setup and only read
/// afterwards.
#[derive(Clone, Default)]
pub struct ScopeRegistry {
    filters: HashMap<String, Vec<NamedFilter>>,
}

impl ScopeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter to an entity type's query path.
    ///
    /// Registering the same `(entity, name)` pair twice is a configuration
    /// error rather than a silent double filter.
    pub fn register<F>(
        &mut self,
        entity: impl Into<String>,
        name: impl Into<String>,
        predicate: F,
    ) -> Result<(), ConfigurationError>
    where
        F: Fn(&FilterEnv<'_>) -> TenancyResult<Predicate> + Send + Sync + 'static,
    {
        let entity = entity.into();
        let name = name.into();
        let filters = self.filters.entry(entity.clone()).or_default();
        if filters.iter().any(|f| f.name == name) {
            return Err(ConfigurationError::DuplicateFilter {
                entity,
                filter: name,
            });
        }
        tracing::debug!(entity = %entity, filter = %name, "registered query filter");
        filters.push(NamedFilter {
            name,
            predicate: Arc::new(predicate),
        });
        Ok(())
    }

    /// Returns the filter names of an entity type in registration order.
    pub fn filter_names(&self, entity: &str) -> Vec<&str> {
        self.filters
            .get(entity)
            .map(|filters| filters.iter().map(|f| f.name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Returns `true` if the entity type has a filter with this name.
    pub fn has_filter(&self, entity: &str, name: &str) -> bool {
        self.filters
            .get(entity)
            .is_some_and(|filters| filters.iter().any(|f| f.name == name))
    }

    /// ANDs every registered, non-suppressed filter into the query.
    ///
    /// Unscoped queries pass through untouched, and a query is never
    /// filtered twice. A filter that cannot build its predicate (for example
    /// because no tenant is set) fails the whole query.
    pub fn apply_filters(
        &self,
        query: Query,
        context: &TenantContext,
        fallback: &dyn TenantFallback,
    ) -> TenancyResult<Query> {
        if query.is_unscoped() {
            tracing::debug!(entity = %query.entity(), "query bypasses registered filters");
            return Ok(query);
        }
        if query.filters_applied() {
            return Ok(query);
        }

        let mut query = query;
        let entity = query.entity().to_string();
        let mut applied = 0usize;

        if let Some(filters) = self.filters.get(&entity) {
            let env = FilterEnv::new(&entity, context, fallback);
            for filter in filters {
                if context.is_suppressed(&entity, &filter.name) || query.skips_filter(&filter.name)
                {
                    tracing::trace!(entity = %entity, filter = %filter.name, "filter skipped");
                    continue;
                }
                let predicate = (filter.predicate)(&env)?;
                query.push_condition(predicate);
                applied += 1;
            }
        }

        tracing::debug!(entity = %entity, filters = applied, "applied query filters");
        query.mark_filters_applied();
        Ok(query)
    }
}

impl fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: HashMap<&str, Vec<&str>> = self
            .filters
            .iter()
            .map(|(entity, filters)| {
                (
                    entity.as_str(),
                    filters.iter().map(|f| f.name.as_str()).collect(),
                )
            })
            .collect();
        f.debug_struct("ScopeRegistry").field("filters", &names).finish()
    }
}
