//! Query description handed to stores.

use serde_json::Value;

use super::predicate::Predicate;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// A read against one entity type.
///
/// Caller conditions added with [`Query::filter`] are opt-in per query.
/// Registered filters are added on top of them by
/// [`ScopeRegistry::apply_filters`](super::ScopeRegistry::apply_filters);
/// the two sets always intersect.
///
/// # Examples
///
/// ```
/// use helios_tenancy::scope::{Predicate, Query, SortOrder};
///
/// let query = Query::new("Project")
///     .where_eq("name", "foobar")
///     .order_by("name", SortOrder::Ascending)
///     .limit(10);
///
/// assert_eq!(query.entity(), "Project");
/// assert_eq!(query.conditions(), &[Predicate::eq("name", "foobar")]);
/// assert!(!query.is_unscoped());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    entity: String,
    conditions: Vec<Predicate>,
    skipped_filters: Vec<String>,
    unscoped: bool,
    filters_applied: bool,
    order_by: Option<(String, SortOrder)>,
    limit: Option<usize>,
}

impl Query {
    /// Starts a query against the given entity type.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            conditions: Vec::new(),
            skipped_filters: Vec::new(),
            unscoped: false,
            filters_applied: false,
            order_by: None,
            limit: None,
        }
    }

    /// Adds a caller condition.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.conditions.push(predicate);
        self
    }

    /// Adds an equality condition.
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Predicate::eq(field, value))
    }

    /// Adds a null check.
    pub fn where_null(self, field: impl Into<String>) -> Self {
        self.filter(Predicate::is_null(field))
    }

    /// Skips one registered filter for this query only.
    pub fn without_filter(mut self, name: impl Into<String>) -> Self {
        self.skipped_filters.push(name.into());
        self
    }

    /// Bypasses every registered filter.
    ///
    /// This is the explicit "every row regardless of filters" access path.
    pub fn unscoped(mut self) -> Self {
        self.unscoped = true;
        self
    }

    /// Orders results by an attribute.
    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some((field.into(), order));
        self
    }

    /// Caps the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the entity type.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Returns all conditions, caller and registered.
    pub fn conditions(&self) -> &[Predicate] {
        &self.conditions
    }

    /// Returns the conditions combined into one conjunction.
    pub fn predicate(&self) -> Predicate {
        Predicate::And(self.conditions.clone())
    }

    /// Returns `true` if registered filters are bypassed.
    pub fn is_unscoped(&self) -> bool {
        self.unscoped
    }

    /// Returns `true` once registered filters have been merged in.
    pub fn filters_applied(&self) -> bool {
        self.filters_applied
    }

    /// Returns `true` if the named filter is skipped for this query.
    pub fn skips_filter(&self, name: &str) -> bool {
        self.skipped_filters.iter().any(|f| f == name)
    }

    /// Returns the requested ordering.
    pub fn ordering(&self) -> Option<(&str, SortOrder)> {
        self.order_by
            .as_ref()
            .map(|(field, order)| (field.as_str(), *order))
    }

    /// Returns the result cap.
    pub fn max_results(&self) -> Option<usize> {
        self.limit
    }

    pub(crate) fn push_condition(&mut self, predicate: Predicate) {
        self.conditions.push(predicate);
    }

    pub(crate) fn mark_filters_applied(&mut self) {
        self.filters_applied = true;
    }
}
