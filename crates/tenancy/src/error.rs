//! Error types for the tenancy layer.
//!
//! Errors are grouped by category: configuration mistakes made while wiring
//! entity types, tenant errors raised at query or write time, field-level
//! validation failures, and errors coming back from the store.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::tenant::TenantId;

/// The primary error type for all tenancy operations.
#[derive(Error, Debug)]
pub enum TenancyError {
    /// Setup-time configuration errors
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Tenant isolation errors
    #[error(transparent)]
    Tenant(#[from] TenantError),

    /// Validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Store errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl TenancyError {
    /// Returns `true` if a filtered query or write ran without a tenant.
    pub fn is_missing_tenant(&self) -> bool {
        matches!(self, TenancyError::Tenant(TenantError::MissingTenant { .. }))
    }

    /// Returns `true` if a persisted tenant attribute was about to be reassigned.
    pub fn is_tenant_immutable(&self) -> bool {
        matches!(self, TenancyError::Tenant(TenantError::TenantImmutable { .. }))
    }

    /// Returns `true` for setup-time errors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, TenancyError::Configuration(_))
    }

    /// Returns the names of associations rejected for crossing a tenant boundary.
    pub fn cross_tenant_associations(&self) -> Vec<&str> {
        match self {
            TenancyError::Validation(err) => err
                .details()
                .iter()
                .filter_map(|detail| match &detail.kind {
                    ValidationKind::CrossTenantAssociation { association, .. } => {
                        Some(association.as_str())
                    }
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Errors raised while registering entity types and filters.
///
/// These are fatal at setup and should abort startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The entity type is already registered for tenant scoping.
    #[error("entity type {entity} is already registered for tenant scoping")]
    DuplicateRegistration { entity: String },

    /// The entity type was declared twice.
    #[error("entity type {entity} is already declared")]
    DuplicateEntity { entity: String },

    /// A filter with the same name already exists for the entity type.
    #[error("filter '{filter}' is already registered for {entity}")]
    DuplicateFilter { entity: String, filter: String },

    /// The entity type was never declared.
    #[error("unknown entity type: {entity}")]
    UnknownEntity { entity: String },

    /// Neither a tenant attribute nor a tenant entity type was supplied.
    #[error("cannot determine the tenant attribute for {entity}")]
    UnresolvableTenantAttribute { entity: String },

    /// The tenant entity type cannot be derived from the attribute name.
    #[error("cannot derive the tenant entity type of {entity} from attribute '{attribute}'")]
    UnresolvableTenantEntity { entity: String, attribute: String },

    /// The attribute name is not a plain identifier.
    #[error("invalid attribute name '{attribute}' on {entity}")]
    InvalidAttributeName { entity: String, attribute: String },

    /// A configured regular expression failed to compile.
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// The tenancy configuration failed validation.
    #[error("invalid tenancy configuration: {}", .errors.join("; "))]
    InvalidConfig { errors: Vec<String> },

    /// A tenant-only operation was requested for an entity type that is not
    /// registered for tenant scoping.
    #[error("entity type {entity} is not tenant-scoped")]
    NotTenantScoped { entity: String },
}

/// Errors related to tenant isolation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TenantError {
    /// A filtered query or auto-population ran with no tenant set and no fallback.
    #[error("no current tenant set while accessing tenant-scoped {entity}")]
    MissingTenant { entity: String },

    /// Attempt to reassign a persisted, non-null tenant attribute.
    #[error("cannot change {entity}.{attribute} from {stored} to {attempted}: tenant is immutable")]
    TenantImmutable {
        entity: String,
        attribute: String,
        stored: Value,
        attempted: Value,
    },

    /// The tenant identifier was rejected by the configured policy.
    #[error("invalid tenant {tenant_id}: {reason}")]
    InvalidTenant { tenant_id: TenantId, reason: String },
}

/// Field-level validation failures. The save is aborted and nothing is written.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The record failed one or more validation checks.
    #[error("invalid {entity}: {}", join_details(.details))]
    InvalidRecord {
        entity: String,
        details: Vec<ValidationDetail>,
    },
}

impl ValidationError {
    /// Returns the individual field failures.
    pub fn details(&self) -> &[ValidationDetail] {
        match self {
            ValidationError::InvalidRecord { details, .. } => details,
        }
    }
}

fn join_details(details: &[ValidationDetail]) -> String {
    details
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationDetail {
    /// The attribute the failure is reported on.
    pub field: String,
    /// What went wrong.
    pub kind: ValidationKind,
}

impl fmt::Display for ValidationDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.kind)
    }
}

/// The kind of a field-level validation failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationKind {
    /// A belongs-to reference points at a record outside the current tenant.
    CrossTenantAssociation { association: String, target: String },
    /// The record's tenant differs from the tenant performing the write.
    TenantMismatch { expected: TenantId, actual: TenantId },
    /// Another record of the same tenant already holds this value.
    NotUniqueWithinTenant { value: Value },
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationKind::CrossTenantAssociation {
                association,
                target,
            } => write!(
                f,
                "association '{}' is invalid: referenced {} does not belong to the current tenant",
                association, target
            ),
            ValidationKind::TenantMismatch { expected, actual } => write!(
                f,
                "belongs to tenant {} but is being written by tenant {}",
                actual, expected
            ),
            ValidationKind::NotUniqueWithinTenant { value } => {
                write!(f, "has already been taken ({})", value)
            }
        }
    }
}

/// Collects validation failures across hooks before a save is aborted.
#[derive(Debug, Default, Clone)]
pub struct ValidationErrors {
    details: Vec<ValidationDetail>,
}

impl ValidationErrors {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a failure on the given field.
    pub fn add(&mut self, field: impl Into<String>, kind: ValidationKind) {
        self.details.push(ValidationDetail {
            field: field.into(),
            kind,
        });
    }

    /// Returns `true` if nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }

    /// Returns the collected failures.
    pub fn details(&self) -> &[ValidationDetail] {
        &self.details
    }

    /// Converts the collection into a result for the given entity type.
    pub fn into_result(self, entity: &str) -> Result<(), ValidationError> {
        if self.details.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::InvalidRecord {
                entity: entity.to_string(),
                details: self.details,
            })
        }
    }
}

/// Errors originating from the store.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the store failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Internal store error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution error.
    #[error("query execution failed: {message}")]
    QueryError { message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// The record to update or delete does not exist.
    #[error("record not found: {entity}/{id}")]
    RecordNotFound { entity: String, id: String },
}

/// Result type alias for tenancy operations.
pub type TenancyResult<T> = Result<T, TenancyError>;

impl From<serde_json::Error> for TenancyError {
    fn from(err: serde_json::Error) -> Self {
        TenancyError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for TenancyError {
    fn from(err: rusqlite::Error) -> Self {
        TenancyError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for TenancyError {
    fn from(err: r2d2::Error) -> Self {
        TenancyError::Backend(BackendError::ConnectionFailed {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
        })
    }
}
