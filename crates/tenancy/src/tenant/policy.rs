//! Tenant identifier validation.

use regex::Regex;

use super::id::TenantId;
use crate::config::TenancyConfig;
use crate::error::{ConfigurationError, TenantError};

/// Rules a tenant identifier must satisfy before a context may act on its
/// behalf.
///
/// Integer identifiers are checked through their decimal form.
#[derive(Debug, Clone)]
pub struct TenantIdPolicy {
    max_length: usize,
    pattern: Regex,
}

impl TenantIdPolicy {
    /// Builds a policy, compiling `pattern`.
    pub fn new(max_length: usize, pattern: &str) -> Result<Self, ConfigurationError> {
        let pattern = Regex::new(pattern).map_err(|e| ConfigurationError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            max_length,
            pattern,
        })
    }

    /// Builds the policy described by the configuration.
    pub fn from_config(config: &TenancyConfig) -> Result<Self, ConfigurationError> {
        Self::new(config.max_tenant_id_length, &config.tenant_id_pattern)
    }

    /// Checks one identifier.
    pub fn validate(&self, tenant_id: &TenantId) -> Result<(), TenantError> {
        let id = tenant_id.to_string();

        if id.is_empty() {
            return Err(TenantError::InvalidTenant {
                tenant_id: tenant_id.clone(),
                reason: "tenant ID must not be empty".to_string(),
            });
        }

        if id.len() > self.max_length {
            return Err(TenantError::InvalidTenant {
                tenant_id: tenant_id.clone(),
                reason: format!(
                    "tenant ID exceeds maximum length of {} characters",
                    self.max_length
                ),
            });
        }

        if !self.pattern.is_match(&id) {
            return Err(TenantError::InvalidTenant {
                tenant_id: tenant_id.clone(),
                reason: format!(
                    "tenant ID does not match required pattern: {}",
                    self.pattern.as_str()
                ),
            });
        }

        Ok(())
    }
}

impl Default for TenantIdPolicy {
    fn default() -> Self {
        Self {
            max_length: crate::config::DEFAULT_MAX_TENANT_ID_LENGTH,
            pattern: Regex::new(crate::config::DEFAULT_TENANT_ID_PATTERN)
                .expect("default tenant pattern is valid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        let policy = TenantIdPolicy::default();
        assert!(policy.validate(&TenantId::new("acme")).is_ok());
        assert!(policy.validate(&TenantId::new("acme/research")).is_ok());
        assert!(policy.validate(&TenantId::from(42)).is_ok());
    }

    #[test]
    fn test_too_long() {
        let policy = TenantIdPolicy::new(10, ".*").unwrap();
        let err = policy
            .validate(&TenantId::new("this-is-a-very-long-tenant-id"))
            .unwrap_err();
        assert!(err.to_string().contains("maximum length"));
    }

    #[test]
    fn test_pattern_mismatch() {
        let policy = TenantIdPolicy::default();
        assert!(policy.validate(&TenantId::new("acme corp")).is_err());
        assert!(policy.validate(&TenantId::new("")).is_err());
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let err = TenantIdPolicy::new(10, "[unclosed").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidPattern { .. }));
    }
}
