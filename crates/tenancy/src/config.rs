//! Tenancy configuration.
//!
//! Settings can be built programmatically, deserialized with `serde`, read
//! from the environment with [`TenancyConfig::from_env`], or flattened into
//! an application's `clap` command line.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TENANCY_FOREIGN_KEY_SUFFIX` | `_id` | Suffix used to derive tenant attribute and tenant entity names |
//! | `TENANCY_DEFAULT_TENANT` | unset | Tenant used when a context has none |
//! | `TENANCY_ENFORCE_CURRENT_TENANT` | true | Reject writes whose tenant differs from the current tenant |
//! | `TENANCY_MAX_TENANT_ID_LENGTH` | 64 | Maximum tenant ID length |
//! | `TENANCY_TENANT_ID_PATTERN` | `^[a-zA-Z0-9_\-/]+$` | Allowed tenant ID characters |
//!
//! # Example
//!
//! ```rust
//! use helios_tenancy::TenancyConfig;
//!
//! let config = TenancyConfig {
//!     default_tenant: Some("admin".to_string()),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use clap::{ArgAction, Args, Parser};
use serde::{Deserialize, Serialize};

use crate::tenant::{FixedTenant, NoFallback, TenantFallback, TenantId};

pub(crate) const DEFAULT_FOREIGN_KEY_SUFFIX: &str = "_id";
pub(crate) const DEFAULT_MAX_TENANT_ID_LENGTH: usize = 64;
pub(crate) const DEFAULT_TENANT_ID_PATTERN: &str = r"^[a-zA-Z0-9_\-/]+$";

/// Configuration for tenant scoping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Args)]
pub struct TenancyConfig {
    /// Suffix that turns an entity name into its identifier attribute
    /// (`Account` + `_id` = `account_id`).
    #[arg(long, env = "TENANCY_FOREIGN_KEY_SUFFIX", default_value = DEFAULT_FOREIGN_KEY_SUFFIX)]
    #[serde(default = "default_foreign_key_suffix")]
    pub foreign_key_suffix: String,

    /// Tenant used when an execution context has none.
    #[arg(long, env = "TENANCY_DEFAULT_TENANT")]
    #[serde(default)]
    pub default_tenant: Option<String>,

    /// Reject writes whose tenant attribute differs from the current tenant.
    #[arg(
        long,
        env = "TENANCY_ENFORCE_CURRENT_TENANT",
        default_value_t = true,
        action = ArgAction::Set
    )]
    #[serde(default = "default_true")]
    pub enforce_current_tenant_on_write: bool,

    /// Maximum length of a tenant ID.
    #[arg(long, env = "TENANCY_MAX_TENANT_ID_LENGTH", default_value_t = DEFAULT_MAX_TENANT_ID_LENGTH)]
    #[serde(default = "default_max_tenant_id_length")]
    pub max_tenant_id_length: usize,

    /// Allowed characters in tenant IDs (regex pattern).
    #[arg(long, env = "TENANCY_TENANT_ID_PATTERN", default_value = DEFAULT_TENANT_ID_PATTERN)]
    #[serde(default = "default_tenant_id_pattern")]
    pub tenant_id_pattern: String,
}

fn default_foreign_key_suffix() -> String {
    DEFAULT_FOREIGN_KEY_SUFFIX.to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_tenant_id_length() -> usize {
    DEFAULT_MAX_TENANT_ID_LENGTH
}

fn default_tenant_id_pattern() -> String {
    DEFAULT_TENANT_ID_PATTERN.to_string()
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            foreign_key_suffix: default_foreign_key_suffix(),
            default_tenant: None,
            enforce_current_tenant_on_write: true,
            max_tenant_id_length: default_max_tenant_id_length(),
            tenant_id_pattern: default_tenant_id_pattern(),
        }
    }
}

#[derive(Parser)]
#[command(name = "helios-tenancy")]
struct EnvOnly {
    #[command(flatten)]
    config: TenancyConfig,
}

impl TenancyConfig {
    /// Creates a configuration from environment variables only.
    ///
    /// Unset variables take their defaults; unparseable values fall back to
    /// the full default configuration.
    pub fn from_env() -> Self {
        EnvOnly::try_parse_from(["helios-tenancy"])
            .map(|parsed| parsed.config)
            .unwrap_or_default()
    }

    /// Returns the fallback policy implied by `default_tenant`.
    pub fn fallback(&self) -> Box<dyn TenantFallback> {
        match &self.default_tenant {
            Some(tenant) => Box::new(FixedTenant::new(TenantId::new(tenant.clone()))),
            None => Box::new(NoFallback),
        }
    }

    /// Validates the configuration and returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.foreign_key_suffix.is_empty() {
            errors.push("Foreign key suffix cannot be empty".to_string());
        }

        if self.max_tenant_id_length == 0 {
            errors.push("Max tenant ID length cannot be 0".to_string());
        }

        if let Err(e) = regex::Regex::new(&self.tenant_id_pattern) {
            errors.push(format!("Invalid tenant ID pattern: {}", e));
        }

        if let Some(tenant) = &self.default_tenant {
            if tenant.is_empty() {
                errors.push("Default tenant cannot be empty".to_string());
            } else if tenant.len() > self.max_tenant_id_length {
                errors.push("Default tenant exceeds max tenant ID length".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
