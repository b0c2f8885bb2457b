//! Tenant identifier type.
//!
//! This module defines the [`TenantId`] type, an opaque identifier for tenants.
//! Tenant keys are usually the primary key of the tenant entity type, so both
//! integer and string keys are supported.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An opaque, comparable tenant identifier.
///
/// # Examples
///
/// ```
/// use helios_tenancy::tenant::TenantId;
/// use serde_json::json;
///
/// let acme = TenantId::new("acme");
/// assert_eq!(acme.as_str(), Some("acme"));
/// assert_eq!(acme.to_value(), json!("acme"));
///
/// let numeric = TenantId::from(42);
/// assert_eq!(numeric.as_i64(), Some(42));
/// assert_eq!(TenantId::from_value(&json!(42)), Some(numeric));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(TenantKey);

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
enum TenantKey {
    Int(i64),
    Str(String),
}

impl TenantId {
    /// Creates a tenant ID from a string key.
    pub fn new(id: impl Into<String>) -> Self {
        Self(TenantKey::Str(id.into()))
    }

    /// Returns the key as a string slice, if it is a string key.
    pub fn as_str(&self) -> Option<&str> {
        match &self.0 {
            TenantKey::Str(s) => Some(s),
            TenantKey::Int(_) => None,
        }
    }

    /// Returns the key as an integer, if it is an integer key.
    pub fn as_i64(&self) -> Option<i64> {
        match self.0 {
            TenantKey::Int(n) => Some(n),
            TenantKey::Str(_) => None,
        }
    }

    /// Converts the identifier into the attribute value stored on records.
    pub fn to_value(&self) -> Value {
        match &self.0 {
            TenantKey::Int(n) => Value::from(*n),
            TenantKey::Str(s) => Value::String(s.clone()),
        }
    }

    /// Reads a tenant identifier from a record attribute.
    ///
    /// Returns `None` for null and for values that cannot be a key
    /// (floats, booleans, arrays and objects).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::new(s.as_str())),
            Value::Number(n) => n.as_i64().map(Self::from),
            _ => None,
        }
    }

    /// Returns `true` if the record attribute holds this identifier.
    pub fn matches(&self, value: &Value) -> bool {
        Self::from_value(value).as_ref() == Some(self)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            TenantKey::Int(n) => write!(f, "{}", n),
            TenantKey::Str(s) => write!(f, "{}", s),
        }
    }
}

impl fmt::Debug for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            TenantKey::Int(n) => write!(f, "TenantId({})", n),
            TenantKey::Str(s) => write!(f, "TenantId({:?})", s),
        }
    }
}

impl FromStr for TenantId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TenantId::new(s))
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        TenantId::new(s)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        TenantId::new(s)
    }
}

impl From<i64> for TenantId {
    fn from(n: i64) -> Self {
        Self(TenantKey::Int(n))
    }
}

impl From<TenantId> for Value {
    fn from(id: TenantId) -> Self {
        id.to_value()
    }
}
