//! Filter predicates.
//!
//! A [`Predicate`] is the condition a filter contributes to a query. Stores
//! translate predicates into their own query language; [`Predicate::matches`]
//! evaluates one against a record held in memory.

use std::fmt;

use serde_json::{Map, Value};

/// A condition over record attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// The attribute equals the value. A null value never matches; use
    /// [`Predicate::IsNull`] instead.
    Eq {
        /// Attribute name.
        field: String,
        /// Expected value.
        value: Value,
    },
    /// The attribute is absent or null.
    IsNull {
        /// Attribute name.
        field: String,
    },
    /// Every predicate holds. An empty conjunction always holds.
    And(Vec<Predicate>),
    /// At least one predicate holds. An empty disjunction never holds.
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Builds an equality predicate.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Builds a null check.
    pub fn is_null(field: impl Into<String>) -> Self {
        Predicate::IsNull {
            field: field.into(),
        }
    }

    /// Combines two predicates with AND, flattening nested conjunctions.
    pub fn and(self, other: Predicate) -> Self {
        let mut parts = match self {
            Predicate::And(parts) => parts,
            single => vec![single],
        };
        match other {
            Predicate::And(more) => parts.extend(more),
            single => parts.push(single),
        }
        Predicate::And(parts)
    }

    /// Combines two predicates with OR.
    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(vec![self, other])
    }

    /// Evaluates the predicate against record attributes.
    pub fn matches(&self, attributes: &Map<String, Value>) -> bool {
        match self {
            Predicate::Eq { field, value } => match attributes.get(field) {
                Some(actual) if !actual.is_null() => values_equal(actual, value),
                _ => false,
            },
            Predicate::IsNull { field } => attributes.get(field).is_none_or(Value::is_null),
            Predicate::And(parts) => parts.iter().all(|p| p.matches(attributes)),
            Predicate::Or(parts) => parts.iter().any(|p| p.matches(attributes)),
        }
    }

    /// Visits every attribute name the predicate refers to.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Eq { field, .. } | Predicate::IsNull { field } => out.push(field),
            Predicate::And(parts) | Predicate::Or(parts) => {
                for part in parts {
                    part.collect_fields(out);
                }
            }
        }
    }
}

// Integers and floats with the same numeric value compare equal, as they do in SQL.
fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => actual == expected,
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Eq { field, value } => write!(f, "{} = {}", field, value),
            Predicate::IsNull { field } => write!(f, "{} IS NULL", field),
            Predicate::And(parts) if parts.is_empty() => write!(f, "TRUE"),
            Predicate::Or(parts) if parts.is_empty() => write!(f, "FALSE"),
            Predicate::And(parts) => write_joined(f, parts, " AND "),
            Predicate::Or(parts) => write_joined(f, parts, " OR "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, parts: &[Predicate], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", part)?;
    }
    write!(f, ")")
}
