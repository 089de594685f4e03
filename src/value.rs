//! Typed values stored in configuration documents.
//!
//! A document maps string keys to [`ValueCell`]s. Only four primitive kinds are
//! representable, so a value that reaches the persistence layer can always be
//! encoded.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Full key → value content of one configuration document.
pub type ConfigMap = BTreeMap<String, ValueCell>;

/// One configuration value.
///
/// Cells are replaced wholesale on update, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueCell {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ValueCell {
    /// Name of the active variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueCell::Str(_) => "string",
            ValueCell::Int(_) => "integer",
            ValueCell::Float(_) => "float",
            ValueCell::Bool(_) => "boolean",
        }
    }

    /// Reads the cell as an integer.
    pub fn as_i64(&self, key: &str) -> Result<i64, ConfigError> {
        match self {
            ValueCell::Int(v) => Ok(*v),
            other => Err(ConfigError::Coercion {
                key: key.to_string(),
                expected: "integer",
                found: other.type_name(),
            }),
        }
    }

    /// Reads the cell as a string.
    pub fn as_str(&self, key: &str) -> Result<&str, ConfigError> {
        match self {
            ValueCell::Str(v) => Ok(v),
            other => Err(ConfigError::Coercion {
                key: key.to_string(),
                expected: "string",
                found: other.type_name(),
            }),
        }
    }
}

impl std::fmt::Display for ValueCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueCell::Str(v) => write!(f, "{:?}", v),
            ValueCell::Int(v) => write!(f, "{}", v),
            ValueCell::Float(v) => write!(f, "{}", v),
            ValueCell::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for ValueCell {
    fn from(v: &str) -> Self {
        ValueCell::Str(v.to_string())
    }
}

impl From<String> for ValueCell {
    fn from(v: String) -> Self {
        ValueCell::Str(v)
    }
}

impl From<i64> for ValueCell {
    fn from(v: i64) -> Self {
        ValueCell::Int(v)
    }
}

impl From<f64> for ValueCell {
    fn from(v: f64) -> Self {
        ValueCell::Float(v)
    }
}

impl From<bool> for ValueCell {
    fn from(v: bool) -> Self {
        ValueCell::Bool(v)
    }
}
