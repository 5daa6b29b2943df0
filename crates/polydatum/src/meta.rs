//! Read-only metadata attached to an execution context.

use std::collections::BTreeMap;
use std::fmt;

use polydatum_config::is_blank;
use serde_json::{Map, Value};

use crate::errors::DalError;

/// Immutable key/value metadata set when a context is created.
///
/// Unknown keys read as "not set". Only [`Meta::require`] fails, and only
/// when the value is missing or blank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    values: BTreeMap<String, Value>,
}

impl Meta {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `key`, or `None` when it was never set.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the value for `key`, or `default` when it was never set.
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.get(key).unwrap_or(default)
    }

    /// Returns the value for `key`, failing when it is missing or blank.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::MetaRequired`] when the key is unset, `null`,
    /// `false`, zero, or an empty string, array, or object.
    pub fn require(&self, key: &str) -> Result<&Value, DalError> {
        self.get(key)
            .filter(|value| !is_blank(value))
            .ok_or_else(|| DalError::meta_required(key))
    }

    /// Iterates over every key and value in key order.
    pub fn items(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when no metadata was supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K> FromIterator<(K, Value)> for Meta
where
    K: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        }
    }
}

impl From<Map<String, Value>> for Meta {
    fn from(fields: Map<String, Value>) -> Self {
        fields.into_iter().collect()
    }
}

impl fmt::Display for Meta {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string_pretty(&self.values).map_err(|_| fmt::Error)?;
        formatter.write_str(&rendered)
    }
}
