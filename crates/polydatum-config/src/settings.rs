//! Read-only settings shared by resources, services, and telemetry.
//!
//! Settings are a flat map of keys to JSON values fixed at construction.
//! Unknown keys read as "not set" rather than failing; [`Settings::require`]
//! is the only accessor that rejects a missing or empty value.

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::num::FpCategory;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

use crate::defaults::{DEFAULT_LOG_FILTER, LOG_FILTER_KEY, LOG_FORMAT_KEY, default_log_format};
use crate::logging::LogFormat;

/// Errors raised while loading or reading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A required key is missing or holds an empty value.
    #[error("\"{key}\" has not been configured")]
    NotConfigured {
        /// Key that was required.
        key: String,
    },
    /// The settings document could not be parsed as JSON.
    #[error("invalid settings document: {0}")]
    Parse(#[from] serde_json::Error),
    /// The settings document parsed, but was not a JSON object.
    #[error("settings document must be a JSON object")]
    NotAnObject,
    /// A configured value could not be interpreted.
    #[error("invalid value for \"{key}\": {message}")]
    InvalidValue {
        /// Key holding the value.
        key: String,
        /// Why the value was rejected.
        message: String,
    },
}

impl SettingsError {
    /// Creates a not-configured error.
    #[must_use]
    pub fn not_configured(key: impl Into<String>) -> Self {
        Self::NotConfigured { key: key.into() }
    }

    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Returns `true` when a value counts as empty for `require` accessors.
///
/// `null`, `false`, numeric zero, the empty string, and empty arrays or
/// objects are all empty.
#[must_use]
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number
            .as_f64()
            .is_some_and(|float| float.classify() == FpCategory::Zero),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

/// Immutable key/value settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, Value>,
}

impl Settings {
    /// Creates empty settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses settings from a JSON object document.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Parse`] for malformed JSON and
    /// [`SettingsError::NotAnObject`] when the top level is not an object.
    pub fn from_json_str(document: &str) -> Result<Self, SettingsError> {
        match serde_json::from_str::<Value>(document)? {
            Value::Object(fields) => Ok(fields.into_iter().collect()),
            _ => Err(SettingsError::NotAnObject),
        }
    }

    /// Loads every `{prefix}_{KEY}` environment variable whose key is upper
    /// case.
    ///
    /// Variables whose name or value is not valid Unicode are skipped.
    #[must_use]
    pub fn from_env(prefix: &str) -> Self {
        Self::from_os_vars(prefix, env::vars_os())
    }

    /// Same as [`Settings::from_vars`] for raw OS pairs, dropping any pair
    /// that is not valid Unicode.
    #[must_use]
    pub fn from_os_vars<I>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let unicode = vars.into_iter().filter_map(|(name, value)| {
            Some((name.into_string().ok()?, value.into_string().ok()?))
        });
        Self::from_vars(prefix, unicode)
    }

    /// Builds settings from `(name, value)` pairs using the same filtering
    /// rules as [`Settings::from_env`].
    #[must_use]
    pub fn from_vars<I>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{prefix}_");
        vars.into_iter()
            .filter_map(|(name, value)| {
                let key = name.strip_prefix(marker.as_str())?;
                is_upper_key(key).then(|| (key.to_owned(), Value::String(value)))
            })
            .collect()
    }

    /// Returns the value for `key`, or `None` when it was never set.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the value for `key` when it is a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Returns the value for `key`, failing when it is missing or empty.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::NotConfigured`] when the key is unset or its
    /// value is blank (see [`is_blank`]).
    pub fn require(&self, key: &str) -> Result<&Value, SettingsError> {
        self.get(key)
            .filter(|value| !is_blank(value))
            .ok_or_else(|| SettingsError::not_configured(key))
    }

    /// Returns `true` when `key` has been set.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterates over every key and value in key order.
    pub fn items(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Number of configured keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when nothing has been configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Tracing filter expression, defaulting to `info`.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.get_str(LOG_FILTER_KEY).unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Log output format, defaulting to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidValue`] when the configured format is
    /// not a string or names an unknown format.
    pub fn log_format(&self) -> Result<LogFormat, SettingsError> {
        let Some(value) = self.get(LOG_FORMAT_KEY) else {
            return Ok(default_log_format());
        };
        let text = value
            .as_str()
            .ok_or_else(|| SettingsError::invalid_value(LOG_FORMAT_KEY, "expected a string"))?;
        LogFormat::from_str(text)
            .map_err(|error| SettingsError::invalid_value(LOG_FORMAT_KEY, error.to_string()))
    }
}

impl<K> FromIterator<(K, Value)> for Settings
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

impl fmt::Display for Settings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string_pretty(&self.values).map_err(|_| fmt::Error)?;
        formatter.write_str(&rendered)
    }
}

/// Mirrors the "upper case constant" convention: at least one cased
/// character and no lower-case ones.
fn is_upper_key(key: &str) -> bool {
    key.chars().any(char::is_uppercase) && !key.chars().any(char::is_lowercase)
}
