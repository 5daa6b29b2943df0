//! Shared configuration for the polydatum data access layer.
//!
//! [`Settings`] is the read-only configuration object handed to a
//! `DataManager`. Resources read connection strings and similar values from
//! it, and the telemetry initialiser reads the log filter and format.
//! Settings can be parsed from a JSON document or loaded from prefixed
//! environment variables.

mod defaults;
mod logging;
mod settings;

pub use defaults::{
    DEFAULT_LOG_FILTER, LOG_FILTER_KEY, LOG_FORMAT_KEY, SETTINGS_ENV_PREFIX, default_log_filter,
    default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use settings::{Settings, SettingsError, is_blank};
