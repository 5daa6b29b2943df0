//! Default values shared by the settings accessors.

use crate::logging::LogFormat;

/// Prefix of the environment variables read by [`crate::Settings::from_env`].
pub const SETTINGS_ENV_PREFIX: &str = "POLYDATUM";

/// Settings key holding the tracing filter expression.
pub const LOG_FILTER_KEY: &str = "LOG_FILTER";

/// Settings key holding the log output format.
pub const LOG_FORMAT_KEY: &str = "LOG_FORMAT";

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Returns the filter used when none is configured.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
