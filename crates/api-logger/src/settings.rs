//! Loading logger settings from the environment.
//!
//! Settings are read from `API_LOGGER_*` variables. List values are comma
//! separated.
//!
//! | Variable | Meaning |
//! |---|---|
//! | `API_LOGGER_DATABASE` | enable persistence (`true`/`false`) |
//! | `API_LOGGER_SIGNAL` | enable signal notification |
//! | `API_LOGGER_PATH_TYPE` | `ABSOLUTE`, `FULL_PATH` or `RAW_URI` |
//! | `API_LOGGER_METHODS` | allowed methods |
//! | `API_LOGGER_STATUS_CODES` | allowed status codes |
//! | `API_LOGGER_SKIP_URL_NAME` | excluded route names |
//! | `API_LOGGER_SKIP_NAMESPACE` | excluded namespaces |
//! | `API_LOGGER_EXCLUDE_KEYS` | sensitive keys |
//! | `API_LOGGER_MAX_REQUEST_BODY_SIZE` | bytes, unset = unlimited |
//! | `API_LOGGER_MAX_RESPONSE_BODY_SIZE` | bytes, unset = unlimited |
//! | `API_LOGGER_QUEUE_MAX_SIZE` | queue capacity |
//! | `API_LOGGER_BATCH_SIZE` | batch size threshold |
//! | `API_LOGGER_INTERVAL` | flush interval, seconds |
//! | `API_LOGGER_SHUTDOWN_TIMEOUT` | shutdown drain timeout, seconds |

use crate::config::{BatchConfig, FilterConfig, UrlResolution};
use crate::error::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Prefix of every logger environment variable.
pub const ENV_PREFIX: &str = "API_LOGGER_";

/// Raw logger settings as supplied by the operator.
///
/// Nothing here is validated until [`LoggerSettings::into_configs`].
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LoggerSettings {
    /// Enable persistence through the batch pipeline.
    #[serde(default)]
    pub database: bool,
    /// Enable synchronous signal notification.
    #[serde(default)]
    pub signal: bool,
    /// URL resolution mode name.
    #[serde(default = "default_path_type")]
    pub path_type: String,
    /// Allowed HTTP methods. Empty allows all.
    #[serde(default)]
    pub methods: Vec<String>,
    /// Allowed status codes. Empty allows all.
    #[serde(default)]
    pub status_codes: Vec<u16>,
    /// Route names never logged.
    #[serde(default)]
    pub skip_url_name: Vec<String>,
    /// Namespaces never logged.
    #[serde(default)]
    pub skip_namespace: Vec<String>,
    /// Keys whose values are masked.
    #[serde(default)]
    pub exclude_keys: Vec<String>,
    /// Request bodies above this many bytes are not parsed.
    #[serde(default)]
    pub max_request_body_size: Option<usize>,
    /// Response bodies above this many bytes are not parsed.
    #[serde(default)]
    pub max_response_body_size: Option<usize>,
    /// Queue capacity.
    #[serde(default)]
    pub queue_max_size: Option<usize>,
    /// Batch size threshold.
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Flush interval in seconds.
    #[serde(default)]
    pub interval: Option<u64>,
    /// Shutdown drain timeout in seconds.
    #[serde(default)]
    pub shutdown_timeout: Option<u64>,
}

fn default_path_type() -> String {
    UrlResolution::default().as_str().to_string()
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            database: false,
            signal: false,
            path_type: default_path_type(),
            methods: Vec::new(),
            status_codes: Vec::new(),
            skip_url_name: Vec::new(),
            skip_namespace: Vec::new(),
            exclude_keys: Vec::new(),
            max_request_body_size: None,
            max_response_body_size: None,
            queue_max_size: None,
            batch_size: None,
            interval: None,
            shutdown_timeout: None,
        }
    }
}

impl LoggerSettings {
    /// Read settings from `API_LOGGER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_prefixed(ENV_PREFIX)
    }

    /// Read settings from variables with a custom prefix (including the
    /// trailing underscore).
    pub fn from_env_prefixed(prefix: &str) -> Result<Self, ConfigError> {
        envy::prefixed(prefix)
            .from_env::<Self>()
            .map_err(ConfigError::from)
    }

    /// Load a `.env` file (if present) and then read settings.
    ///
    /// Existing environment variables are not overridden.
    pub fn from_dotenv() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "no .env file loaded");
        }
        Self::from_env()
    }

    /// Validate and convert into typed configurations.
    ///
    /// Fails on an unknown path type or an unusable batch setting.
    pub fn into_configs(self) -> Result<(FilterConfig, BatchConfig), ConfigError> {
        let url_resolution: UrlResolution = self.path_type.parse()?;

        let filter = FilterConfig::new()
            .persistence(self.database)
            .signal(self.signal)
            .url_resolution(url_resolution)
            .allowed_methods(self.methods)
            .allowed_status_codes(self.status_codes)
            .excluded_route_names(self.skip_url_name)
            .excluded_namespaces(self.skip_namespace)
            .sensitive_keys(self.exclude_keys)
            .max_request_body_size(self.max_request_body_size)
            .max_response_body_size(self.max_response_body_size);

        let mut batch = BatchConfig::new();
        if let Some(capacity) = self.queue_max_size {
            batch = batch.queue_capacity(capacity);
        }
        if let Some(size) = self.batch_size {
            batch = batch.batch_size(size);
        }
        if let Some(secs) = self.interval {
            batch = batch.flush_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = self.shutdown_timeout {
            batch = batch.shutdown_timeout(Duration::from_secs(secs));
        }
        batch.validate()?;

        Ok((filter, batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 8] = [
        "API_LOGGER_DATABASE",
        "API_LOGGER_SIGNAL",
        "API_LOGGER_PATH_TYPE",
        "API_LOGGER_METHODS",
        "API_LOGGER_STATUS_CODES",
        "API_LOGGER_SKIP_NAMESPACE",
        "API_LOGGER_EXCLUDE_KEYS",
        "API_LOGGER_BATCH_SIZE",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_from_empty_env() {
        clear_env();
        let settings = LoggerSettings::from_env().unwrap();
        assert_eq!(settings, LoggerSettings::default());

        let (filter, batch) = settings.into_configs().unwrap();
        assert!(!filter.is_active());
        assert_eq!(batch.size(), 50);
    }

    #[test]
    #[serial]
    fn test_settings_from_env() {
        clear_env();
        std::env::set_var("API_LOGGER_DATABASE", "true");
        std::env::set_var("API_LOGGER_PATH_TYPE", "FULL_PATH");
        std::env::set_var("API_LOGGER_METHODS", "GET,POST");
        std::env::set_var("API_LOGGER_STATUS_CODES", "200,201");
        std::env::set_var("API_LOGGER_SKIP_NAMESPACE", "internal");
        std::env::set_var("API_LOGGER_EXCLUDE_KEYS", "Authorization");
        std::env::set_var("API_LOGGER_BATCH_SIZE", "5");

        let settings = LoggerSettings::from_env().unwrap();
        clear_env();

        assert!(settings.database);
        assert!(!settings.signal);
        assert_eq!(settings.methods, vec!["GET", "POST"]);
        assert_eq!(settings.status_codes, vec![200, 201]);

        let (filter, batch) = settings.into_configs().unwrap();
        assert!(filter.is_persistence_enabled());
        assert_eq!(filter.resolution(), UrlResolution::FullPath);
        assert!(filter.allowed_status_codes.contains(&201));
        assert!(filter.excluded_namespaces.contains("internal"));
        assert!(filter.sensitive_keys.contains("authorization"));
        assert_eq!(batch.size(), 5);
    }

    #[test]
    fn test_invalid_path_type_fails_fast() {
        let settings = LoggerSettings {
            database: true,
            path_type: "RELATIVE".to_string(),
            ..Default::default()
        };
        let err = settings.into_configs().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrlResolution(_)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let settings = LoggerSettings {
            interval: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            settings.into_configs(),
            Err(ConfigError::InvalidBatch(_))
        ));
    }

    #[test]
    fn test_out_of_range_durations_rejected() {
        let settings = LoggerSettings {
            interval: Some(u64::MAX),
            ..Default::default()
        };
        assert!(matches!(
            settings.into_configs(),
            Err(ConfigError::InvalidBatch(_))
        ));

        let settings = LoggerSettings {
            shutdown_timeout: Some(u64::MAX),
            ..Default::default()
        };
        assert!(matches!(
            settings.into_configs(),
            Err(ConfigError::InvalidBatch(_))
        ));
    }
}
