//! Configuration for the API logger.
//!
//! [`FilterConfig`] holds the per-exchange settings: which exchanges are
//! eligible, how URLs are rendered, and which keys are masked. [`BatchConfig`]
//! sizes the asynchronous persistence pipeline. Both are built once at startup
//! and are read-only afterwards.

use crate::error::ConfigError;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Commonly sensitive keys, opt-in via `FilterConfig::with_default_sensitive_keys`.
pub const DEFAULT_SENSITIVE_KEYS: [&str; 4] = ["password", "token", "access", "refresh"];

/// How the logged URL is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UrlResolution {
    /// `scheme://host/path?query`, host normalised.
    #[default]
    Absolute,
    /// `/path?query`.
    FullPath,
    /// `scheme://<raw Host header>/path?query`, no normalisation.
    RawUri,
}

impl UrlResolution {
    /// The configuration name of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absolute => "ABSOLUTE",
            Self::FullPath => "FULL_PATH",
            Self::RawUri => "RAW_URI",
        }
    }
}

impl FromStr for UrlResolution {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ABSOLUTE" => Ok(Self::Absolute),
            "FULL_PATH" => Ok(Self::FullPath),
            "RAW_URI" => Ok(Self::RawUri),
            other => Err(ConfigError::InvalidUrlResolution(other.to_string())),
        }
    }
}

impl fmt::Display for UrlResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator settings for deciding and building log records.
///
/// Empty sets mean "no restriction".
///
/// ```ignore
/// use api_logger::FilterConfig;
///
/// let config = FilterConfig::new()
///     .persistence(true)
///     .allowed_methods(["GET", "POST"])
///     .excluded_namespace("internal")
///     .sensitive_keys(["authorization", "password"]);
/// ```
#[derive(Clone, Default)]
pub struct FilterConfig {
    /// Push eligible records into the batch queue.
    pub(crate) persistence_enabled: bool,

    /// Notify the signal synchronously for eligible records.
    pub(crate) signal_enabled: bool,

    pub(crate) url_resolution: UrlResolution,

    /// Upper-cased method names.
    pub(crate) allowed_methods: HashSet<String>,

    pub(crate) allowed_status_codes: HashSet<u16>,

    pub(crate) excluded_route_names: HashSet<String>,

    pub(crate) excluded_namespaces: HashSet<String>,

    /// Lower-cased keys whose values are masked.
    pub(crate) sensitive_keys: HashSet<String>,

    /// Request bodies above this size are not parsed. `None` = unlimited.
    pub(crate) max_request_body_size: Option<usize>,

    /// Response bodies above this size are not parsed. `None` = unlimited.
    pub(crate) max_response_body_size: Option<usize>,
}

impl FilterConfig {
    /// Create a configuration with everything disabled and no restrictions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable persistence through the batch pipeline.
    pub fn persistence(mut self, enabled: bool) -> Self {
        self.persistence_enabled = enabled;
        self
    }

    /// Enable or disable synchronous signal notification.
    pub fn signal(mut self, enabled: bool) -> Self {
        self.signal_enabled = enabled;
        self
    }

    /// Set the URL resolution mode.
    pub fn url_resolution(mut self, mode: UrlResolution) -> Self {
        self.url_resolution = mode;
        self
    }

    /// Only log these HTTP methods (case-insensitive).
    pub fn allowed_methods(mut self, methods: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.allowed_methods = methods
            .into_iter()
            .map(|m| m.as_ref().trim().to_ascii_uppercase())
            .collect();
        self
    }

    /// Only log these response status codes.
    pub fn allowed_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.allowed_status_codes = codes.into_iter().collect();
        self
    }

    /// Never log routes with this name.
    pub fn excluded_route_name(mut self, name: impl Into<String>) -> Self {
        self.excluded_route_names.insert(name.into());
        self
    }

    /// Never log routes with any of these names.
    pub fn excluded_route_names(
        mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.excluded_route_names
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Never log routes in this namespace.
    pub fn excluded_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.excluded_namespaces.insert(namespace.into());
        self
    }

    /// Never log routes in any of these namespaces.
    pub fn excluded_namespaces(
        mut self,
        namespaces: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.excluded_namespaces
            .extend(namespaces.into_iter().map(Into::into));
        self
    }

    /// Add keys whose values are masked (case-insensitive).
    pub fn sensitive_keys(mut self, keys: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.sensitive_keys
            .extend(keys.into_iter().map(|k| k.as_ref().to_lowercase()));
        self
    }

    /// Add [`DEFAULT_SENSITIVE_KEYS`] to the masked keys.
    pub fn with_default_sensitive_keys(self) -> Self {
        self.sensitive_keys(DEFAULT_SENSITIVE_KEYS)
    }

    /// Skip parsing request bodies larger than `size` bytes.
    pub fn max_request_body_size(mut self, size: Option<usize>) -> Self {
        self.max_request_body_size = size;
        self
    }

    /// Skip parsing response bodies larger than `size` bytes.
    pub fn max_response_body_size(mut self, size: Option<usize>) -> Self {
        self.max_response_body_size = size;
        self
    }

    /// Whether persistence is enabled.
    pub fn is_persistence_enabled(&self) -> bool {
        self.persistence_enabled
    }

    /// Whether signal mode is enabled.
    pub fn is_signal_enabled(&self) -> bool {
        self.signal_enabled
    }

    /// Whether either output is enabled. A disabled logger does no work at all.
    pub fn is_active(&self) -> bool {
        self.persistence_enabled || self.signal_enabled
    }

    /// The URL resolution mode.
    pub fn resolution(&self) -> UrlResolution {
        self.url_resolution
    }
}

impl fmt::Debug for FilterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterConfig")
            .field("persistence_enabled", &self.persistence_enabled)
            .field("signal_enabled", &self.signal_enabled)
            .field("url_resolution", &self.url_resolution)
            .field("allowed_methods", &self.allowed_methods)
            .field("allowed_status_codes", &self.allowed_status_codes)
            .field("excluded_route_names", &self.excluded_route_names)
            .field("excluded_namespaces", &self.excluded_namespaces)
            .field("sensitive_keys", &self.sensitive_keys.len())
            .field("max_request_body_size", &self.max_request_body_size)
            .field("max_response_body_size", &self.max_response_body_size)
            .finish()
    }
}

/// Longest accepted flush interval.
pub const MAX_FLUSH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Longest accepted shutdown drain timeout.
pub const MAX_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Sizing of the batch queue and worker.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Queue capacity. Records beyond it are dropped. Default: 5000.
    pub(crate) queue_capacity: usize,

    /// Flush once this many records are pending. Default: 50.
    pub(crate) batch_size: usize,

    /// Flush a partial batch after this long. Default: 10s.
    pub(crate) flush_interval: Duration,

    /// Upper bound for the final drain on shutdown. Default: 5s.
    pub(crate) shutdown_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            queue_capacity: 5000,
            batch_size: 50,
            flush_interval: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    /// Set the queue capacity (minimum 1).
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the batch size threshold (minimum 1).
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the idle flush interval.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set the shutdown drain timeout.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Reject settings the worker cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval.is_zero() {
            return Err(ConfigError::InvalidBatch(
                "flush interval must be greater than zero".to_string(),
            ));
        }
        if self.flush_interval > MAX_FLUSH_INTERVAL {
            return Err(ConfigError::InvalidBatch(format!(
                "flush interval {:?} exceeds {:?}",
                self.flush_interval, MAX_FLUSH_INTERVAL
            )));
        }
        if self.shutdown_timeout > MAX_SHUTDOWN_TIMEOUT {
            return Err(ConfigError::InvalidBatch(format!(
                "shutdown timeout {:?} exceeds {:?}",
                self.shutdown_timeout, MAX_SHUTDOWN_TIMEOUT
            )));
        }
        Ok(())
    }

    /// The queue capacity.
    pub fn capacity(&self) -> usize {
        self.queue_capacity
    }

    /// The batch size threshold.
    pub fn size(&self) -> usize {
        self.batch_size
    }

    /// The idle flush interval.
    pub fn interval(&self) -> Duration {
        self.flush_interval
    }

    /// The shutdown drain timeout.
    pub fn timeout(&self) -> Duration {
        self.shutdown_timeout
    }
}
