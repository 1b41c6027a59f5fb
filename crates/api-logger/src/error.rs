//! Error types for the API logger.
//!
//! Only [`ConfigError`] ever reaches the caller, and only at startup. Every
//! other failure is recovered inside the logger and turned into a counter or
//! a `tracing` event, so it never affects the request/response cycle.

use thiserror::Error;

/// Invalid or incomplete logger configuration. Fatal at initialization.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The URL resolution mode is not one of `ABSOLUTE`, `FULL_PATH`, `RAW_URI`.
    #[error("invalid URL resolution mode `{0}`, expected one of: ABSOLUTE, FULL_PATH, RAW_URI")]
    InvalidUrlResolution(String),

    /// Persistence is enabled but no batch queue was supplied.
    #[error("persistence is enabled but no batch queue was provided")]
    MissingQueue,

    /// Signal mode is enabled but no signal was supplied.
    #[error("signal mode is enabled but no signal was provided")]
    MissingSignal,

    /// A batch setting is out of range.
    #[error("invalid batch setting: {0}")]
    InvalidBatch(String),

    /// Environment variable deserialization failed.
    #[error("configuration error: {0}")]
    Env(#[from] envy::Error),
}

/// A request path could not be mapped to a known route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteResolutionError {
    /// No route matches the path.
    #[error("no route matches path `{0}`")]
    NotFound(String),

    /// No resolver was configured.
    #[error("no route resolver configured")]
    NoResolver,
}

/// Storage write failure.
#[derive(Debug, Error)]
pub enum SinkError {
    /// IO error while writing.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The sink is closed or unavailable.
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Why a record did not make it into the batch queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue is at capacity.
    #[error("batch queue is full")]
    Full,

    /// The worker has shut down.
    #[error("batch queue is closed")]
    Closed,
}

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;
