//! # api-logger
//!
//! Request/response logging for tower-based HTTP services.
//!
//! Every exchange that reaches the middleware is checked against an ordered
//! [`FilterChain`]. Exchanges that pass are turned into masked [`LogRecord`]s
//! and then either queued for the background [`BatchWorker`], handed
//! synchronously to an [`ApiLoggerSignal`], or both. Storage latency never
//! reaches the request path: the queue is bounded and drops records when
//! full.
//!
//! ## Components
//!
//! - [`FilterChain`] - decides whether an exchange is logged
//! - [`RecordBuilder`] - builds the masked record
//! - [`BatchQueue`] - non-blocking producer side of the pipeline
//! - [`BatchWorker`] - groups records into batches and writes them to a [`LogSink`]
//! - [`ApiLoggerLayer`] - tower middleware tying it together
//!
//! ## Example
//!
//! ```ignore
//! use api_logger::{spawn_pipeline, ApiLogger, ApiLoggerLayer, FileSink, LoggerSettings};
//! use std::sync::Arc;
//!
//! let (filter_config, batch_config) = LoggerSettings::from_env()?.into_configs()?;
//! let (queue, worker) = spawn_pipeline(batch_config, Arc::new(FileSink::new("api.jsonl")))?;
//!
//! let logger = ApiLogger::builder(filter_config)
//!     .queue(queue)
//!     .resolver(routes)
//!     .build()?;
//!
//! let app = tower::ServiceBuilder::new()
//!     .layer(ApiLoggerLayer::new(logger))
//!     .service(app);
//!
//! // on shutdown
//! let report = worker.shutdown().await;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod builder;
pub mod config;
pub mod error;
pub mod exchange;
pub mod filter;
pub mod layer;
pub mod logger;
pub mod mask;
pub mod queue;
pub mod record;
pub mod route;
pub mod settings;
pub mod signal;
pub mod sink;
pub mod worker;

pub use builder::{RecordBuilder, OVERSIZED_PLACEHOLDER, STREAMING_PLACEHOLDER};
pub use config::{
    BatchConfig, FilterConfig, UrlResolution, DEFAULT_SENSITIVE_KEYS, MAX_FLUSH_INTERVAL,
    MAX_SHUTDOWN_TIMEOUT,
};
pub use error::{ConfigError, QueueError, RouteResolutionError, SinkError, SinkResult};
pub use exchange::{Exchange, ResponseBody, StreamingResponse};
pub use filter::{ExchangeFilter, FilterChain, FilterContext};
pub use layer::{ApiLoggerLayer, ApiLoggerService};
pub use logger::{ApiLogger, ApiLoggerBuilder};
pub use mask::{Masker, MASK_TOKEN};
pub use queue::{BatchQueue, PipelineStats};
pub use record::{LogRecord, StoredRecord};
pub use route::{NoRoutes, ResolvedRoute, RouteResolver, RouteTable};
pub use settings::LoggerSettings;
pub use signal::{ApiLoggerSignal, SignalListener};
pub use sink::{FileSink, LogSink, MemorySink, TracingSink};
pub use worker::{spawn_pipeline, Batch, BatchWorker, BatchWorkerHandle, ShutdownReport};
