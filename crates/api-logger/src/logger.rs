//! The per-request core: filter, build, dispatch.

use crate::builder::RecordBuilder;
use crate::config::FilterConfig;
use crate::error::ConfigError;
use crate::exchange::Exchange;
use crate::filter::{ExchangeFilter, FilterChain};
use crate::queue::BatchQueue;
use crate::route::{NoRoutes, RouteResolver};
use crate::signal::ApiLoggerSignal;
use std::sync::Arc;
use std::time::Duration;

/// The assembled logger. Cheap to clone; clones share everything.
///
/// An `ApiLogger` only exists when at least one output is enabled. The
/// builder returns `None` otherwise, and the middleware then skips all work.
///
/// ```ignore
/// use api_logger::{spawn_pipeline, ApiLogger, BatchConfig, FilterConfig, FileSink};
/// use std::sync::Arc;
///
/// let sink = Arc::new(FileSink::new("api.jsonl"));
/// let (queue, worker) = spawn_pipeline(BatchConfig::default(), sink)?;
/// let logger = ApiLogger::builder(FilterConfig::new().persistence(true))
///     .queue(queue)
///     .build()?;
/// ```
#[derive(Clone)]
pub struct ApiLogger {
    inner: Arc<Inner>,
}

struct Inner {
    config: FilterConfig,
    chain: FilterChain,
    builder: RecordBuilder,
    queue: Option<BatchQueue>,
    signal: Option<ApiLoggerSignal>,
    resolver: Arc<dyn RouteResolver>,
}

impl ApiLogger {
    /// Start building a logger for `config`.
    pub fn builder(config: FilterConfig) -> ApiLoggerBuilder {
        ApiLoggerBuilder {
            config,
            queue: None,
            signal: None,
            resolver: None,
            extra_filters: Vec::new(),
        }
    }

    /// The configuration the logger was built with.
    pub fn config(&self) -> &FilterConfig {
        &self.inner.config
    }

    /// The filter chain.
    pub fn chain(&self) -> &FilterChain {
        &self.inner.chain
    }

    /// Whether the exchange is excluded from logging.
    pub fn is_filtered(&self, exchange: &Exchange<'_>) -> bool {
        self.inner
            .chain
            .is_filtered(exchange, self.inner.resolver.as_ref())
    }

    /// Run one exchange through the logger. Returns whether a record was
    /// produced.
    ///
    /// Never blocks on storage and never fails: the record is queued without
    /// waiting, and signal listeners run inline.
    pub fn process(&self, exchange: &Exchange<'_>, elapsed: Duration) -> bool {
        if self.is_filtered(exchange) {
            return false;
        }
        self.dispatch(exchange, elapsed);
        true
    }

    /// Build and send the record for an exchange that already passed the
    /// filter chain.
    pub fn dispatch(&self, exchange: &Exchange<'_>, elapsed: Duration) {
        let record = self.inner.builder.build(exchange, elapsed);

        if let Some(signal) = &self.inner.signal {
            signal.emit(&record);
        }
        if let Some(queue) = &self.inner.queue {
            queue.enqueue(record);
        }

        tracing::debug!(
            method = %exchange.method(),
            path = %exchange.path(),
            status = exchange.status().as_u16(),
            "api exchange logged"
        );
    }
}

impl std::fmt::Debug for ApiLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiLogger")
            .field("config", &self.inner.config)
            .field("chain", &self.inner.chain)
            .field("queue", &self.inner.queue.is_some())
            .field("signal", &self.inner.signal)
            .finish()
    }
}

/// Collects an [`ApiLogger`]'s collaborators.
pub struct ApiLoggerBuilder {
    config: FilterConfig,
    queue: Option<BatchQueue>,
    signal: Option<ApiLoggerSignal>,
    resolver: Option<Arc<dyn RouteResolver>>,
    extra_filters: Vec<Box<dyn ExchangeFilter>>,
}

impl ApiLoggerBuilder {
    /// The queue records are persisted through. Required with persistence.
    pub fn queue(mut self, queue: BatchQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// The signal notified for each record. Required with signal mode.
    pub fn signal(mut self, signal: ApiLoggerSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// The resolver route-dependent filters use. Without one, those filters
    /// never exclude.
    pub fn resolver<R: RouteResolver>(mut self, resolver: R) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Append a custom filter after the built-in ones.
    pub fn filter<F: ExchangeFilter>(mut self, filter: F) -> Self {
        self.extra_filters.push(Box::new(filter));
        self
    }

    /// Assemble the logger.
    ///
    /// Returns `Ok(None)` when both persistence and signal are disabled.
    pub fn build(self) -> Result<Option<ApiLogger>, ConfigError> {
        let config = self.config;
        if !config.is_active() {
            tracing::debug!("api logger disabled, persistence and signal are both off");
            return Ok(None);
        }

        let queue = match (config.is_persistence_enabled(), self.queue) {
            (true, Some(queue)) => Some(queue),
            (true, None) => return Err(ConfigError::MissingQueue),
            (false, _) => None,
        };
        let signal = match (config.is_signal_enabled(), self.signal) {
            (true, Some(signal)) => Some(signal),
            (true, None) => return Err(ConfigError::MissingSignal),
            (false, _) => None,
        };

        let chain = self
            .extra_filters
            .into_iter()
            .fold(FilterChain::from_config(&config), FilterChain::with_filter);

        tracing::debug!(
            persistence = queue.is_some(),
            signal = signal.is_some(),
            url_resolution = %config.resolution(),
            filters = ?chain.filter_names(),
            "api logger enabled"
        );

        Ok(Some(ApiLogger {
            inner: Arc::new(Inner {
                builder: RecordBuilder::new(&config),
                chain,
                queue,
                signal,
                resolver: self.resolver.unwrap_or_else(|| Arc::new(NoRoutes)),
                config,
            }),
        }))
    }
}

impl std::fmt::Debug for ApiLoggerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiLoggerBuilder")
            .field("config", &self.config)
            .field("queue", &self.queue.is_some())
            .field("signal", &self.signal.is_some())
            .field("resolver", &self.resolver.is_some())
            .field("extra_filters", &self.extra_filters.len())
            .finish()
    }
}
