//! Synchronous notification of logged exchanges.
//!
//! When signal mode is on, every eligible record is handed to the listeners of
//! an [`ApiLoggerSignal`] directly on the request path, bypassing the batch
//! pipeline. Listeners should be quick; anything slow belongs behind the
//! persistence pipeline instead.

use crate::record::LogRecord;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

/// Listener callback type.
pub type SignalListener = Arc<dyn Fn(&LogRecord) + Send + Sync>;

/// A set of listeners notified once per logged exchange.
///
/// ```ignore
/// use api_logger::ApiLoggerSignal;
///
/// let signal = ApiLoggerSignal::new();
/// signal.listen(|record| {
///     println!("{} {} -> {}", record.method(), record.api(), record.status_code());
/// });
/// ```
#[derive(Clone, Default)]
pub struct ApiLoggerSignal {
    listeners: Arc<RwLock<Vec<SignalListener>>>,
}

impl ApiLoggerSignal {
    /// Create a signal with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners run in registration order.
    pub fn listen<F>(&self, listener: F)
    where
        F: Fn(&LogRecord) + Send + Sync + 'static,
    {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(Arc::new(listener)),
            Err(poisoned) => poisoned.into_inner().push(Arc::new(listener)),
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.snapshot().len()
    }

    /// Notify every listener. A panicking listener is logged and skipped.
    pub fn emit(&self, record: &LogRecord) {
        for (index, listener) in self.snapshot().iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| listener(record))).is_err() {
                tracing::warn!(
                    listener = index,
                    api = %record.api(),
                    "api logger signal listener panicked"
                );
            }
        }
    }

    // Listeners are cloned out so none runs under the lock.
    fn snapshot(&self) -> Vec<SignalListener> {
        match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl std::fmt::Debug for ApiLoggerSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiLoggerSignal")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
