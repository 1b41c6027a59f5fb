//! The bounded queue between request handlers and the batch worker.
//!
//! [`BatchQueue::enqueue`] never waits: it uses `try_send` on a bounded tokio
//! channel and drops the record when the channel is full or the worker has
//! gone away. Drops are counted, never reported to the caller.

use crate::error::QueueError;
use crate::record::LogRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Counters shared by the queue and the worker.
#[derive(Debug, Default)]
pub(crate) struct PipelineCounters {
    pub(crate) enqueued: AtomicU64,
    pub(crate) dropped: AtomicU64,
    pub(crate) flushed_records: AtomicU64,
    pub(crate) flushed_batches: AtomicU64,
    pub(crate) failed_batches: AtomicU64,
    pub(crate) failed_records: AtomicU64,
}

impl PipelineCounters {
    pub(crate) fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            flushed_records: self.flushed_records.load(Ordering::Relaxed),
            flushed_batches: self.flushed_batches.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            failed_records: self.failed_records.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time pipeline statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Records accepted by the queue.
    pub enqueued: u64,
    /// Records dropped because the queue was full or closed.
    pub dropped: u64,
    /// Records written to the sink.
    pub flushed_records: u64,
    /// Successful sink writes.
    pub flushed_batches: u64,
    /// Failed sink writes.
    pub failed_batches: u64,
    /// Records discarded with failed batches.
    pub failed_records: u64,
}

/// Producer side of the persistence pipeline.
///
/// Cheap to clone; every clone feeds the same worker.
#[derive(Debug, Clone)]
pub struct BatchQueue {
    sender: mpsc::Sender<LogRecord>,
    counters: Arc<PipelineCounters>,
}

impl BatchQueue {
    pub(crate) fn new(sender: mpsc::Sender<LogRecord>, counters: Arc<PipelineCounters>) -> Self {
        Self { sender, counters }
    }

    /// Hand a record to the worker without waiting.
    ///
    /// A full or closed queue drops the record and bumps the drop counter.
    pub fn enqueue(&self, record: LogRecord) {
        if let Err(e) = self.try_enqueue(record) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(reason = %e, "log record dropped");
        }
    }

    fn try_enqueue(&self, record: LogRecord) -> Result<(), QueueError> {
        self.sender.try_send(record).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Current pipeline statistics.
    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Records waiting in the queue.
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Whether nothing is waiting in the queue.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the worker has stopped accepting records.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn record(n: u16) -> LogRecord {
        LogRecord::new(
            format!("/items/{}", n),
            "GET".to_string(),
            String::new(),
            BTreeMap::new(),
            None,
            None,
            200,
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn test_enqueue_counts() {
        let (tx, mut rx) = mpsc::channel(2);
        let queue = BatchQueue::new(tx, Arc::default());

        queue.enqueue(record(1));
        queue.enqueue(record(2));
        assert_eq!(queue.len(), 2);

        queue.enqueue(record(3));

        let stats = queue.stats();
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.dropped, 1);

        assert_eq!(rx.recv().await.unwrap().api(), "/items/1");
        assert_eq!(rx.recv().await.unwrap().api(), "/items/2");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_closed_queue_drops() {
        let (tx, rx) = mpsc::channel(8);
        let queue = BatchQueue::new(tx, Arc::default());
        drop(rx);

        assert!(queue.is_closed());
        queue.enqueue(record(1));
        assert_eq!(queue.stats().dropped, 1);
        assert_eq!(queue.stats().enqueued, 0);
    }
}
