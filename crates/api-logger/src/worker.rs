//! The background batch worker.
//!
//! One worker task drains the [`BatchQueue`](crate::BatchQueue), groups
//! records into a [`Batch`] and writes each batch to a [`LogSink`]. A batch is
//! flushed when it reaches the configured size, or when the flush interval
//! elapses with a partial batch pending. The sink call is the only I/O in the
//! pipeline and it runs here, never on the request path.
//!
//! Shutdown is explicit: [`BatchWorkerHandle::shutdown`] stops the loop, closes
//! the queue and drains what is left, bounded by the shutdown timeout. Records
//! that do not make it out in time are counted in the [`ShutdownReport`].

use crate::config::BatchConfig;
use crate::error::ConfigError;
use crate::queue::{BatchQueue, PipelineCounters, PipelineStats};
use crate::record::{LogRecord, StoredRecord};
use crate::sink::LogSink;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Records accumulated between two flushes. Owned by the worker alone.
#[derive(Debug)]
pub struct Batch {
    records: Vec<LogRecord>,
    limit: usize,
}

impl Batch {
    /// Create an empty batch that is full at `limit` records.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            records: Vec::with_capacity(limit),
            limit,
        }
    }

    /// Append a record.
    pub fn push(&mut self, record: LogRecord) {
        self.records.push(record);
    }

    /// Number of pending records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record is pending.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether the batch reached its size threshold.
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.limit
    }

    /// Take the pending records, leaving a fresh empty batch behind.
    pub fn take(&mut self) -> Vec<LogRecord> {
        std::mem::replace(&mut self.records, Vec::with_capacity(self.limit))
    }
}

/// Outcome of a graceful shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Records written to the sink during the final drain.
    pub flushed_during_drain: u64,
    /// Records still queued or pending when the drain ended, plus records of
    /// batches the sink rejected during the drain.
    pub lost: u64,
    /// Whether the drain finished within the shutdown timeout.
    pub completed: bool,
}

/// Start the persistence pipeline on the current tokio runtime.
///
/// Returns the producer side and the handle that owns the worker's lifecycle.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
pub fn spawn_pipeline(
    config: BatchConfig,
    sink: Arc<dyn LogSink>,
) -> Result<(BatchQueue, BatchWorkerHandle), ConfigError> {
    BatchWorker::spawn(config, sink)
}

/// The worker task state.
pub struct BatchWorker {
    config: BatchConfig,
    receiver: mpsc::Receiver<LogRecord>,
    sink: Arc<dyn LogSink>,
    counters: Arc<PipelineCounters>,
    shutdown: watch::Receiver<bool>,
    batch: Batch,
    reported_drops: u64,
}

impl BatchWorker {
    /// Create the queue and spawn the worker. See [`spawn_pipeline`].
    pub fn spawn(
        config: BatchConfig,
        sink: Arc<dyn LogSink>,
    ) -> Result<(BatchQueue, BatchWorkerHandle), ConfigError> {
        config.validate()?;
        let timeout = config.timeout();

        let (sender, receiver) = mpsc::channel(config.capacity());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(PipelineCounters::default());

        let worker = BatchWorker {
            batch: Batch::new(config.size()),
            config,
            receiver,
            sink,
            counters: counters.clone(),
            shutdown: shutdown_rx,
            reported_drops: 0,
        };
        let task = tokio::spawn(worker.run());

        let queue = BatchQueue::new(sender, counters.clone());
        let handle = BatchWorkerHandle {
            shutdown: shutdown_tx,
            task,
            counters,
            timeout,
        };
        Ok((queue, handle))
    }

    async fn run(mut self) -> ShutdownReport {
        let period = self.config.interval();
        let now = Instant::now();
        let start = now.checked_add(period).unwrap_or(now);
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            sink = self.sink.name(),
            capacity = self.config.capacity(),
            batch_size = self.config.size(),
            interval = ?period,
            "api logger worker started"
        );

        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown) => break,

                received = self.receiver.recv() => match received {
                    Some(record) => {
                        self.batch.push(record);
                        if self.batch.is_full() {
                            self.flush().await;
                            ticker.reset();
                        }
                    }
                    // Every queue handle is gone; nothing more can arrive.
                    None => break,
                },

                _ = ticker.tick() => {
                    if !self.batch.is_empty() {
                        self.flush().await;
                    } else {
                        self.report_drops();
                    }
                }
            }
        }

        let report = self.drain().await;
        tracing::info!(
            flushed = report.flushed_during_drain,
            lost = report.lost,
            completed = report.completed,
            "api logger worker stopped"
        );
        report
    }

    /// Close the queue and flush everything left, bounded by the shutdown
    /// timeout.
    async fn drain(&mut self) -> ShutdownReport {
        self.receiver.close();

        let mut progress = DrainProgress {
            taken: self.batch.len() as u64,
            flushed: 0,
        };
        let completed = tokio::time::timeout(self.config.timeout(), self.drain_all(&mut progress))
            .await
            .is_ok();

        let mut remaining = 0u64;
        while self.receiver.try_recv().is_ok() {
            remaining += 1;
        }

        let lost = progress.taken - progress.flushed + remaining;
        if lost > 0 {
            tracing::warn!(count = lost, "api log records lost at shutdown");
        }
        self.report_drops();

        ShutdownReport {
            flushed_during_drain: progress.flushed,
            lost,
            completed,
        }
    }

    async fn drain_all(&mut self, progress: &mut DrainProgress) {
        while let Some(record) = self.receiver.recv().await {
            progress.taken += 1;
            self.batch.push(record);
            if self.batch.is_full() {
                progress.flushed += self.flush().await;
            }
        }
        if !self.batch.is_empty() {
            progress.flushed += self.flush().await;
        }
    }

    /// Write the pending batch. Returns the number of records the sink
    /// accepted.
    async fn flush(&mut self) -> u64 {
        self.report_drops();

        let records = self.batch.take();
        let count = records.len() as u64;
        let stored: Vec<StoredRecord> = records.iter().map(StoredRecord::from).collect();

        match self.sink.write_batch(&stored).await {
            Ok(()) => {
                self.counters.flushed_batches.fetch_add(1, Ordering::Relaxed);
                self.counters.flushed_records.fetch_add(count, Ordering::Relaxed);
                tracing::debug!(count, sink = self.sink.name(), "flushed api log batch");
                count
            }
            Err(e) => {
                self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
                self.counters.failed_records.fetch_add(count, Ordering::Relaxed);
                tracing::warn!(
                    error = %e,
                    count,
                    sink = self.sink.name(),
                    "failed to flush api log batch, discarding"
                );
                0
            }
        }
    }

    fn report_drops(&mut self) {
        let dropped = self.counters.dropped.load(Ordering::Relaxed);
        if dropped > self.reported_drops {
            tracing::warn!(
                count = dropped - self.reported_drops,
                total = dropped,
                "api log queue full, records dropped"
            );
            self.reported_drops = dropped;
        }
    }
}

impl std::fmt::Debug for BatchWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchWorker")
            .field("config", &self.config)
            .field("sink", &self.sink.name())
            .field("pending", &self.batch.len())
            .finish()
    }
}

struct DrainProgress {
    taken: u64,
    flushed: u64,
}

/// Resolves once shutdown is requested. Pends forever if the handle was
/// dropped without a shutdown, so the worker keeps serving the queue.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    let requested = rx.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}

/// Owns the worker's lifecycle.
#[derive(Debug)]
pub struct BatchWorkerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<ShutdownReport>,
    counters: Arc<PipelineCounters>,
    timeout: Duration,
}

impl BatchWorkerHandle {
    /// Stop the worker, drain the queue and wait for it to finish.
    ///
    /// The drain is bounded by the shutdown timeout. A worker still stuck in
    /// a sink write after twice that long is aborted.
    pub async fn shutdown(self) -> ShutdownReport {
        let _ = self.shutdown.send(true);

        let mut task = self.task;
        let grace = self.timeout.saturating_mul(2);
        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "api logger worker did not stop cleanly");
                unaccounted(&self.counters)
            }
            Err(_) => {
                task.abort();
                let report = unaccounted(&self.counters);
                tracing::warn!(
                    lost = report.lost,
                    "api logger worker aborted after shutdown timeout"
                );
                report
            }
        }
    }

    /// Current pipeline statistics.
    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Whether the worker task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Report for a worker that ended without producing one.
fn unaccounted(counters: &PipelineCounters) -> ShutdownReport {
    let stats = counters.snapshot();
    ShutdownReport {
        flushed_during_drain: 0,
        lost: stats
            .enqueued
            .saturating_sub(stats.flushed_records + stats.failed_records),
        completed: false,
    }
}
