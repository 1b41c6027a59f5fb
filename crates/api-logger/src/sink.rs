//! Storage sinks for flushed batches.
//!
//! The worker hands every batch to a [`LogSink`] exactly once. A failed write
//! is not retried: the worker logs a warning, counts the loss and moves on.

use crate::error::{SinkError, SinkResult};
use crate::record::StoredRecord;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;

/// Destination for flushed batches.
#[async_trait]
pub trait LogSink: Send + Sync + 'static {
    /// Persist one batch. Records are in queue order.
    async fn write_batch(&self, records: &[StoredRecord]) -> SinkResult<()>;

    /// Short name used in diagnostics.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// In-memory sink (not persistent, for testing/dev).
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<Vec<StoredRecord>>>>,
    failing: Arc<AtomicBool>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every batch written so far, in write order.
    pub fn batches(&self) -> Vec<Vec<StoredRecord>> {
        self.batches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    /// Every record written so far, flattened.
    pub fn records(&self) -> Vec<StoredRecord> {
        self.batches().into_iter().flatten().collect()
    }

    /// Make subsequent writes fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn write_batch(&self, records: &[StoredRecord]) -> SinkResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("memory sink set to fail".to_string()));
        }
        let mut batches = self
            .batches
            .lock()
            .map_err(|_| SinkError::Unavailable("lock poisoned".to_string()))?;
        batches.push(records.to_vec());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Appends records to a file as JSON lines.
///
/// ```ignore
/// use api_logger::FileSink;
///
/// let sink = FileSink::new("./api_logs.jsonl");
/// ```
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    /// Create a sink writing to `path`. The file is created on first write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LogSink for FileSink {
    async fn write_batch(&self, records: &[StoredRecord]) -> SinkResult<()> {
        let mut buf = Vec::with_capacity(records.len() * 256);
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Emits each record as a `tracing` event on the `api_logger` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl LogSink for TracingSink {
    async fn write_batch(&self, records: &[StoredRecord]) -> SinkResult<()> {
        for record in records {
            tracing::info!(
                target: "api_logger",
                api = %record.api,
                method = %record.method,
                status = record.status_code,
                client_ip = %record.client_ip_address,
                execution_time = record.execution_time,
                added_on = %record.added_on,
                "api request"
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}
