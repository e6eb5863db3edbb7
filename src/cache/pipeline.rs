//! Write Pipeline
//!
//! Bounded queue of pending shard writes drained by a fixed pool of worker
//! tasks.
//!
//! # Design
//!
//! - Producers never wait: a full queue sheds the write and logs it
//! - Workers share one receiver; whichever is idle takes the next write
//! - Queue order is FIFO, but two writes to the same key can be applied out
//!   of order when different workers pick them up. The last write to run
//!   wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::metrics::CacheMetrics;

/// Default queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default worker count
pub const DEFAULT_WORKERS: usize = 4;

/// A write waiting to be applied to its shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    /// Cache key
    pub key: String,
    /// Value to store
    pub value: Bytes,
    /// Requested TTL; `None` uses the shard default
    pub ttl: Option<Duration>,
}

impl PendingWrite {
    /// Create a new pending write
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>, ttl: Option<Duration>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl,
        }
    }
}

/// Result of handing a write to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Accepted; a worker will apply it
    Queued,
    /// Queue at capacity; write dropped
    QueueFull,
    /// Pipeline shut down; write dropped
    Closed,
}

impl EnqueueOutcome {
    /// Whether the write was accepted
    pub fn is_queued(&self) -> bool {
        matches!(self, EnqueueOutcome::Queued)
    }
}

/// Destination for dequeued writes
pub trait WriteSink: Send + Sync + 'static {
    /// Apply a write to its owning storage.
    ///
    /// Returns false when no owner exists for the key.
    fn apply(&self, write: PendingWrite) -> bool;
}

/// Bounded multi-producer, multi-consumer write queue
pub struct WritePipeline {
    /// Channel for submitting writes
    tx: mpsc::Sender<PendingWrite>,
    /// Channel receiver (shared by workers)
    rx: Arc<Mutex<mpsc::Receiver<PendingWrite>>>,
    capacity: usize,
    closed: AtomicBool,
    metrics: Arc<CacheMetrics>,
}

impl WritePipeline {
    /// Create a pipeline with room for `capacity` pending writes.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize, metrics: Arc<CacheMetrics>) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            capacity,
            closed: AtomicBool::new(false),
            metrics,
        }
    }

    /// Hand a write to the pipeline without blocking.
    ///
    /// When the queue is full the write is dropped; the caller is not told
    /// beyond the returned outcome and a warning in the log.
    pub fn enqueue(&self, write: PendingWrite) -> EnqueueOutcome {
        if self.closed.load(Ordering::Acquire) {
            self.metrics.record_write_dropped();
            return EnqueueOutcome::Closed;
        }

        match self.tx.try_send(write) {
            Ok(()) => {
                self.metrics.record_write_enqueued();
                EnqueueOutcome::Queued
            }
            Err(TrySendError::Full(write)) => {
                self.metrics.record_write_dropped();
                warn!(
                    key = %write.key,
                    capacity = self.capacity,
                    "Write queue full, dropping shard write"
                );
                EnqueueOutcome::QueueFull
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.record_write_dropped();
                EnqueueOutcome::Closed
            }
        }
    }

    /// Number of writes waiting in the queue
    pub fn len(&self) -> usize {
        self.capacity.saturating_sub(self.tx.capacity())
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of pending writes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the pipeline has stopped accepting writes
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting writes. Queued writes are left to the workers until
    /// they are cancelled.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Spawn `count` workers that apply writes to `sink` until `shutdown`
    /// is cancelled.
    pub fn spawn_workers(
        &self,
        count: usize,
        sink: Arc<dyn WriteSink>,
        shutdown: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        (0..count.max(1))
            .map(|id| {
                let rx = Arc::clone(&self.rx);
                let sink = Arc::clone(&sink);
                let metrics = Arc::clone(&self.metrics);
                let shutdown = shutdown.clone();
                tokio::spawn(worker_loop(id, rx, sink, metrics, shutdown))
            })
            .collect()
    }
}

impl std::fmt::Debug for WritePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritePipeline")
            .field("capacity", &self.capacity)
            .field("pending", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[instrument(skip(rx, sink, metrics, shutdown))]
async fn worker_loop(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<PendingWrite>>>,
    sink: Arc<dyn WriteSink>,
    metrics: Arc<CacheMetrics>,
    shutdown: CancellationToken,
) {
    debug!("Write worker started");

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            write = async {
                let mut rx = rx.lock().await;
                rx.recv().await
            } => write,
        };

        let Some(write) = next else {
            break;
        };

        if sink.apply(write) {
            metrics.record_write_applied();
        } else {
            metrics.record_write_unrouted();
        }
    }

    debug!("Write worker stopped");
}

// =============================================================================
// Tests
// =============================================================================
