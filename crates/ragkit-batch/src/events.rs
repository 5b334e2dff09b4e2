//! Progress and lifecycle events emitted during batch processing.
//!
//! Callers either implement [`BatchObserver`] or bridge events onto a tokio
//! channel with [`ChannelObserver`]. Event names are stable strings
//! (`start`, `progress`, `batch_complete`, ...) so downstream consumers can
//! route without matching on the enum.

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

/// One batch-processing event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    /// Processing began.
    Start {
        /// Total items queued.
        total_items: usize,
        /// Coarse estimate of how many batches will run.
        estimated_batches: usize,
    },
    /// Items finished processing.
    Progress {
        /// Items processed so far.
        processed: usize,
        /// Total items queued.
        total: usize,
        /// `processed / total` as a percentage.
        percentage: f64,
    },
    /// One batch finished successfully.
    BatchComplete {
        /// Zero-based batch index.
        batch_index: usize,
        /// Items in the batch.
        batch_size: usize,
        /// Wall-clock duration of the successful attempt, in milliseconds.
        duration_ms: u64,
    },
    /// A batch attempt failed and will be retried.
    BatchRetry {
        /// Zero-based batch index.
        batch_index: usize,
        /// Retry number about to run (1 on the first retry).
        retry_count: u32,
        /// The attempt budget.
        max_retries: u32,
    },
    /// Heap usage crossed the configured limit.
    MemoryWarning {
        /// Sampled process memory, in MiB.
        used_mb: u64,
        /// The configured limit, in MiB.
        limit_mb: u64,
    },
    /// Processing was cancelled.
    Cancelled,
    /// A batch exhausted its retries.
    Error {
        /// The final failure reason.
        error: String,
    },
    /// Processing finished.
    Complete {
        /// Total items processed.
        total_items: usize,
        /// Batches run.
        total_batches: usize,
        /// End-to-end wall-clock time, in milliseconds.
        total_time_ms: u64,
    },
}

impl BatchEvent {
    /// Stable event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            BatchEvent::Start { .. } => "start",
            BatchEvent::Progress { .. } => "progress",
            BatchEvent::BatchComplete { .. } => "batch_complete",
            BatchEvent::BatchRetry { .. } => "batch_retry",
            BatchEvent::MemoryWarning { .. } => "memory_warning",
            BatchEvent::Cancelled => "cancelled",
            BatchEvent::Error { .. } => "error",
            BatchEvent::Complete { .. } => "complete",
        }
    }
}

/// Receives batch events as they happen. Implementations must not block.
pub trait BatchObserver: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &BatchEvent);
}

/// Bridges events onto an unbounded tokio channel.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<BatchEvent>,
}

impl ChannelObserver {
    /// Create the observer and the receiving half.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl BatchObserver for ChannelObserver {
    fn on_event(&self, event: &BatchEvent) {
        // Receiver dropped means nobody is listening anymore; fine.
        let _ = self.tx.send(event.clone());
    }
}

/// Collects events in memory. Useful for tests and post-hoc inspection.
#[derive(Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<BatchEvent>>,
}

impl CollectingObserver {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything seen so far.
    #[must_use]
    pub fn events(&self) -> Vec<BatchEvent> {
        self.events.lock().clone()
    }

    /// Count of events with the given name.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }
}

impl BatchObserver for CollectingObserver {
    fn on_event(&self, event: &BatchEvent) {
        self.events.lock().push(event.clone());
    }
}
