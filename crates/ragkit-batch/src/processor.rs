//! The batch processor: bounded batch construction, retries with back-off,
//! memory back-pressure, cancellation, and progress eventing.

use crate::adaptive::AdaptiveSizer;
use crate::config::BatchConfig;
use crate::error::{BatchError, Result};
use crate::events::{BatchEvent, BatchObserver};
use crate::memory::MemorySampler;
use crate::metrics::{BatchMetrics, BatchStatus};
use crate::tokens::{BatchItem, CharEstimator, TokenEstimator};
use parking_lot::Mutex;
use ragkit::CancelToken;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Errors a process function may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Per-call options for [`BatchProcessor::process_batches`].
#[derive(Default)]
pub struct ProcessOptions {
    /// Token estimator override; chars/4 when absent.
    pub estimator: Option<Arc<dyn TokenEstimator>>,
    /// Event observer.
    pub observer: Option<Arc<dyn BatchObserver>>,
    /// External abort signal, checked alongside `cancel()`.
    pub abort: Option<CancelToken>,
}

impl ProcessOptions {
    /// Options with all defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom token estimator.
    #[must_use]
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Receive events on an observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn BatchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Attach an abort signal.
    #[must_use]
    pub fn with_abort(mut self, abort: CancelToken) -> Self {
        self.abort = Some(abort);
        self
    }
}

/// Transforms large item sequences into bounded batches and drives a
/// user-supplied process function over them, preserving input order.
pub struct BatchProcessor {
    config: BatchConfig,
    metrics: Mutex<BatchMetrics>,
    status: Mutex<BatchStatus>,
    cancel_flag: Arc<AtomicBool>,
    processing: AtomicBool,
}

/// Resets the processing flag however the call ends.
struct ProcessingGuard<'a>(&'a BatchProcessor);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.processing.store(false, Ordering::SeqCst);
        self.0.status.lock().processing = false;
    }
}

impl BatchProcessor {
    /// Create a processor with the given configuration.
    #[must_use]
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            metrics: Mutex::new(BatchMetrics::default()),
            status: Mutex::new(BatchStatus::default()),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            processing: AtomicBool::new(false),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Cooperatively cancel the outstanding call. The in-flight batch
    /// settles first; the call then fails with [`BatchError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    /// Cumulative metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> BatchMetrics {
        self.metrics.lock().clone()
    }

    /// Reset metrics between calls.
    pub fn reset_metrics(&self) {
        *self.metrics.lock() = BatchMetrics::default();
    }

    /// Live status snapshot.
    #[must_use]
    pub fn status(&self) -> BatchStatus {
        *self.status.lock()
    }

    /// Process `items` in bounded batches through `process_fn`.
    ///
    /// Results come back one per item, in the original input order,
    /// concatenated across batches. `process_fn` must return exactly as many
    /// results as the batch it was handed.
    pub async fn process_batches<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        process_fn: F,
        options: ProcessOptions,
    ) -> Result<Vec<R>>
    where
        T: BatchItem,
        R: Send + 'static,
        F: Fn(Vec<T>) -> Fut + Send + Sync,
        Fut: Future<Output = std::result::Result<Vec<R>, BoxError>> + Send,
    {
        if items.is_empty() {
            return Err(BatchError::InvalidArgument(
                "items must not be empty".to_string(),
            ));
        }
        if self.processing.swap(true, Ordering::SeqCst) {
            return Err(BatchError::Busy);
        }
        let _guard = ProcessingGuard(self);
        self.cancel_flag.store(false, Ordering::SeqCst);
        {
            let mut status = self.status.lock();
            status.processing = true;
            status.progress = 0.0;
        }

        let estimator: Arc<dyn TokenEstimator> = options
            .estimator
            .clone()
            .unwrap_or_else(|| Arc::new(CharEstimator));
        let limits = self.config.resolved_limits();
        let token_budget = ((limits.max_tokens as f64) * self.config.target_batch_utilization)
            .floor()
            .max(1.0) as usize;
        let mut sizer = self
            .config
            .adaptive_sizing
            .then(|| AdaptiveSizer::new(limits.max_items));
        let mut memory = self.config.max_memory_mb.and_then(|_| MemorySampler::new());

        let total = items.len();
        self.metrics.lock().total_items += total;
        self.emit(
            &options,
            BatchEvent::Start {
                total_items: total,
                estimated_batches: total.div_ceil(limits.max_items.max(1)),
            },
        );

        let started = Instant::now();
        let mut results: Vec<R> = Vec::with_capacity(total);
        let mut cursor = 0usize;
        let mut batch_index = 0usize;
        let mut shrink = 1usize;

        while cursor < total {
            if self.is_cancelled(&options) {
                self.emit(&options, BatchEvent::Cancelled);
                self.finish_metrics(started);
                return Err(BatchError::Cancelled);
            }

            // Memory back-pressure: sample before building each batch and at
            // least halve the next batch while over the limit.
            if let (Some(limit), Some(sampler)) = (self.config.max_memory_mb, memory.as_mut()) {
                if let Some(used) = sampler.sample_mb() {
                    let mut metrics = self.metrics.lock();
                    metrics.peak_memory_mb = metrics.peak_memory_mb.max(used);
                    drop(metrics);
                    if used > limit {
                        shrink = (shrink * 2).min(64);
                        warn!(used_mb = used, limit_mb = limit, "Memory limit crossed, shrinking batches");
                        self.emit(
                            &options,
                            BatchEvent::MemoryWarning {
                                used_mb: used,
                                limit_mb: limit,
                            },
                        );
                    } else {
                        shrink = 1;
                    }
                }
            }

            let target_items = sizer
                .as_ref()
                .map_or(limits.max_items, AdaptiveSizer::target)
                .min(limits.max_items);
            let max_items_now = (target_items / shrink).max(1);

            // Greedy construction: append until the next item would cross the
            // token budget or the item cap. A single oversize item still gets
            // its own batch rather than being dropped.
            let mut batch: Vec<T> = Vec::new();
            let mut batch_tokens = 0usize;
            while cursor < total && batch.len() < max_items_now {
                let item_tokens = estimator.estimate(items[cursor].text());
                if !batch.is_empty() && batch_tokens + item_tokens > token_budget {
                    break;
                }
                batch.push(items[cursor].clone());
                batch_tokens += item_tokens;
                cursor += 1;
                if batch_tokens > token_budget {
                    break;
                }
            }

            let batch_size = batch.len();
            let batch_started = Instant::now();
            let mut attempt: u32 = 1;
            let batch_results = loop {
                match process_fn(batch.clone()).await {
                    Ok(batch_results) => {
                        if batch_results.len() != batch_size {
                            let err = BatchError::ResultLengthMismatch {
                                batch_index,
                                expected: batch_size,
                                actual: batch_results.len(),
                            };
                            self.emit(
                                &options,
                                BatchEvent::Error {
                                    error: err.to_string(),
                                },
                            );
                            self.metrics.lock().failed_batches += 1;
                            self.finish_metrics(started);
                            return Err(err);
                        }
                        break batch_results;
                    }
                    Err(err) => {
                        if attempt >= self.config.max_retries.max(1) {
                            let failure = BatchError::BatchFailed {
                                batch_index,
                                attempts: attempt,
                                reason: err.to_string(),
                            };
                            self.emit(
                                &options,
                                BatchEvent::Error {
                                    error: failure.to_string(),
                                },
                            );
                            self.metrics.lock().failed_batches += 1;
                            self.finish_metrics(started);
                            return Err(failure);
                        }
                        self.emit(
                            &options,
                            BatchEvent::BatchRetry {
                                batch_index,
                                retry_count: attempt,
                                max_retries: self.config.max_retries,
                            },
                        );
                        let backoff = self.config.retry_delay * 2u32.saturating_pow(attempt - 1);
                        debug!(batch = batch_index, attempt, delay_ms = backoff.as_millis() as u64, "Batch attempt failed, backing off");
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                        if self.is_cancelled(&options) {
                            self.emit(&options, BatchEvent::Cancelled);
                            self.finish_metrics(started);
                            return Err(BatchError::Cancelled);
                        }
                    }
                }
            };

            let duration_ms = batch_started.elapsed().as_millis() as u64;
            results.extend(batch_results);
            {
                let mut metrics = self.metrics.lock();
                metrics.processed_items += batch_size;
                metrics.total_batches += 1;
                metrics.api_calls_saved =
                    metrics.total_items.saturating_sub(metrics.total_batches);
                metrics.avg_batch_size = if metrics.total_batches == 0 {
                    0.0
                } else {
                    metrics.processed_items as f64 / metrics.total_batches as f64
                };
            }
            if let Some(sizer) = sizer.as_mut() {
                let per_item = if batch_size == 0 {
                    0.0
                } else {
                    duration_ms as f64 / batch_size as f64
                };
                sizer.record(batch_size, per_item, true);
            }
            self.status.lock().progress = cursor as f64 / total as f64;
            self.emit(
                &options,
                BatchEvent::BatchComplete {
                    batch_index,
                    batch_size,
                    duration_ms,
                },
            );
            self.emit(
                &options,
                BatchEvent::Progress {
                    processed: cursor,
                    total,
                    percentage: (cursor as f64 / total as f64) * 100.0,
                },
            );
            batch_index += 1;
        }

        self.finish_metrics(started);
        self.emit(
            &options,
            BatchEvent::Complete {
                total_items: total,
                total_batches: batch_index,
                total_time_ms: started.elapsed().as_millis() as u64,
            },
        );
        Ok(results)
    }

    fn is_cancelled(&self, options: &ProcessOptions) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
            || options
                .abort
                .as_ref()
                .is_some_and(CancelToken::is_cancelled)
    }

    fn finish_metrics(&self, started: Instant) {
        self.metrics.lock().total_time_ms += started.elapsed().as_millis() as u64;
    }

    fn emit(&self, options: &ProcessOptions, event: BatchEvent) {
        debug!(event = event.name(), "Batch event");
        if let Some(observer) = &options.observer {
            observer.on_event(&event);
        }
    }
}
