//! Batch processing metrics.

use serde::Serialize;

/// Cumulative processing metrics. Monotonic while a call runs; reset
/// explicitly between calls with `reset_metrics()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchMetrics {
    /// Items submitted across calls.
    pub total_items: usize,
    /// Items successfully processed.
    pub processed_items: usize,
    /// Batches run.
    pub total_batches: usize,
    /// Batches that exhausted their retry budget.
    pub failed_batches: usize,
    /// `total_items - total_batches`: calls avoided versus item-at-a-time.
    pub api_calls_saved: usize,
    /// Mean successful batch size.
    pub avg_batch_size: f64,
    /// Wall-clock processing time, in milliseconds.
    pub total_time_ms: u64,
    /// Highest sampled process memory, in MiB.
    pub peak_memory_mb: u64,
}

impl BatchMetrics {
    /// Items per second over the recorded processing time.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.total_time_ms == 0 {
            return 0.0;
        }
        self.processed_items as f64 / (self.total_time_ms as f64 / 1000.0)
    }

    /// API-call efficiency derived from the counters.
    #[must_use]
    pub fn efficiency(&self) -> EfficiencyReport {
        let ratio = if self.total_items == 0 {
            0.0
        } else {
            self.api_calls_saved as f64 / self.total_items as f64
        };
        EfficiencyReport {
            api_calls_saved: self.api_calls_saved,
            api_call_reduction_ratio: ratio,
        }
    }
}

/// API-call savings, as a count and as a ratio of submitted items.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EfficiencyReport {
    /// Calls avoided versus one call per item.
    pub api_calls_saved: usize,
    /// `api_calls_saved / total_items`.
    pub api_call_reduction_ratio: f64,
}

/// Live status of a processor instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BatchStatus {
    /// True while a `process_batches` call is running.
    pub processing: bool,
    /// Progress of the current call in `[0, 1]`.
    pub progress: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_efficiency_ratio() {
        let metrics = BatchMetrics {
            total_items: 300,
            processed_items: 300,
            total_batches: 3,
            api_calls_saved: 297,
            ..Default::default()
        };
        let report = metrics.efficiency();
        assert_eq!(report.api_calls_saved, 297);
        assert!((report.api_call_reduction_ratio - 0.99).abs() < 1e-9);
    }

    #[test]
    fn test_throughput_handles_zero_time() {
        assert_eq!(BatchMetrics::default().throughput(), 0.0);
    }
}
