//! Learning-based batch sizing.
//!
//! After each batch the processor records how long each item took; the sizer
//! nudges the target batch size a quarter of the way toward the size that
//! showed the best latency per item. The target only biases construction -
//! the hard token/item limits always win.

use std::collections::VecDeque;

const SAMPLE_CAPACITY: usize = 32;
const ADJUST_RATE: f64 = 0.25;

#[derive(Debug, Clone, Copy)]
struct BatchSample {
    batch_size: usize,
    duration_per_item_ms: f64,
    success: bool,
}

/// Moves the target batch size toward the observed latency minimum.
#[derive(Debug)]
pub(crate) struct AdaptiveSizer {
    samples: VecDeque<BatchSample>,
    target: usize,
    min: usize,
    max: usize,
}

impl AdaptiveSizer {
    pub(crate) fn new(max_items: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(SAMPLE_CAPACITY),
            target: max_items,
            min: 1,
            max: max_items.max(1),
        }
    }

    /// Record one finished batch and recompute the target.
    pub(crate) fn record(&mut self, batch_size: usize, duration_per_item_ms: f64, success: bool) {
        if self.samples.len() == SAMPLE_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(BatchSample {
            batch_size,
            duration_per_item_ms,
            success,
        });
        self.recompute();
    }

    /// Current target batch size, always within `[1, max_items]`.
    pub(crate) fn target(&self) -> usize {
        self.target
    }

    fn recompute(&mut self) {
        let best = self
            .samples
            .iter()
            .filter(|s| s.success && s.batch_size > 0)
            .min_by(|a, b| {
                a.duration_per_item_ms
                    .total_cmp(&b.duration_per_item_ms)
            });
        let Some(best) = best else { return };

        let current = self.target as f64;
        let moved = current + (best.batch_size as f64 - current) * ADJUST_RATE;
        self.target = (moved.round() as usize).clamp(self.min, self.max);
    }
}
