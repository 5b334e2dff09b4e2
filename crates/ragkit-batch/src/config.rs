//! Batch processor configuration.

use crate::limits::{resolve_model_limits, ModelBatchLimits};
use std::time::Duration;

const DEFAULT_MAX_TOKENS: usize = 8192;
const DEFAULT_MAX_ITEMS: usize = 100;
const DEFAULT_UTILIZATION: f64 = 0.8;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Configuration for a [`crate::BatchProcessor`].
///
/// Token/item limits left unset resolve through the model preset table and
/// fall back to the defaults; explicitly set fields always win.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Hard token cap per batch.
    pub max_tokens_per_batch: Option<usize>,
    /// Hard item cap per batch.
    pub max_items_per_batch: Option<usize>,
    /// Fraction of the token cap a batch aims to fill.
    pub target_batch_utilization: f64,
    /// Learn a target batch size from observed latency.
    pub adaptive_sizing: bool,
    /// Heap usage threshold (MiB) that triggers back-pressure. `None`
    /// disables sampling.
    pub max_memory_mb: Option<u64>,
    /// Attempts per batch before failing the call.
    pub max_retries: u32,
    /// Base delay for exponential back-off between attempts.
    pub retry_delay: Duration,
    /// Named model whose preset supplies unset limits.
    pub model: Option<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_batch: None,
            max_items_per_batch: None,
            target_batch_utilization: DEFAULT_UTILIZATION,
            adaptive_sizing: false,
            max_memory_mb: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            model: None,
        }
    }
}

impl BatchConfig {
    /// A config with all defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hard token cap.
    #[must_use]
    pub fn max_tokens_per_batch(mut self, tokens: usize) -> Self {
        self.max_tokens_per_batch = Some(tokens);
        self
    }

    /// Set the hard item cap.
    #[must_use]
    pub fn max_items_per_batch(mut self, items: usize) -> Self {
        self.max_items_per_batch = Some(items);
        self
    }

    /// Set the target utilization fraction.
    #[must_use]
    pub fn target_batch_utilization(mut self, utilization: f64) -> Self {
        self.target_batch_utilization = utilization;
        self
    }

    /// Enable adaptive batch sizing.
    #[must_use]
    pub fn adaptive_sizing(mut self, enabled: bool) -> Self {
        self.adaptive_sizing = enabled;
        self
    }

    /// Enable memory back-pressure at the given MiB threshold.
    #[must_use]
    pub fn max_memory_mb(mut self, limit: u64) -> Self {
        self.max_memory_mb = Some(limit);
        self
    }

    /// Set the per-batch attempt budget.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base back-off delay.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Pick up limits from a named model's preset.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Effective limits: explicit fields, then model preset, then defaults.
    #[must_use]
    pub fn resolved_limits(&self) -> ModelBatchLimits {
        let preset = self
            .model
            .as_deref()
            .and_then(resolve_model_limits)
            .unwrap_or(ModelBatchLimits::new(DEFAULT_MAX_TOKENS, DEFAULT_MAX_ITEMS));
        ModelBatchLimits {
            max_tokens: self.max_tokens_per_batch.unwrap_or(preset.max_tokens),
            max_items: self.max_items_per_batch.unwrap_or(preset.max_items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_without_model() {
        let limits = BatchConfig::new().resolved_limits();
        assert_eq!(limits.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(limits.max_items, DEFAULT_MAX_ITEMS);
    }

    #[test]
    fn test_model_preset_fills_unset_fields() {
        let limits = BatchConfig::new()
            .model("text-embedding-3-small")
            .resolved_limits();
        assert_eq!(limits.max_tokens, 8191);
        assert_eq!(limits.max_items, 2048);
    }

    #[test]
    fn test_explicit_fields_override_preset() {
        let limits = BatchConfig::new()
            .model("text-embedding-3-small")
            .max_items_per_batch(64)
            .resolved_limits();
        assert_eq!(limits.max_tokens, 8191, "token cap still from preset");
        assert_eq!(limits.max_items, 64, "item cap overridden");
    }

    #[test]
    fn test_unknown_model_falls_back_to_defaults() {
        let limits = BatchConfig::new().model("mystery-embedder").resolved_limits();
        assert_eq!(limits.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(limits.max_items, DEFAULT_MAX_ITEMS);
    }
}
