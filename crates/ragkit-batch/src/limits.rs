//! Model-specific batch limits.
//!
//! Known embedding and rerank models map to `{max_tokens, max_items}`
//! presets; unknown models fall through to the processor defaults, and any
//! explicit config field overrides the preset.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Per-batch limits for a named model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelBatchLimits {
    /// Maximum tokens per request batch.
    pub max_tokens: usize,
    /// Maximum items per request batch.
    pub max_items: usize,
}

impl ModelBatchLimits {
    /// Create a preset.
    #[must_use]
    pub const fn new(max_tokens: usize, max_items: usize) -> Self {
        Self {
            max_tokens,
            max_items,
        }
    }
}

fn model_limits() -> &'static HashMap<&'static str, ModelBatchLimits> {
    static LIMITS: OnceLock<HashMap<&'static str, ModelBatchLimits>> = OnceLock::new();
    LIMITS.get_or_init(|| {
        let mut m = HashMap::new();

        // OpenAI embeddings
        m.insert("text-embedding-3-small", ModelBatchLimits::new(8191, 2048));
        m.insert("text-embedding-3-large", ModelBatchLimits::new(8191, 2048));
        m.insert("text-embedding-ada-002", ModelBatchLimits::new(8191, 2048));

        // Voyage embeddings
        m.insert("voyage-3", ModelBatchLimits::new(32_000, 128));
        m.insert("voyage-3-lite", ModelBatchLimits::new(32_000, 128));

        // Cohere embeddings and rerankers
        m.insert("embed-english-v3.0", ModelBatchLimits::new(9216, 96));
        m.insert("embed-multilingual-v3.0", ModelBatchLimits::new(9216, 96));
        m.insert("rerank-english-v3.0", ModelBatchLimits::new(4096, 1000));

        // Common local embedding models
        m.insert("bge-m3", ModelBatchLimits::new(8192, 64));
        m.insert("nomic-embed-text", ModelBatchLimits::new(8192, 64));

        m
    })
}

/// Look up the preset for a model, with prefix fallback for versioned names
/// (`text-embedding-3-small-2024...` still resolves).
#[must_use]
pub fn resolve_model_limits(model: &str) -> Option<ModelBatchLimits> {
    let limits = model_limits();
    if let Some(found) = limits.get(model) {
        return Some(*found);
    }
    // Longest matching prefix wins so "voyage-3-lite-..." resolves to
    // voyage-3-lite rather than voyage-3.
    let model_lower = model.to_lowercase();
    limits
        .iter()
        .filter(|(name, _)| model_lower.starts_with(*name))
        .max_by_key(|(name, _)| name.len())
        .map(|(_, preset)| *preset)
}
