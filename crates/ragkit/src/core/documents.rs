//! Document value types flowing between pipeline stages.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A unit of ingested content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The document text.
    pub page_content: String,

    /// Arbitrary source metadata (path, page number, mime type, ...).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Document {
    /// Create a document from its text content.
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A document paired with a relevance score, as produced by retrievers and
/// rerankers. Higher scores rank first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    /// The underlying document.
    pub document: Document,
    /// Relevance score.
    pub score: f64,
}

/// One token of a streamed LLM generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationChunk {
    /// The emitted token text.
    pub token: String,
    /// True on the final chunk of the stream.
    pub done: bool,
}
