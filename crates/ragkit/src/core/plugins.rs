//! Plugin trait seams for interchangeable pipeline stages.
//!
//! Each stage category is an async trait; implementations report what they
//! are through [`PluginMetadata`] and which operations they actually carry
//! through `capabilities()`. The capability list is what contract validation
//! checks at registration time - the typed trait already guarantees the
//! method signatures, so the runtime check is pure membership.
//!
//! Optional operations (`Embedder::embed_query`, `Llm::stream`) default to
//! [`Error::Unsupported`]; implementations that provide them must also add
//! the method name to their capability list.

use crate::core::documents::{Document, GenerationChunk, ScoredDocument};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// The six interchangeable stage categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginCategory {
    /// Ingests raw sources into documents.
    Loader,
    /// Turns texts into vectors.
    Embedder,
    /// Stores vectors and answers nearest-neighbor queries.
    Retriever,
    /// Re-orders retrieved candidates against a query.
    Reranker,
    /// Generates text from a prompt plus context.
    Llm,
    /// Scores generated output against an expectation.
    Evaluator,
}

impl PluginCategory {
    /// All categories, in declaration order.
    pub const ALL: [PluginCategory; 6] = [
        PluginCategory::Loader,
        PluginCategory::Embedder,
        PluginCategory::Retriever,
        PluginCategory::Reranker,
        PluginCategory::Llm,
        PluginCategory::Evaluator,
    ];

    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginCategory::Loader => "loader",
            PluginCategory::Embedder => "embedder",
            PluginCategory::Retriever => "retriever",
            PluginCategory::Reranker => "reranker",
            PluginCategory::Llm => "llm",
            PluginCategory::Evaluator => "evaluator",
        }
    }

    /// Parse a category name, returning `None` for anything unknown.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == s)
    }
}

impl std::fmt::Display for PluginCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::InvalidArgument(format!("unknown plugin category: {s}")))
    }
}

/// Identity a plugin reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Plugin name, unique within its category.
    pub name: String,
    /// Plugin version (semver).
    pub version: String,
    /// The category this plugin belongs to.
    #[serde(rename = "type")]
    pub category: PluginCategory,
}

impl PluginMetadata {
    /// Create metadata for a plugin.
    pub fn new(name: impl Into<String>, version: impl Into<String>, category: PluginCategory) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            category,
        }
    }
}

/// Loads raw sources into documents.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Plugin identity.
    fn metadata(&self) -> PluginMetadata;

    /// Load `source` into zero or more documents.
    async fn load(&self, source: &str, options: Option<&serde_json::Value>) -> Result<Vec<Document>>;

    /// Operation names this plugin implements.
    fn capabilities(&self) -> Vec<&'static str> {
        vec!["load"]
    }
}

/// Embeds texts into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Plugin identity.
    fn metadata(&self) -> PluginMetadata;

    /// Embed a batch of texts, one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query. Optional; embedders that support queries must
    /// list `embed_query` in their capabilities.
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::Unsupported {
            plugin: self.metadata().name,
            method: "embed_query",
        })
    }

    /// Operation names this plugin implements.
    fn capabilities(&self) -> Vec<&'static str> {
        vec!["embed"]
    }
}

/// Stores vectors and retrieves nearest neighbors.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Plugin identity.
    fn metadata(&self) -> PluginMetadata;

    /// Store vectors with their originating documents.
    async fn store(&self, vectors: &[Vec<f32>], documents: &[Document]) -> Result<()>;

    /// Retrieve the `k` most relevant contexts for a query vector.
    async fn retrieve(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredDocument>>;

    /// Operation names this plugin implements.
    fn capabilities(&self) -> Vec<&'static str> {
        vec!["store", "retrieve"]
    }
}

/// Re-orders retrieved candidates against the query.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Plugin identity.
    fn metadata(&self) -> PluginMetadata;

    /// Rank `candidates` by relevance to `query`, best first.
    async fn rerank(&self, query: &str, candidates: Vec<ScoredDocument>) -> Result<Vec<ScoredDocument>>;

    /// Operation names this plugin implements.
    fn capabilities(&self) -> Vec<&'static str> {
        vec!["rerank"]
    }
}

/// Generates text from a prompt and retrieved context.
#[async_trait]
pub trait Llm: Send + Sync {
    /// Plugin identity.
    fn metadata(&self) -> PluginMetadata;

    /// Generate a completion for the prompt.
    async fn generate(&self, prompt: &str, context: &[Document]) -> Result<String>;

    /// Stream the completion token by token. Optional; streaming models must
    /// list `stream` in their capabilities.
    fn stream(
        &self,
        _prompt: &str,
        _context: &[Document],
    ) -> Result<BoxStream<'static, Result<GenerationChunk>>> {
        Err(Error::Unsupported {
            plugin: self.metadata().name,
            method: "stream",
        })
    }

    /// Operation names this plugin implements.
    fn capabilities(&self) -> Vec<&'static str> {
        vec!["generate"]
    }
}

/// Scores generated output against an expectation.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Plugin identity.
    fn metadata(&self) -> PluginMetadata;

    /// Score `actual` against `expected`, returning named metrics.
    async fn score(&self, expected: &str, actual: &str) -> Result<HashMap<String, f64>>;

    /// Operation names this plugin implements.
    fn capabilities(&self) -> Vec<&'static str> {
        vec!["score"]
    }
}

/// A registered plugin, tagged by category.
///
/// The handle is the unit the registry stores and hands back: cheap to clone,
/// category-safe to unwrap through the `as_*` accessors.
#[derive(Clone)]
pub enum PluginHandle {
    /// A document loader.
    Loader(Arc<dyn Loader>),
    /// A text embedder.
    Embedder(Arc<dyn Embedder>),
    /// A vector retriever.
    Retriever(Arc<dyn Retriever>),
    /// A candidate reranker.
    Reranker(Arc<dyn Reranker>),
    /// A language model.
    Llm(Arc<dyn Llm>),
    /// An output evaluator.
    Evaluator(Arc<dyn Evaluator>),
}

impl PluginHandle {
    /// The category this handle is tagged with.
    #[must_use]
    pub fn category(&self) -> PluginCategory {
        match self {
            PluginHandle::Loader(_) => PluginCategory::Loader,
            PluginHandle::Embedder(_) => PluginCategory::Embedder,
            PluginHandle::Retriever(_) => PluginCategory::Retriever,
            PluginHandle::Reranker(_) => PluginCategory::Reranker,
            PluginHandle::Llm(_) => PluginCategory::Llm,
            PluginHandle::Evaluator(_) => PluginCategory::Evaluator,
        }
    }

    /// The plugin's self-reported metadata.
    #[must_use]
    pub fn metadata(&self) -> PluginMetadata {
        match self {
            PluginHandle::Loader(p) => p.metadata(),
            PluginHandle::Embedder(p) => p.metadata(),
            PluginHandle::Retriever(p) => p.metadata(),
            PluginHandle::Reranker(p) => p.metadata(),
            PluginHandle::Llm(p) => p.metadata(),
            PluginHandle::Evaluator(p) => p.metadata(),
        }
    }

    /// The operation names the plugin implements.
    #[must_use]
    pub fn capabilities(&self) -> Vec<&'static str> {
        match self {
            PluginHandle::Loader(p) => p.capabilities(),
            PluginHandle::Embedder(p) => p.capabilities(),
            PluginHandle::Retriever(p) => p.capabilities(),
            PluginHandle::Reranker(p) => p.capabilities(),
            PluginHandle::Llm(p) => p.capabilities(),
            PluginHandle::Evaluator(p) => p.capabilities(),
        }
    }

    /// Unwrap as a loader.
    #[must_use]
    pub fn as_loader(&self) -> Option<&Arc<dyn Loader>> {
        match self {
            PluginHandle::Loader(p) => Some(p),
            _ => None,
        }
    }

    /// Unwrap as an embedder.
    #[must_use]
    pub fn as_embedder(&self) -> Option<&Arc<dyn Embedder>> {
        match self {
            PluginHandle::Embedder(p) => Some(p),
            _ => None,
        }
    }

    /// Unwrap as a retriever.
    #[must_use]
    pub fn as_retriever(&self) -> Option<&Arc<dyn Retriever>> {
        match self {
            PluginHandle::Retriever(p) => Some(p),
            _ => None,
        }
    }

    /// Unwrap as a reranker.
    #[must_use]
    pub fn as_reranker(&self) -> Option<&Arc<dyn Reranker>> {
        match self {
            PluginHandle::Reranker(p) => Some(p),
            _ => None,
        }
    }

    /// Unwrap as an LLM.
    #[must_use]
    pub fn as_llm(&self) -> Option<&Arc<dyn Llm>> {
        match self {
            PluginHandle::Llm(p) => Some(p),
            _ => None,
        }
    }

    /// Unwrap as an evaluator.
    #[must_use]
    pub fn as_evaluator(&self) -> Option<&Arc<dyn Evaluator>> {
        match self {
            PluginHandle::Evaluator(p) => Some(p),
            _ => None,
        }
    }
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let meta = self.metadata();
        f.debug_struct("PluginHandle")
            .field("category", &self.category())
            .field("name", &meta.name)
            .field("version", &meta.version)
            .finish()
    }
}
