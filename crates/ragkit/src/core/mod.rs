//! Core value types and plugin trait seams.
//!
//! Every interchangeable pipeline stage (loader, embedder, retriever,
//! reranker, LLM, evaluator) is a trait here; the registry crate stores and
//! validates implementations behind [`plugins::PluginHandle`].

pub mod documents;
pub mod plugins;

pub use documents::{Document, GenerationChunk, ScoredDocument};
pub use plugins::{
    Embedder, Evaluator, Llm, Loader, PluginCategory, PluginHandle, PluginMetadata, Reranker,
    Retriever,
};
