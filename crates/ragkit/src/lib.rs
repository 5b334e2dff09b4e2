// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # RAGKIT execution core
//!
//! The execution substrate of a composable RAG pipeline toolkit: a DAG of
//! named nodes executed in dependency order with retries, graceful
//! degradation, concurrency limits, wall-clock timeouts, and checkpoint-based
//! resumption - plus the plugin trait seams every pipeline stage implements.
//!
//! Stage implementations (PDF loaders, vector stores, model clients) live
//! outside this crate and reach the engine through the traits in
//! [`core`]; registration and contract validation live in `ragkit-registry`.
//!
//! # Example
//!
//! ```rust
//! use ragkit::{Pipeline, NodeInput, NodeContext};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ragkit::Result<()> {
//! let mut pipeline = Pipeline::new();
//! pipeline.add_node("inc", |input: NodeInput, _ctx: NodeContext| async move {
//!     Ok(json!(input.into_value().as_i64().unwrap_or(0) + 1))
//! })?;
//! pipeline.add_node("double", |input: NodeInput, _ctx: NodeContext| async move {
//!     let x = input.dependency("inc").and_then(|v| v.as_i64()).unwrap_or(0);
//!     Ok(json!(x * 2))
//! })?;
//! pipeline.connect("inc", "double")?;
//!
//! let result = pipeline.run(json!(3)).await?;
//! assert_eq!(result, json!(8));
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod core;
pub mod error;
pub mod executor;
pub mod graph;
pub mod node;

pub use checkpoint::{Checkpoint, CheckpointStore, CheckpointSummary, MemoryCheckpointStore};
pub use error::{Error, NodeError, Result};
pub use executor::ExecuteOptions;
pub use graph::{Pipeline, TopologyWarning};
pub use node::{CancelToken, NodeContext, NodeInput, NodeState};
