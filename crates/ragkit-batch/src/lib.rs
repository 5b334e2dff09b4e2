//! # RAGKIT Batch Processing
//!
//! Adaptive batching for pipeline stages that fan out over many records
//! (embedding, reranking). Items are packed into batches bounded by a token
//! budget and an item cap, driven through a user-supplied process function
//! with retry, cancellation, and memory back-pressure, while preserving
//! end-to-end input order.
//!
//! ## Example
//!
//! ```rust
//! use ragkit_batch::{BatchConfig, BatchProcessor, ProcessOptions};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ragkit_batch::Result<()> {
//! let processor = BatchProcessor::new(
//!     BatchConfig::new()
//!         .max_tokens_per_batch(1000)
//!         .max_items_per_batch(100),
//! );
//!
//! let items: Vec<String> = (0..250).map(|i| format!("doc {i}")).collect();
//! let results = processor
//!     .process_batches(
//!         items,
//!         |batch: Vec<String>| async move {
//!             Ok(batch.iter().map(|s| s.len()).collect())
//!         },
//!         ProcessOptions::new(),
//!     )
//!     .await?;
//! assert_eq!(results.len(), 250);
//! # Ok(())
//! # }
//! ```

mod adaptive;
pub mod config;
pub mod error;
pub mod events;
pub mod limits;
mod memory;
pub mod metrics;
pub mod processor;
pub mod tokens;

pub use config::BatchConfig;
pub use error::{BatchError, Result};
pub use events::{BatchEvent, BatchObserver, ChannelObserver, CollectingObserver};
pub use limits::{resolve_model_limits, ModelBatchLimits};
pub use metrics::{BatchMetrics, BatchStatus, EfficiencyReport};
pub use processor::{BatchProcessor, BoxError, ProcessOptions};
pub use tokens::{BatchItem, CharEstimator, TiktokenEstimator, TokenEstimator};
