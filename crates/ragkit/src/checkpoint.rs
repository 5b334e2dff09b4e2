// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Checkpointing for pipeline execution state.
//!
//! Checkpointing enables:
//! - Resume execution after node failures
//! - Pause/resume workflows
//! - State snapshots for debugging
//!
//! A [`Checkpoint`] snapshots the `(results, errors)` maps of one execution
//! under a caller-chosen id. Storage goes through the [`CheckpointStore`]
//! trait; the default [`MemoryCheckpointStore`] keeps snapshots in process
//! memory. Writes are idempotent per id - saving again under the same id
//! replaces the previous snapshot.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A named snapshot of execution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Caller-chosen checkpoint id.
    pub id: String,

    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Node results captured so far, keyed by node id.
    pub results: HashMap<String, serde_json::Value>,

    /// Node failures captured so far, keyed by node id.
    pub errors: HashMap<String, String>,
}

impl Checkpoint {
    /// Snapshot the given result/error maps under `id`.
    pub fn new(
        id: impl Into<String>,
        results: HashMap<String, serde_json::Value>,
        errors: HashMap<String, String>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            results,
            errors,
        }
    }
}

/// Lightweight checkpoint info for listing without the full state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    /// The checkpoint id.
    pub id: String,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Number of node results in the snapshot.
    pub result_count: usize,
    /// Number of node errors in the snapshot.
    pub error_count: usize,
}

impl From<&Checkpoint> for CheckpointSummary {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            id: checkpoint.id.clone(),
            timestamp: checkpoint.timestamp,
            result_count: checkpoint.results.len(),
            error_count: checkpoint.errors.len(),
        }
    }
}

/// Storage strategy for checkpoints.
///
/// Implementations can keep snapshots in memory, on disk, or in a database;
/// the engine only needs these four operations. Saves under the same id must
/// be idempotent (last write wins).
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a checkpoint, replacing any existing snapshot with the same id.
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Load a checkpoint by id.
    async fn load(&self, id: &str) -> Result<Option<Checkpoint>>;

    /// List summaries of all stored checkpoints, newest first.
    async fn list(&self) -> Result<Vec<CheckpointSummary>>;

    /// Remove a checkpoint by id. Removing an unknown id is a no-op.
    async fn clear(&self, id: &str) -> Result<()>;
}

/// In-memory checkpoint storage.
///
/// Useful for testing and short-lived pipelines. Does not persist across
/// process restarts.
#[derive(Clone, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Arc<parking_lot::Mutex<HashMap<String, Checkpoint>>>,
}

impl MemoryCheckpointStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored checkpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checkpoints.lock().len()
    }

    /// True when no checkpoints are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkpoints.lock().is_empty()
    }

    /// Remove every stored checkpoint.
    pub fn clear_all(&self) {
        self.checkpoints.lock().clear();
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        self.checkpoints
            .lock()
            .insert(checkpoint.id.clone(), checkpoint);
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoints.lock().get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>> {
        let mut summaries: Vec<CheckpointSummary> = self
            .checkpoints
            .lock()
            .values()
            .map(CheckpointSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(summaries)
    }

    async fn clear(&self, id: &str) -> Result<()> {
        self.checkpoints.lock().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(id: &str) -> Checkpoint {
        let mut results = HashMap::new();
        results.insert("embed".to_string(), json!([0.1, 0.2]));
        Checkpoint::new(id, results, HashMap::new())
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let store = MemoryCheckpointStore::new();
        store.save(sample("run-1")).await.unwrap();

        let loaded = store.load("run-1").await.unwrap().unwrap();
        assert_eq!(loaded.id, "run-1");
        assert_eq!(loaded.results["embed"], json!([0.1, 0.2]));
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_is_idempotent_per_id() {
        let store = MemoryCheckpointStore::new();
        store.save(sample("run-1")).await.unwrap();

        let mut replacement = sample("run-1");
        replacement
            .results
            .insert("rerank".to_string(), json!("done"));
        store.save(replacement).await.unwrap();

        assert_eq!(store.len(), 1);
        let loaded = store.load("run-1").await.unwrap().unwrap();
        assert_eq!(loaded.results.len(), 2);
    }

    #[tokio::test]
    async fn test_list_reports_summaries() {
        let store = MemoryCheckpointStore::new();
        store.save(sample("a")).await.unwrap();
        store.save(sample("b")).await.unwrap();

        let summaries = store.list().await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.result_count == 1));
    }

    #[tokio::test]
    async fn test_clear_removes_single_checkpoint() {
        let store = MemoryCheckpointStore::new();
        store.save(sample("a")).await.unwrap();
        store.clear("a").await.unwrap();
        store.clear("never-existed").await.unwrap();
        assert!(store.is_empty());
    }
}
