// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Pipeline graph construction and validation.
//!
//! A [`Pipeline`] is a DAG of named nodes. Construction is incremental
//! (`add_node` + `connect`); validation and topological ordering live here,
//! execution in [`crate::executor`].
//!
//! # Example
//!
//! ```rust
//! use ragkit::{Pipeline, NodeInput, NodeContext};
//! use serde_json::json;
//!
//! # fn build() -> ragkit::Result<()> {
//! let mut pipeline = Pipeline::new();
//! pipeline.add_node("load", |input: NodeInput, _ctx: NodeContext| async move {
//!     Ok(input.into_value())
//! })?;
//! pipeline.add_node("embed", |input: NodeInput, _ctx: NodeContext| async move {
//!     Ok(input.into_value())
//! })?;
//! pipeline.connect("load", "embed")?;
//! pipeline.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::checkpoint::{Checkpoint, CheckpointStore, CheckpointSummary, MemoryCheckpointStore};
use crate::error::{Error, Result};
use crate::node::{NodeContext, NodeEntry, NodeFuture, NodeInput};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

// Three-color DFS marks.
const WHITE: u8 = 0;
const GRAY: u8 = 1;
const BLACK: u8 = 2;

/// Non-fatal topology findings reported by [`Pipeline::validate_topology`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyWarning {
    /// A node with no incoming and no outgoing edges.
    OrphanedNode {
        /// Id of the orphaned node.
        node: String,
    },
}

impl std::fmt::Display for TopologyWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyWarning::OrphanedNode { node } => {
                write!(f, "Node '{node}' has no edges and will only ever see the seed")
            }
        }
    }
}

/// A DAG of named computations with checkpoint-backed execution.
pub struct Pipeline {
    pub(crate) nodes: HashMap<String, NodeEntry>,
    /// Node ids in insertion order; ties between ready nodes are broken by
    /// this order so concurrent scheduling stays deterministic.
    pub(crate) order: Vec<String>,
    pub(crate) checkpoints: Arc<dyn CheckpointStore>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create an empty pipeline with in-memory checkpoint storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            checkpoints: Arc::new(MemoryCheckpointStore::new()),
        }
    }

    /// Replace the checkpoint store (any backend with the four store
    /// operations is substitutable).
    #[must_use]
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = store;
        self
    }

    /// Add a node. Fails with [`Error::DuplicateNode`] if the id is taken.
    pub fn add_node<F, Fut>(&mut self, id: impl Into<String>, run: F) -> Result<&mut Self>
    where
        F: Fn(NodeInput, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidArgument("node id must not be empty".into()));
        }
        if self.nodes.contains_key(&id) {
            return Err(Error::DuplicateNode { id });
        }
        let run: crate::node::NodeRun =
            Arc::new(move |input, ctx| Box::pin(run(input, ctx)) as NodeFuture);
        self.nodes.insert(id.clone(), NodeEntry::new(id.clone(), run));
        self.order.push(id);
        Ok(self)
    }

    /// Connect `from` to `to`, making `to` depend on `from`.
    ///
    /// Fails with [`Error::UnknownNode`] when either end is missing and
    /// [`Error::SelfLoop`] when both ends name the same node. Connecting the
    /// same pair twice is a no-op.
    pub fn connect(&mut self, from: &str, to: &str) -> Result<()> {
        if from == to {
            return Err(Error::SelfLoop { id: from.to_string() });
        }
        if !self.nodes.contains_key(from) {
            return Err(Error::UnknownNode { id: from.to_string() });
        }
        if !self.nodes.contains_key(to) {
            return Err(Error::UnknownNode { id: to.to_string() });
        }
        if let Some(entry) = self.nodes.get_mut(from) {
            if !entry.outputs.iter().any(|o| o == to) {
                entry.outputs.push(to.to_string());
            }
        }
        if let Some(entry) = self.nodes.get_mut(to) {
            if !entry.inputs.iter().any(|i| i == from) {
                entry.inputs.push(from.to_string());
            }
        }
        Ok(())
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of source nodes (no inputs), in insertion order.
    #[must_use]
    pub fn source_ids(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|id| self.nodes[*id].inputs.is_empty())
            .map(String::as_str)
            .collect()
    }

    /// Ids of sink nodes (no outputs), in insertion order.
    #[must_use]
    pub fn sink_ids(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|id| self.nodes[*id].outputs.is_empty())
            .map(String::as_str)
            .collect()
    }

    /// Validate the graph: non-empty, has at least one source, acyclic.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::EmptyGraph);
        }
        if self.source_ids().is_empty() {
            return Err(Error::NoSourceNodes);
        }
        self.topo_sort().map(|_| ())
    }

    /// Report non-fatal topology findings. With `strict`, warnings become a
    /// hard [`Error::OrphanedNodes`] failure.
    pub fn validate_topology(&self, strict: bool) -> Result<Vec<TopologyWarning>> {
        let mut warnings = Vec::new();
        if self.nodes.len() > 1 {
            for id in &self.order {
                let entry = &self.nodes[id];
                if entry.inputs.is_empty() && entry.outputs.is_empty() {
                    warnings.push(TopologyWarning::OrphanedNode { node: id.clone() });
                }
            }
        }
        if strict && !warnings.is_empty() {
            let nodes = warnings
                .iter()
                .map(|w| match w {
                    TopologyWarning::OrphanedNode { node } => node.clone(),
                })
                .collect();
            return Err(Error::OrphanedNodes { nodes });
        }
        Ok(warnings)
    }

    /// Topologically order the node ids.
    ///
    /// Three-color DFS over nodes in insertion order; the reverse postorder
    /// places every node after all of its inputs. A back-edge fails with
    /// [`Error::Cycle`] whose path reads in forward traversal order, first
    /// node repeated last (`["a", "b", "c", "a"]` for a -> b -> c -> a).
    pub fn topo_sort(&self) -> Result<Vec<String>> {
        let mut color: HashMap<&str, u8> =
            self.order.iter().map(|id| (id.as_str(), WHITE)).collect();
        let mut postorder: Vec<String> = Vec::with_capacity(self.nodes.len());

        for root in &self.order {
            if color.get(root.as_str()).copied() != Some(WHITE) {
                continue;
            }
            // Explicit stack of (node id, next out-edge index) so deep graphs
            // cannot overflow the call stack.
            let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
            color.insert(root.as_str(), GRAY);

            while let Some((id, edge_idx)) = stack.last().copied() {
                let outputs = &self.nodes[id].outputs;
                if edge_idx < outputs.len() {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    let next = outputs[edge_idx].as_str();
                    match color.get(next).copied() {
                        Some(WHITE) => {
                            color.insert(next, GRAY);
                            stack.push((next, 0));
                        }
                        Some(GRAY) => {
                            // Back edge: the cycle is the stack from the
                            // revisited node onward, closed on itself.
                            let start = stack
                                .iter()
                                .position(|(n, _)| *n == next)
                                .unwrap_or(0);
                            let mut path: Vec<String> = stack[start..]
                                .iter()
                                .map(|(n, _)| (*n).to_string())
                                .collect();
                            path.push(next.to_string());
                            return Err(Error::Cycle { path });
                        }
                        _ => {}
                    }
                } else {
                    color.insert(id, BLACK);
                    postorder.push(id.to_string());
                    stack.pop();
                }
            }
        }

        postorder.reverse();
        Ok(postorder)
    }

    /// Save a checkpoint through the configured store.
    pub async fn save_checkpoint(
        &self,
        id: &str,
        results: HashMap<String, Value>,
        errors: HashMap<String, String>,
    ) -> Result<()> {
        self.checkpoints
            .save(Checkpoint::new(id, results, errors))
            .await
    }

    /// Load a checkpoint by id, if it exists.
    pub async fn load_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>> {
        self.checkpoints.load(id).await
    }

    /// Remove a checkpoint by id.
    pub async fn clear_checkpoint(&self, id: &str) -> Result<()> {
        self.checkpoints.clear(id).await
    }

    /// List summaries of stored checkpoints.
    pub async fn list_checkpoints(&self) -> Result<Vec<CheckpointSummary>> {
        self.checkpoints.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn passthrough(mut pipeline: Pipeline, ids: &[&str]) -> Pipeline {
        for id in ids {
            pipeline
                .add_node(*id, |input: NodeInput, _ctx| async move {
                    Ok(input.into_value())
                })
                .unwrap();
        }
        pipeline
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut pipeline = Pipeline::new();
        pipeline
            .add_node("a", |_, _| async { Ok(json!(null)) })
            .unwrap();
        let err = pipeline
            .add_node("a", |_, _| async { Ok(json!(null)) })
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateNode { id } if id == "a"));
    }

    #[test]
    fn test_connect_unknown_and_self_loop() {
        let mut pipeline = passthrough(Pipeline::new(), &["a"]);
        assert!(matches!(
            pipeline.connect("a", "ghost"),
            Err(Error::UnknownNode { id }) if id == "ghost"
        ));
        assert!(matches!(
            pipeline.connect("a", "a"),
            Err(Error::SelfLoop { id }) if id == "a"
        ));
    }

    #[test]
    fn test_validate_empty_graph() {
        let pipeline = Pipeline::new();
        assert!(matches!(pipeline.validate(), Err(Error::EmptyGraph)));
    }

    #[test]
    fn test_validate_no_source_nodes() {
        // A triangle gives every node an input, so nothing can take the seed.
        let mut pipeline = passthrough(Pipeline::new(), &["a", "b", "c"]);
        pipeline.connect("a", "b").unwrap();
        pipeline.connect("b", "c").unwrap();
        pipeline.connect("c", "a").unwrap();
        assert!(matches!(pipeline.validate(), Err(Error::NoSourceNodes)));
    }

    #[test]
    fn test_topo_sort_linear_chain() {
        let mut pipeline = passthrough(Pipeline::new(), &["c", "a", "b"]);
        pipeline.connect("a", "b").unwrap();
        pipeline.connect("b", "c").unwrap();
        assert_eq!(pipeline.topo_sort().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_topo_sort_cycle_path_is_forward() {
        let mut pipeline = passthrough(Pipeline::new(), &["a", "b", "c"]);
        pipeline.connect("a", "b").unwrap();
        pipeline.connect("b", "c").unwrap();
        pipeline.connect("c", "a").unwrap();

        let err = pipeline.topo_sort().unwrap_err();
        match err {
            Error::Cycle { path } => assert_eq!(path, vec!["a", "b", "c", "a"]),
            other => panic!("expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_topo_sort_diamond_respects_dependencies() {
        let mut pipeline = passthrough(Pipeline::new(), &["src", "left", "right", "sink"]);
        pipeline.connect("src", "left").unwrap();
        pipeline.connect("src", "right").unwrap();
        pipeline.connect("left", "sink").unwrap();
        pipeline.connect("right", "sink").unwrap();

        let sorted = pipeline.topo_sort().unwrap();
        let pos = |id: &str| sorted.iter().position(|n| n == id).unwrap();
        assert!(pos("src") < pos("left"));
        assert!(pos("src") < pos("right"));
        assert!(pos("left") < pos("sink"));
        assert!(pos("right") < pos("sink"));
    }

    #[test]
    fn test_validate_topology_flags_orphans() {
        let mut pipeline = passthrough(Pipeline::new(), &["a", "b", "orphan"]);
        pipeline.connect("a", "b").unwrap();

        let warnings = pipeline.validate_topology(false).unwrap();
        assert_eq!(
            warnings,
            vec![TopologyWarning::OrphanedNode {
                node: "orphan".to_string()
            }]
        );

        let err = pipeline.validate_topology(true).unwrap_err();
        assert!(matches!(err, Error::OrphanedNodes { nodes } if nodes == vec!["orphan"]));
    }

    #[test]
    fn test_single_node_is_not_an_orphan() {
        let pipeline = passthrough(Pipeline::new(), &["only"]);
        assert!(pipeline.validate_topology(true).unwrap().is_empty());
    }
}
