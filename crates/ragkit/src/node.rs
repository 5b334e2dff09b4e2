// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Node types for the pipeline DAG.

use crate::error::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Input handed to a node's run function.
///
/// Source nodes (no inputs) receive the execution seed; every other node
/// receives the results of its direct dependencies keyed by node id.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeInput {
    /// The execution seed, bound to source nodes.
    Seed(Value),
    /// Results of this node's dependencies, keyed by dependency id.
    Dependencies(HashMap<String, Value>),
}

impl NodeInput {
    /// Flatten into a single JSON value: the seed itself, or an object of
    /// dependency results.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            NodeInput::Seed(value) => value,
            NodeInput::Dependencies(map) => Value::Object(map.into_iter().collect()),
        }
    }

    /// The result of a single named dependency, if present.
    #[must_use]
    pub fn dependency(&self, id: &str) -> Option<&Value> {
        match self {
            NodeInput::Seed(_) => None,
            NodeInput::Dependencies(map) => map.get(id),
        }
    }
}

/// Cooperative cancellation signal shared between the engine and node tasks.
///
/// The engine sets the flag on timeout or explicit cancellation; long-running
/// run functions should poll [`CancelToken::is_cancelled`] and return early.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-invocation context passed to a node's run function.
#[derive(Debug, Clone)]
pub struct NodeContext {
    /// Cancellation signal for this execution.
    pub cancel: CancelToken,
    /// Zero-based attempt number (0 on the first try, 1 on the first retry).
    pub attempt: u32,
}

impl NodeContext {
    /// Shorthand for `self.cancel.is_cancelled()`.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Boxed future returned by node run functions.
pub type NodeFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Type-erased node run function.
pub type NodeRun = Arc<dyn Fn(NodeInput, NodeContext) -> NodeFuture + Send + Sync>;

/// Lifecycle state of a node within one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Not yet eligible to run.
    Pending,
    /// All dependencies satisfied, waiting for a slot.
    Ready,
    /// Run function in flight.
    Running,
    /// Completed with a result.
    Succeeded,
    /// Completed with an error (retries exhausted).
    Failed,
    /// Not run because a dependency failed or was skipped.
    Skipped,
}

/// A node in the pipeline graph: an id, a run function, and its edges.
pub(crate) struct NodeEntry {
    pub(crate) id: String,
    pub(crate) run: NodeRun,
    /// Ids of nodes this node depends on.
    pub(crate) inputs: Vec<String>,
    /// Ids of nodes depending on this node.
    pub(crate) outputs: Vec<String>,
}

impl NodeEntry {
    pub(crate) fn new(id: String, run: NodeRun) -> Self {
        Self {
            id,
            run,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}
