//! Error types for the RAGKIT execution core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core result type.
pub type Result<T> = std::result::Result<T, Error>;

/// A single node failure inside an aggregate error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeError {
    /// Id of the node that failed.
    pub node_id: String,
    /// Human-readable failure message.
    pub message: String,
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.node_id, self.message)
    }
}

/// Errors raised by the execution core.
///
/// Topology and execution failures carry their context as structured fields
/// (`Cycle { path }`, `Aggregate { errors }`) so callers can match on them
/// even after the engine wraps a terminal error in [`Error::ExecutionFailed`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A node id was registered twice.
    #[error("Node '{id}' is already registered")]
    DuplicateNode {
        /// The duplicated node id.
        id: String,
    },

    /// An edge referenced a node id that does not exist.
    #[error("Unknown node: {id}")]
    UnknownNode {
        /// The unknown node id.
        id: String,
    },

    /// An edge would connect a node to itself.
    #[error("Node '{id}' cannot depend on itself")]
    SelfLoop {
        /// The offending node id.
        id: String,
    },

    /// The graph contains no nodes at all.
    #[error("Pipeline graph is empty")]
    EmptyGraph,

    /// Every node has at least one input, so nothing can receive the seed.
    #[error("Pipeline graph has no source nodes")]
    NoSourceNodes,

    /// No node is terminal, so the pipeline produces no output.
    #[error("Pipeline graph has no sink nodes")]
    NoSinkNodes,

    /// A directed cycle was found. The path is rendered in forward traversal
    /// order and starts and ends on the same node (e.g. `a -> b -> c -> a`).
    #[error("Cycle detected: {}", .path.join(" -> "))]
    Cycle {
        /// The cycle as an ordered node-id list, first node repeated last.
        path: Vec<String>,
    },

    /// Strict topology validation found nodes with no edges at all.
    #[error("Orphaned nodes: {}", .nodes.join(", "))]
    OrphanedNodes {
        /// Ids of nodes connected to nothing.
        nodes: Vec<String>,
    },

    /// A node's run function failed (after any configured retries).
    #[error("Node '{id}' failed: {message}")]
    NodeFailure {
        /// Id of the failed node.
        id: String,
        /// The failure message.
        message: String,
    },

    /// Two or more node failures accrued before the engine stopped.
    #[error("{} node(s) failed", .errors.len())]
    Aggregate {
        /// Per-node failures, in completion order.
        errors: Vec<NodeError>,
    },

    /// The wall-clock execution timeout fired.
    #[error("Execution timed out after {elapsed_ms}ms")]
    ExecutionTimeout {
        /// Milliseconds elapsed when the timeout fired.
        elapsed_ms: u64,
    },

    /// Execution was cancelled through the cancellation signal.
    #[error("Execution cancelled")]
    Cancelled,

    /// No checkpoint exists under the requested id.
    #[error("Checkpoint not found: {id}")]
    CheckpointNotFound {
        /// The missing checkpoint id.
        id: String,
    },

    /// Terminal wrapper for errors escaping `execute`. The inner error keeps
    /// its variant so `Cycle`/`Aggregate` fields remain inspectable.
    #[error("DAG execution failed: {source}")]
    ExecutionFailed {
        /// The underlying error.
        source: Box<Error>,
    },

    /// A plugin was asked for an operation it does not implement.
    #[error("Plugin '{plugin}' does not support {method}")]
    Unsupported {
        /// Plugin name from its metadata.
        plugin: String,
        /// The unsupported method name.
        method: &'static str,
    },

    /// A caller-supplied argument was invalid.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A plugin operation failed.
    #[error("Plugin '{plugin}' error: {message}")]
    Plugin {
        /// Plugin name from its metadata.
        plugin: String,
        /// The failure message.
        message: String,
    },

    /// Value (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Wrap a terminal error for `execute`, without double-wrapping.
    #[must_use]
    pub fn into_execution_failed(self) -> Self {
        match self {
            wrapped @ Error::ExecutionFailed { .. } => wrapped,
            other => Error::ExecutionFailed {
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, unwrapping any `ExecutionFailed` layers.
    #[must_use]
    pub fn root(&self) -> &Error {
        match self {
            Error::ExecutionFailed { source } => source.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display_is_forward_path() {
        let err = Error::Cycle {
            path: vec!["a".into(), "b".into(), "c".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cycle detected: a -> b -> c -> a");
    }

    #[test]
    fn test_wrapping_preserves_inner_variant() {
        let inner = Error::Cycle {
            path: vec!["x".into(), "x".into()],
        };
        let wrapped = inner.into_execution_failed();
        assert!(wrapped.to_string().starts_with("DAG execution failed:"));
        match wrapped.root() {
            Error::Cycle { path } => assert_eq!(path.len(), 2),
            other => panic!("expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_wrapping_is_idempotent() {
        let err = Error::EmptyGraph.into_execution_failed().into_execution_failed();
        match err {
            Error::ExecutionFailed { source } => {
                assert!(matches!(*source, Error::EmptyGraph));
            }
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_aggregate_display_counts_failures() {
        let err = Error::Aggregate {
            errors: vec![
                NodeError {
                    node_id: "left".into(),
                    message: "boom".into(),
                },
                NodeError {
                    node_id: "right".into(),
                    message: "bang".into(),
                },
            ],
        };
        assert_eq!(err.to_string(), "2 node(s) failed");
    }
}
