//! Error types for graph construction and execution.
//!
//! One [`GraphError`] enum covers every failure kind in this crate, matching
//! the teacher's convention of a single `thiserror`-derived enum with one
//! variant per failure class rather than ad-hoc `String` or `anyhow::Error`
//! values threaded through the public API.

use thiserror::Error;
use std::collections::BTreeSet;

/// Errors surfaced by graph construction and execution.
#[derive(Debug, Error)]
pub enum GraphError {
    /// One or more structural problems were found while building the graph
    /// (empty id, nil/duplicate node, bad edge, missing output node, ...).
    /// Multiple deferred build errors are joined into a single message.
    #[error("graph build failed: {0}")]
    Build(String),

    /// Kahn's algorithm terminated before emitting every node: the listed
    /// node ids still had positive in-degree, i.e. they participate in a cycle.
    #[error("cycle detected among nodes: [{}]", join(.0))]
    Cycle(BTreeSet<String>),

    /// The configured shared-state provider failed during initialization.
    #[error("state provider failed to initialize: {0}")]
    StateInit(#[source] graph_state::StateError),

    /// A dependency's result was missing or malformed when a node's input
    /// was assembled.
    #[error("node '{node}' input error: {reason}")]
    NodeInput { node: String, reason: String },

    /// A node's executor returned an error.
    #[error("node '{node}' execution failed: {source}")]
    NodeExecution {
        node: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A node did not finish before its per-node timeout elapsed.
    #[error("node '{node}' timed out after {elapsed_ms}ms")]
    NodeTimeout { node: String, elapsed_ms: u128 },

    /// The whole execution did not finish before the graph-level deadline.
    #[error("execution at level {level} exceeded the graph timeout")]
    GraphTimeout { level: usize },

    /// The caller's context/token was cancelled.
    #[error("execution cancelled at level {level}: {reason}")]
    Cancellation { level: usize, reason: String },

    /// The output node's raw result could not be parsed into the declared
    /// output type.
    #[error("failed to parse output node '{node}' result: {source}")]
    OutputParse {
        node: String,
        #[source]
        source: serde_json::Error,
    },
}

fn join(ids: &BTreeSet<String>) -> String {
    ids.iter().cloned().collect::<Vec<_>>().join(", ")
}

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, GraphError>;
