//! The frozen [`Graph`] model (spec.md §3 "Graph[T]", §4.1).
//!
//! Produced only by [`crate::builder::GraphBuilder::build`]; every field is
//! read-only from the outside — there is no mutation API once a graph is
//! built. Type parameter `T` is the declared output type: the parsed result
//! of the output node's final value.

use crate::edge::Edge;
use crate::llm::LlmClient;
use crate::node::Node;
use crate::observability::Observer;
use crate::parse::OutputParser;
use crate::tool::Tool;
use graph_state::StateProvider;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// How a level's errors are handled once one node in it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStrategy {
    /// The first node failure cancels the rest of the level and aborts
    /// further levels; the error is returned to the caller.
    FailFast,
    /// Other nodes in the same level complete normally; downstream nodes
    /// depending on the failure are skipped. The call still succeeds iff
    /// the output node reaches `Completed`.
    ContinueOnError,
}

impl Default for ErrorStrategy {
    fn default() -> Self {
        ErrorStrategy::FailFast
    }
}

impl std::fmt::Display for ErrorStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorStrategy::FailFast => write!(f, "fail_fast"),
            ErrorStrategy::ContinueOnError => write!(f, "continue_on_error"),
        }
    }
}

/// Graph-wide execution configuration (spec.md §3 "config").
#[derive(Clone)]
pub struct GraphConfig {
    /// Semaphore capacity gating concurrent node launches; `0` means unbounded.
    pub max_concurrency: usize,
    /// Deadline for the whole execution, if any.
    pub execution_timeout: Option<Duration>,
    pub error_strategy: ErrorStrategy,
    /// Bounded channel capacity for the streaming executor's per-level fan-in.
    pub stream_buffer_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 0,
            execution_timeout: None,
            error_strategy: ErrorStrategy::FailFast,
            stream_buffer_size: 64,
        }
    }
}

/// Frozen graph structure: nodes, edges, computed levels, and config.
///
/// `Graph` is *not* safe for concurrent `execute`/`execute_stream` calls on
/// the same instance (spec.md §5) — build a fresh graph, or call
/// [`crate::executor`]'s `Graph::reset`, before re-executing.
pub struct Graph<T> {
    pub(crate) nodes: HashMap<String, Node>,
    pub(crate) edges: Vec<Edge>,
    /// Incoming edge indices per node id, precomputed for ready-set lookups.
    pub(crate) incoming: HashMap<String, Vec<usize>>,
    pub(crate) topological_order: Vec<String>,
    pub(crate) levels: Vec<Vec<String>>,
    pub(crate) output_node: String,
    pub(crate) default_client: Option<Arc<dyn LlmClient>>,
    pub(crate) default_tools: Vec<Arc<dyn Tool>>,
    pub(crate) config: GraphConfig,
    pub(crate) state: Arc<dyn StateProvider>,
    pub(crate) output_parser: Arc<dyn OutputParser<T> + Send + Sync>,
    pub(crate) observer: Arc<dyn Observer>,
    pub(crate) _output: PhantomData<fn() -> T>,
}

impl<T> Graph<T> {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Level partition in execution order: `levels()[0]` has no dependencies.
    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    pub fn topological_order(&self) -> &[String] {
        &self.topological_order
    }

    pub fn output_node(&self) -> &str {
        &self.output_node
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<dyn StateProvider> {
        &self.state
    }
}
