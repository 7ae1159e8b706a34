//! Node definitions and the executor contract nodes implement.
//!
//! A [`Node`] is frozen once [`crate::builder::GraphBuilder::build`] returns:
//! its id, executor, client override, tools, params, timeout and dependency
//! list never change at run time (spec.md §3 "Node").

use crate::llm::LlmClient;
use crate::tool::Tool;
use async_trait::async_trait;
use graph_state::{NodeResult, StateProvider};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// The bundle passed to a node's executor (spec.md §3 "NodeInput").
pub struct NodeInput {
    /// Results of every upstream dependency that has completed. A
    /// dependency that was skipped or failed is absent, not present with an
    /// error — executors that need to distinguish "skipped" from "never a
    /// dependency" should consult the edge condition that routed to them.
    pub upstream: HashMap<String, NodeResult>,
    /// The shared-state provider for this execution. Exposed directly
    /// (spec.md §4.4 step 3: "expose the state provider directly") rather
    /// than a read-only snapshot, so a node may itself read/write shared
    /// state mid-execution.
    pub state: Arc<dyn StateProvider>,
    /// This node's free-form parameter mapping, set at build time.
    pub params: HashMap<String, Value>,
    /// The node-local client override, or the graph default if none was set.
    pub client: Option<Arc<dyn LlmClient>>,
    /// Tools available to this node: the graph's default tools plus any
    /// node-local additions, merged at build time (SPEC_FULL.md, resolved
    /// open question (a) — `NodeInput` surfaces tools explicitly rather than
    /// requiring the executor to wrap the client itself).
    pub tools: Vec<Arc<dyn Tool>>,
    /// Execution-wide aggregate; clone the `Arc` to contribute usage, cost,
    /// or history from inside the executor, including from nested calls
    /// (spec.md §9 "Context-attached Overview", translated to Rust as an
    /// explicit handle rather than context-value lookup).
    pub overview: Arc<crate::overview::Overview>,
}

impl NodeInput {
    /// Convenience accessor: the node-local client if present, else `None`.
    /// Graph-level default resolution happens before this struct is built
    /// (see [`crate::executor`]), so by the time an executor sees this value
    /// it is already the "effective" client.
    pub fn client(&self) -> Option<&Arc<dyn LlmClient>> {
        self.client.as_ref()
    }
}

/// Non-streaming executor contract a node implements (spec.md §6).
///
/// The graph executor supplies the surrounding `node_start`/`node_complete`/
/// `node_error` events in streaming mode; an implementation of this trait
/// must never emit those itself.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, input: NodeInput) -> Result<Value, Box<dyn std::error::Error + Send + Sync>>;
}

/// A delta event a [`StreamingNodeExecutor`] may emit while it runs.
///
/// This is the *restricted* event set named in spec.md §6: content,
/// reasoning, and tool call/result deltas. The graph executor wraps these in
/// the full [`crate::stream::StreamEvent`] taxonomy (adding `level`,
/// `node_id`, and the start/complete/error bracketing events).
#[derive(Debug, Clone)]
pub enum NodeEvent {
    Content(String),
    Reasoning(String),
    ToolCall { tool_name: String, tool_input: Value },
    ToolResult { tool_name: String, tool_output: Value },
}

type NodeEventStream = Pin<Box<dyn futures::Stream<Item = NodeEvent> + Send>>;

/// Streaming executor contract. Implementations that support incremental
/// output (an LLM call streaming tokens, a tool reporting progress) should
/// implement this in addition to [`NodeExecutor`]; the streaming graph
/// executor (spec.md §4.5) prefers this path when available and falls back
/// to the non-streaming contract otherwise.
#[async_trait]
pub trait StreamingNodeExecutor: NodeExecutor {
    /// Begin a streaming execution: returns a stream of deltas. Once it is
    /// exhausted, the streaming executor (spec.md §4.5) derives the node's
    /// final output by concatenating every `NodeEvent::Content` delta — a
    /// streaming node's contribution to downstream `NodeInput.upstream` is
    /// its emitted text, not a separately reported value.
    async fn execute_stream(
        &self,
        input: NodeInput,
    ) -> Result<NodeEventStream, Box<dyn std::error::Error + Send + Sync>>;
}

/// A node's frozen specification, produced by [`crate::builder::GraphBuilder`].
pub struct Node {
    pub id: String,
    pub executor: Arc<dyn NodeExecutor>,
    pub streaming_executor: Option<Arc<dyn StreamingNodeExecutor>>,
    pub client: Option<Arc<dyn LlmClient>>,
    pub tools: Vec<Arc<dyn Tool>>,
    pub params: HashMap<String, Value>,
    pub timeout: Option<Duration>,
    /// Upstream dependency ids, computed from the edge list at build time.
    pub dependencies: Vec<String>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("timeout", &self.timeout)
            .field("streaming", &self.streaming_executor.is_some())
            .finish()
    }
}
