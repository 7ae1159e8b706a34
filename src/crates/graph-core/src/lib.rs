//! A DAG-shaped orchestration runtime for LLM-driven workflows.
//!
//! Nodes are assembled into levels by [`builder::GraphBuilder`] (Kahn's
//! algorithm over the declared edges), then run level-by-level either to a
//! single resolved value ([`executor`]) or as an ordered event stream with
//! backpressure ([`stream`]). Shared state and per-node status/result
//! tracking live in the sibling `graph-state` crate behind the
//! [`graph_state::StateProvider`] trait; cost and token-usage accounting
//! live in [`overview`]; structured logging hooks live in [`observability`].
//!
//! Cycles, dynamic node creation at run time, nested sub-graphs, automatic
//! retry, and durable recovery across process restarts are explicitly out
//! of scope — a `Graph` is a frozen, acyclic, single-shot execution plan.

pub mod builder;
pub mod edge;
pub mod error;
pub mod executor;
pub mod graph;
pub mod llm;
pub mod node;
pub mod observability;
pub mod overview;
pub mod parse;
pub mod stream;
pub mod tool;

pub use builder::{EdgeOptions, GraphBuilder, NodeOptions};
pub use edge::{Condition, ConditionContext, Edge};
pub use error::{GraphError, Result};
pub use executor::ExecutionOutcome;
pub use graph::{ErrorStrategy, Graph, GraphConfig};
pub use llm::{LlmClient, LlmResponse};
pub use node::{Node, NodeEvent, NodeExecutor, NodeInput, StreamingNodeExecutor};
pub use observability::{NoopObserver, Observer, TracingObserver};
pub use overview::{ComputePricing, ContextTier, CostSummary, MediaUsage, ModelPricing, Overview, ToolMetrics, TokenUsage};
pub use parse::{JsonOutputParser, OutputParser};
pub use stream::{EventStream, StreamEvent};
pub use tool::Tool;

pub use graph_state::{InMemoryStateProvider, NodeResult, NodeStatus, StateProvider};
