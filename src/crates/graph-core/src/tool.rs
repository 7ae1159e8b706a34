//! Tool contract consumed by node executors (spec.md §6).
//!
//! The graph executor never invokes a tool directly — node executors do —
//! but tools flow through [`crate::node::NodeInput`] (graph defaults merged
//! with node-local additions at build time) and a tool's optional
//! [`ToolMetrics`] is how a node reports monetary cost back into the
//! execution's [`crate::overview::Overview`] via `add_tool_execution_cost`.

use crate::overview::ToolMetrics;
use async_trait::async_trait;
use serde_json::Value;

/// A callable tool: name, description, a JSON-schema-shaped parameter
/// descriptor, and an optional cost-per-call metric.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON-schema-shaped descriptor of this tool's input. Schema
    /// *generation* (deriving this from a Rust type) is out of scope
    /// (spec.md §1) — implementations supply the schema value directly.
    fn parameters_schema(&self) -> &Value;

    /// Cost metrics reported on every call, if this tool has a known cost.
    fn metrics(&self) -> Option<ToolMetrics> {
        None
    }

    /// Invoke the tool. Input and output are JSON-encoded strings, matching
    /// the wire shape an LLM tool-call round trip actually uses.
    async fn call(&self, input: String) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}
