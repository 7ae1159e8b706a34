//! Diamond topology example
//!
//! Builds a four-node diamond (`start` fans out to `left`/`right`, both
//! join at `combine`) and runs it to completion, printing the level
//! partition and the parsed output.

use async_trait::async_trait;
use graph_core::{GraphBuilder, NodeExecutor, NodeInput, NodeOptions};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct AddField {
    key: &'static str,
    value: i64,
}

#[async_trait]
impl NodeExecutor for AddField {
    async fn execute(&self, input: NodeInput) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let base: i64 = input
            .upstream
            .values()
            .filter_map(|r| r.output.get(self.key).and_then(Value::as_i64))
            .sum();
        Ok(json!({ self.key: base + self.value }))
    }
}

struct Combine;

#[async_trait]
impl NodeExecutor for Combine {
    async fn execute(&self, input: NodeInput) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let total: i64 = input.upstream.values().filter_map(|r| r.output.get("total").and_then(Value::as_i64)).sum();
        Ok(json!({ "total": total }))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Diamond Topology Example ===\n");

    let mut builder = GraphBuilder::<Value>::new();
    builder
        .add_node("start", Arc::new(AddField { key: "total", value: 1 }), NodeOptions::new())
        .add_node("left", Arc::new(AddField { key: "total", value: 10 }), NodeOptions::new())
        .add_node("right", Arc::new(AddField { key: "total", value: 100 }), NodeOptions::new())
        .add_node("combine", Arc::new(Combine), NodeOptions::new())
        .add_edge("start", "left", Default::default())
        .add_edge("start", "right", Default::default())
        .add_edge("left", "combine", Default::default())
        .add_edge("right", "combine", Default::default())
        .output_node("combine");

    let graph = Arc::new(builder.build()?);
    println!("levels: {:?}", graph.levels());

    let outcome = graph.execute(HashMap::new(), CancellationToken::new()).await?;
    println!("output: {}", outcome.output);
    println!("cost summary: {:?}", outcome.overview.cost_summary());

    Ok(())
}
