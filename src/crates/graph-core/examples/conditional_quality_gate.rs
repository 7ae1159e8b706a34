//! Conditional quality gate example
//!
//! `draft` produces a score; `publish` only runs if the score clears a
//! threshold, otherwise it is skipped and `fallback` becomes the effective
//! path (left unconnected here for brevity — this example just demonstrates
//! the edge condition declining to route).

use async_trait::async_trait;
use graph_core::{EdgeOptions, GraphBuilder, NodeExecutor, NodeInput, NodeOptions};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct Draft {
    quality: f64,
}

#[async_trait]
impl NodeExecutor for Draft {
    async fn execute(&self, _input: NodeInput) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        Ok(json!({ "quality": self.quality }))
    }
}

struct Publish;

#[async_trait]
impl NodeExecutor for Publish {
    async fn execute(&self, input: NodeInput) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let quality = input.upstream["draft"].output["quality"].as_f64().unwrap_or(0.0);
        Ok(json!({ "published": true, "quality": quality }))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Conditional Quality Gate Example ===\n");

    const THRESHOLD: f64 = 0.8;
    let condition: graph_core::Condition = Arc::new(move |_ctx, source_result, _state| {
        source_result.output.get("quality").and_then(Value::as_f64).unwrap_or(0.0) >= THRESHOLD
    });

    let mut builder = GraphBuilder::<Value>::new();
    builder
        .add_node("draft", Arc::new(Draft { quality: 0.92 }), NodeOptions::new())
        .add_node("publish", Arc::new(Publish), NodeOptions::new())
        .add_edge("draft", "publish", EdgeOptions::new().when(condition))
        .output_node("publish");

    let graph = Arc::new(builder.build()?);
    let outcome = graph.execute(HashMap::new(), CancellationToken::new()).await?;
    println!("quality 0.92 (passes gate): {}", outcome.output);

    let mut low_quality = GraphBuilder::<Value>::new();
    let condition: graph_core::Condition = Arc::new(move |_ctx, source_result, _state| {
        source_result.output.get("quality").and_then(Value::as_f64).unwrap_or(0.0) >= THRESHOLD
    });
    low_quality
        .add_node("draft", Arc::new(Draft { quality: 0.4 }), NodeOptions::new())
        .add_node("publish", Arc::new(Publish), NodeOptions::new())
        .add_edge("draft", "publish", EdgeOptions::new().when(condition))
        .output_node("publish");
    let graph = Arc::new(low_quality.build()?);
    match graph.execute(HashMap::new(), CancellationToken::new()).await {
        Ok(outcome) => println!("quality 0.4 unexpectedly published: {}", outcome.output),
        Err(err) => println!("quality 0.4 (fails gate), publish skipped: {err}"),
    }

    Ok(())
}
