use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use graph_core::{Graph, GraphBuilder, NodeExecutor, NodeInput, NodeOptions};
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

fn build_diamond() -> Graph<Value> {
    let mut builder = GraphBuilder::<Value>::new();
    builder
        .add_node("start", Arc::new(AddField { key: "total", value: 1 }), NodeOptions::new())
        .add_node("left", Arc::new(AddField { key: "total", value: 10 }), NodeOptions::new())
        .add_node("right", Arc::new(AddField { key: "total", value: 100 }), NodeOptions::new())
        .add_node("combine", Arc::new(AddField { key: "total", value: 0 }), NodeOptions::new())
        .add_edge("start", "left", Default::default())
        .add_edge("start", "right", Default::default())
        .add_edge("left", "combine", Default::default())
        .add_edge("right", "combine", Default::default())
        .output_node("combine");
    builder.build().unwrap()
}

fn graph_build_benchmark(c: &mut Criterion) {
    c.bench_function("build diamond graph", |b| {
        b.iter(|| black_box(build_diamond()));
    });
}

fn graph_execute_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("execute diamond graph", |b| {
        b.to_async(&runtime).iter(|| async {
            let graph = Arc::new(build_diamond());
            let outcome = graph.execute(black_box(HashMap::new()), CancellationToken::new()).await.unwrap();
            black_box(outcome);
        });
    });
}

criterion_group!(benches, graph_build_benchmark, graph_execute_benchmark);
criterion_main!(benches);
