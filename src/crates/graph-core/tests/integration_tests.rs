use async_trait::async_trait;
use futures::{Stream, StreamExt};
use graph_core::{
    ErrorStrategy, Graph, GraphBuilder, GraphConfig, GraphError, NodeEvent, NodeExecutor, NodeInput, NodeOptions,
    NodeStatus, StreamEvent, StreamingNodeExecutor,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

struct Echo(Value);

#[async_trait]
impl NodeExecutor for Echo {
    async fn execute(&self, _input: NodeInput) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.0.clone())
    }
}

struct Delay(Duration);

#[async_trait]
impl NodeExecutor for Delay {
    async fn execute(&self, _input: NodeInput) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        tokio::time::sleep(self.0).await;
        Ok(Value::Null)
    }
}

struct AlwaysFails;

#[async_trait]
impl NodeExecutor for AlwaysFails {
    async fn execute(&self, _input: NodeInput) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        Err("boom".into())
    }
}

// Scenario 1: single-node string output.
#[tokio::test]
async fn single_node_string_output() {
    let mut builder = GraphBuilder::<String>::new();
    builder
        .add_node("output", Arc::new(Echo(Value::String("hello world".to_string()))), NodeOptions::new())
        .output_node("output");
    let graph = Arc::new(builder.build().unwrap());

    let outcome = graph.execute(HashMap::new(), CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.output, "hello world");

    let graph = Arc::new({
        let mut builder = GraphBuilder::<String>::new();
        builder
            .add_node("output", Arc::new(Echo(Value::String("hello world".to_string()))), NodeOptions::new())
            .output_node("output");
        builder.build().unwrap()
    });
    let mut stream = graph.execute_stream(HashMap::new(), CancellationToken::new());
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    assert!(matches!(events[0], StreamEvent::LevelStart { level: 0, .. }));
    assert!(matches!(events[1], StreamEvent::NodeStart { level: 0, .. }));
    assert!(matches!(events[2], StreamEvent::NodeComplete { level: 0, .. }));
    assert!(matches!(events[3], StreamEvent::LevelComplete { level: 0 }));
    assert!(matches!(events[4], StreamEvent::Done));
    assert_eq!(events.len(), 5);
}

// Scenario 2: diamond topology levels.
#[tokio::test]
async fn diamond_topology_levels() {
    let mut builder = GraphBuilder::<Value>::new();
    builder
        .add_node("root", Arc::new(Echo(json!(null))), NodeOptions::new())
        .add_node("left", Arc::new(Echo(json!(null))), NodeOptions::new())
        .add_node("right", Arc::new(Echo(json!(null))), NodeOptions::new())
        .add_node("merge", Arc::new(Echo(json!(null))), NodeOptions::new())
        .add_edge("root", "left", Default::default())
        .add_edge("root", "right", Default::default())
        .add_edge("left", "merge", Default::default())
        .add_edge("right", "merge", Default::default())
        .output_node("merge");
    let graph = builder.build().unwrap();

    assert_eq!(graph.levels().len(), 3);
    assert_eq!(graph.levels()[0], vec!["root".to_string()]);
    let mut level1 = graph.levels()[1].clone();
    level1.sort();
    assert_eq!(level1, vec!["left".to_string(), "right".to_string()]);
    assert_eq!(graph.levels()[2], vec!["merge".to_string()]);
}

// Scenario 3: cycle detection.
#[tokio::test]
async fn cycle_detection_lists_every_cyclic_node() {
    let mut builder = GraphBuilder::<Value>::new();
    builder
        .add_node("a", Arc::new(Echo(json!(null))), NodeOptions::new())
        .add_node("b", Arc::new(Echo(json!(null))), NodeOptions::new())
        .add_node("c", Arc::new(Echo(json!(null))), NodeOptions::new())
        .add_edge("a", "b", Default::default())
        .add_edge("b", "c", Default::default())
        .add_edge("c", "a", Default::default())
        .output_node("a");

    match builder.build() {
        Err(GraphError::Cycle(ids)) => {
            assert!(ids.contains("a"));
            assert!(ids.contains("b"));
            assert!(ids.contains("c"));
        }
        other => panic!("expected a cycle error, got {other:?}"),
    }
}

// Scenario 4: fail-fast cancels siblings quickly rather than waiting out a slow sibling.
#[tokio::test]
async fn fail_fast_returns_before_slow_sibling_finishes() {
    let mut builder = GraphBuilder::<Value>::new();
    builder
        .add_node("root", Arc::new(Echo(json!(null))), NodeOptions::new())
        .add_node("slow", Arc::new(Delay(Duration::from_millis(500))), NodeOptions::new())
        .add_node("failing", Arc::new(AlwaysFails), NodeOptions::new())
        .add_edge("root", "slow", Default::default())
        .add_edge("root", "failing", Default::default())
        .output_node("slow")
        .config(GraphConfig { max_concurrency: 2, error_strategy: ErrorStrategy::FailFast, ..Default::default() });
    let graph = Arc::new(builder.build().unwrap());

    let started = Instant::now();
    let err = graph.execute(HashMap::new(), CancellationToken::new()).await.unwrap_err();
    assert!(started.elapsed() < Duration::from_millis(400), "fail-fast should not wait out the slow sibling");
    assert!(matches!(err, GraphError::NodeExecution { ref node, .. } if node == "failing"));
}

// Scenario 4b: the same fail-fast failure surfaced through the streaming
// executor emits a real NodeError (not a fabricated one) and never emits a
// Done event.
#[tokio::test]
async fn streaming_fail_fast_emits_a_node_error_and_no_done_event() {
    let mut builder = GraphBuilder::<Value>::new();
    builder
        .add_node("root", Arc::new(Echo(json!(null))), NodeOptions::new())
        .add_node("failing", Arc::new(AlwaysFails), NodeOptions::new())
        .add_edge("root", "failing", Default::default())
        .output_node("failing")
        .config(GraphConfig { error_strategy: ErrorStrategy::FailFast, ..Default::default() });
    let graph = Arc::new(builder.build().unwrap());

    let mut stream = graph.execute_stream(HashMap::new(), CancellationToken::new());
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }

    assert!(events
        .iter()
        .any(|e| matches!(e, StreamEvent::NodeError { node_id, .. } if node_id == "failing")));
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::Done)));
}

// A caller-supplied CancellationToken is a distinct cancellation source from
// the internal fail-fast/timeout token: cancelling it mid-run is reported as
// GraphError::Cancellation rather than any node-level error.
#[tokio::test]
async fn caller_cancellation_is_reported_distinctly() {
    let mut builder = GraphBuilder::<Value>::new();
    builder
        .add_node("root", Arc::new(Echo(json!(null))), NodeOptions::new())
        .add_node("slow", Arc::new(Delay(Duration::from_millis(500))), NodeOptions::new())
        .add_edge("root", "slow", Default::default())
        .output_node("slow");
    let graph = Arc::new(builder.build().unwrap());

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_clone.cancel();
    });

    let started = Instant::now();
    let err = graph.execute(HashMap::new(), cancel).await.unwrap_err();
    assert!(started.elapsed() < Duration::from_millis(400), "caller cancellation should unblock the slow node");
    assert!(matches!(err, GraphError::Cancellation { .. }));
}

// A node that times out under fail-fast is reported as GraphError::NodeTimeout,
// distinguishable from an ordinary node execution failure.
#[tokio::test]
async fn node_timeout_is_a_distinct_error_from_node_execution_failure() {
    let mut builder = GraphBuilder::<Value>::new();
    builder
        .add_node(
            "slow",
            Arc::new(Delay(Duration::from_millis(200))),
            NodeOptions::new().timeout(Duration::from_millis(20)),
        )
        .output_node("slow")
        .config(GraphConfig { error_strategy: ErrorStrategy::FailFast, ..Default::default() });
    let graph = Arc::new(builder.build().unwrap());

    let err = graph.execute(HashMap::new(), CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, GraphError::NodeTimeout { ref node, .. } if node == "slow"));
}

// Scenario 5: continue-on-error skips the downstream of a failed node but
// still succeeds through an independent path.
#[tokio::test]
async fn continue_on_error_skips_downstream_of_a_failure() {
    let mut builder = GraphBuilder::<Value>::new();
    builder
        .add_node("root", Arc::new(Echo(json!(null))), NodeOptions::new())
        .add_node("failing", Arc::new(AlwaysFails), NodeOptions::new())
        .add_node("downstream", Arc::new(Echo(json!("should never run"))), NodeOptions::new())
        .add_node("success", Arc::new(Echo(json!("ok"))), NodeOptions::new())
        .add_edge("root", "failing", Default::default())
        .add_edge("root", "success", Default::default())
        .add_edge("failing", "downstream", Default::default())
        .output_node("success")
        .config(GraphConfig { error_strategy: ErrorStrategy::ContinueOnError, ..Default::default() });
    let graph = Arc::new(builder.build().unwrap());

    let outcome = graph.execute(HashMap::new(), CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.output, json!("ok"));

    let downstream_status = graph.state().get_node_status("downstream").await.unwrap();
    assert_eq!(downstream_status, NodeStatus::Skipped);
    let failing_status = graph.state().get_node_status("failing").await.unwrap();
    assert_eq!(failing_status, NodeStatus::Failed);
}

// Scenario 6: a conditional edge gates routing on the upstream node's result.
#[tokio::test]
async fn conditional_edge_gates_on_upstream_quality() {
    let condition: graph_core::Condition = Arc::new(|_ctx, source_result, _state| {
        source_result.output.get("quality").and_then(Value::as_f64).unwrap_or(0.0) > 0.8
    });

    let mut low_quality = GraphBuilder::<Value>::new();
    low_quality
        .add_node("check", Arc::new(Echo(json!({"quality": 0.3}))), NodeOptions::new())
        .add_node("premium", Arc::new(Echo(json!("premium_output"))), NodeOptions::new())
        .add_edge("check", "premium", graph_core::EdgeOptions::new().when(condition.clone()))
        .output_node("check");
    let graph = Arc::new(low_quality.build().unwrap());
    let outcome = graph.execute(HashMap::new(), CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.output, json!({"quality": 0.3}));
    assert_eq!(graph.state().get_node_status("premium").await.unwrap(), NodeStatus::Skipped);

    let mut high_quality = GraphBuilder::<Value>::new();
    high_quality
        .add_node("check", Arc::new(Echo(json!({"quality": 0.9}))), NodeOptions::new())
        .add_node("premium", Arc::new(Echo(json!("premium_output"))), NodeOptions::new())
        .add_edge("check", "premium", graph_core::EdgeOptions::new().when(condition))
        .output_node("premium");
    let graph = Arc::new(high_quality.build().unwrap());
    let outcome = graph.execute(HashMap::new(), CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.output, json!("premium_output"));
}

struct ChunkyStream {
    sent: Arc<AtomicUsize>,
}

#[async_trait]
impl NodeExecutor for ChunkyStream {
    async fn execute(&self, _input: NodeInput) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Value::Null)
    }
}

#[async_trait]
impl StreamingNodeExecutor for ChunkyStream {
    async fn execute_stream(
        &self,
        _input: NodeInput,
    ) -> Result<Pin<Box<dyn Stream<Item = NodeEvent> + Send>>, Box<dyn std::error::Error + Send + Sync>> {
        let sent = Arc::clone(&self.sent);
        let stream = async_stream::stream! {
            for i in 0..1000u32 {
                sent.fetch_add(1, Ordering::SeqCst);
                yield NodeEvent::Content(i.to_string());
            }
        };
        Ok(Box::pin(stream))
    }
}

// Scenario 7: a consumer that stops after the first chunk does not force the
// producer through all 1000 chunks.
#[tokio::test]
async fn streaming_consumer_can_stop_early_without_draining_the_producer() {
    let sent = Arc::new(AtomicUsize::new(0));
    let chunky = Arc::new(ChunkyStream { sent: Arc::clone(&sent) });

    let mut builder = GraphBuilder::<Value>::new();
    builder
        .add_node("chunks", chunky.clone(), NodeOptions::new().streaming(chunky))
        .output_node("chunks")
        .config(GraphConfig { stream_buffer_size: 1, ..Default::default() });
    let graph = Arc::new(builder.build().unwrap());

    let mut stream = graph.execute_stream(HashMap::new(), CancellationToken::new());
    stream.next().await.unwrap(); // level_start
    stream.next().await.unwrap(); // node_start
    stream.next().await.unwrap(); // first content chunk
    drop(stream);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sent.load(Ordering::SeqCst) < 1000, "producer kept emitting after the consumer stopped reading");
}

// Scenario 8: cost aggregation with tiers and compute cost combine additively.
#[tokio::test]
async fn cost_aggregation_with_tiers() {
    use graph_core::{ComputePricing, ContextTier, ModelPricing, Overview, TokenUsage};

    let overview = Overview::new();
    overview.include_usage(Some(&TokenUsage {
        prompt: 250_000,
        completion: 100_000,
        total: 350_000,
        ..Default::default()
    }));
    overview.set_model_cost(ModelPricing {
        input_cost_per_million: 1.0,
        output_cost_per_million: 2.0,
        context_tiers: vec![ContextTier {
            threshold_tokens: 200_000,
            input_cost_per_million: Some(2.0),
            output_cost_per_million: None,
        }],
        ..Default::default()
    });
    overview.start_execution();
    tokio::time::sleep(Duration::from_millis(10)).await;
    overview.end_execution();
    overview.set_compute_cost(ComputePricing { cost_per_second: 0.5 });

    let summary = overview.cost_summary();
    assert!((summary.model_cost - (0.25 * 2.0 + 0.1 * 2.0)).abs() < 1e-9);
    assert!(summary.compute_cost > 0.0);
    assert!((summary.total_cost - (summary.tool_cost + summary.model_cost + summary.compute_cost)).abs() < 1e-9);
}
