//! The streaming executor (spec.md §4.5): the same level-by-level schedule
//! as [`crate::executor`], but surfaced as an ordered event stream rather
//! than a single resolved value, with backpressure and early-termination
//! support.
//!
//! A node that implements [`crate::node::StreamingNodeExecutor`] has its
//! deltas forwarded as `NodeContent`/`NodeReasoning`/`NodeToolCall`/
//! `NodeToolResult` events as they arrive; a node that only implements
//! [`crate::node::NodeExecutor`] still gets a `NodeStart`/`NodeComplete`
//! bracket, it simply has no deltas in between.

use crate::error::GraphError;
use crate::executor::ExecutionOutcome;
use crate::graph::{ErrorStrategy, Graph};
use crate::node::{NodeEvent, NodeInput};
use crate::overview::Overview;
use futures::stream::StreamExt;
use graph_state::{NodeResult, NodeStatus};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// A boxed, pinned stream of [`StreamEvent`]s — the public shape
/// [`Graph::execute_stream`] returns, matching the teacher's
/// `StreamChunkStream` convention of hiding the channel wrapper behind a
/// plain `Stream` so callers aren't coupled to `tokio::sync::mpsc`.
pub type EventStream = Pin<Box<dyn futures::Stream<Item = StreamEvent> + Send>>;

/// One event in a streaming execution, in emission order within a level
/// (cross-level ordering is also preserved; events from different nodes in
/// the same level interleave as they arrive).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    LevelStart { level: usize, node_ids: Vec<String> },
    NodeStart { level: usize, node_id: String },
    NodeContent { level: usize, node_id: String, delta: String },
    NodeReasoning { level: usize, node_id: String, delta: String },
    NodeToolCall { level: usize, node_id: String, tool_name: String, tool_input: Value },
    NodeToolResult { level: usize, node_id: String, tool_name: String, tool_output: Value },
    /// Always denotes a `Completed` node — failure and skip have their own
    /// dedicated events below, so this carries no status field.
    NodeComplete { level: usize, node_id: String },
    NodeError { level: usize, node_id: String, message: String },
    NodeSkip { level: usize, node_id: String, reason: String },
    LevelComplete { level: usize },
    Done,
}

impl<T: Send + 'static> Graph<T> {
    /// Run the graph, returning a bounded channel of [`StreamEvent`]s. The
    /// channel closes (no more `recv`) once a [`StreamEvent::Done`] has been
    /// sent, or earlier if the receiver is dropped — dropping the receiver
    /// is this API's early-termination path (spec.md §4.5's
    /// `consumer-stopped`): the producer notices the next time it tries to
    /// send and winds the execution down without panicking or logging an error.
    ///
    /// `cancel` is the same single external cancellation source documented
    /// on [`crate::executor`]'s `execute` — pass `CancellationToken::new()`
    /// when the caller has none of its own.
    pub fn execute_stream(self: &Arc<Self>, initial_state: HashMap<String, Value>, cancel: CancellationToken) -> EventStream {
        let (tx, rx) = mpsc::channel(self.config.stream_buffer_size.max(1));
        let graph = Arc::clone(self);
        tokio::spawn(async move {
            graph.run_stream(initial_state, tx, cancel, None).await;
        });
        Box::pin(ReceiverStream::new(rx))
    }

    /// Drive the same level-by-level schedule [`Graph::execute_stream`] uses
    /// to completion, discarding the events and returning the parsed output
    /// plus the [`Overview`] accumulated along the way — byte-for-byte the
    /// same outcome [`Graph::execute`] would produce for the same graph and
    /// input (spec.md §4.5's `Collect` contract), without executing any node
    /// twice.
    pub async fn collect(
        self: &Arc<Self>,
        initial_state: HashMap<String, Value>,
        cancel: CancellationToken,
    ) -> crate::error::Result<ExecutionOutcome<T>> {
        let (tx, mut rx) = mpsc::channel(self.config.stream_buffer_size.max(1));
        let (result_tx, result_rx) = oneshot::channel();
        let graph = Arc::clone(self);
        tokio::spawn(async move {
            graph.run_stream(initial_state, tx, cancel, Some(result_tx)).await;
        });
        while rx.recv().await.is_some() {}

        let overview = result_rx
            .await
            .map_err(|_| GraphError::Cancellation { level: 0, reason: "stream task ended without a result".to_string() })??;
        self.finalize(overview).await
    }

    async fn run_stream(
        self: Arc<Self>,
        initial_state: HashMap<String, Value>,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
        result_tx: Option<oneshot::Sender<crate::error::Result<Arc<Overview>>>>,
    ) {
        let outcome = self.run_stream_inner(initial_state, &tx, cancel).await;
        // A done event and an error are mutually exclusive (spec.md §4.5):
        // the per-node `NodeError` that caused a `FailFast` abort is already
        // sent inside `run_stream_inner`, so there is nothing left to
        // fabricate here beyond not claiming success.
        if outcome.is_ok() {
            let _ = tx.send(StreamEvent::Done).await;
        }
        if let Some(result_tx) = result_tx {
            let _ = result_tx.send(outcome);
        }
    }

    async fn run_stream_inner(
        self: &Arc<Self>,
        initial_state: HashMap<String, Value>,
        tx: &mpsc::Sender<StreamEvent>,
        caller_cancel: CancellationToken,
    ) -> crate::error::Result<Arc<Overview>> {
        for (key, value) in initial_state {
            self.state.set(&key, value).await.map_err(GraphError::StateInit)?;
        }
        let overview = Arc::new(Overview::new());
        overview.start_execution();
        let cancel = caller_cancel.child_token();
        let deadline = self.config.execution_timeout.map(|d| Instant::now() + d);

        'levels: for (level_idx, level_nodes) in self.levels.iter().enumerate() {
            if caller_cancel.is_cancelled() {
                return Err(GraphError::Cancellation { level: level_idx, reason: "caller cancelled execution".to_string() });
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(GraphError::GraphTimeout { level: level_idx });
                }
            }
            if send_or_stop(tx, StreamEvent::LevelStart { level: level_idx, node_ids: level_nodes.clone() }).await.is_err() {
                cancel.cancel();
                break 'levels;
            }

            let (node_tx, mut node_rx) = mpsc::channel::<StreamEvent>(self.config.stream_buffer_size.max(1));
            let mut eligible = Vec::new();
            for node_id in level_nodes {
                match self.check_eligibility(level_idx, node_id).await? {
                    Ok(()) => eligible.push(node_id.clone()),
                    Err(reason) => {
                        self.state.set_node_status(node_id, NodeStatus::Skipped).await.map_err(GraphError::StateInit)?;
                        let reason = reason.reason();
                        if send_or_stop(tx, StreamEvent::NodeSkip { level: level_idx, node_id: node_id.clone(), reason }).await.is_err() {
                            cancel.cancel();
                            break 'levels;
                        }
                    }
                }
            }

            let mut handles = Vec::with_capacity(eligible.len());
            for node_id in eligible {
                let graph = Arc::clone(self);
                let overview = Arc::clone(&overview);
                let node_tx = node_tx.clone();
                let cancel = cancel.clone();
                handles.push(tokio::spawn(async move {
                    graph.run_one_streaming(level_idx, node_id, overview, node_tx, cancel).await
                }));
            }
            drop(node_tx);

            let mut fatal = false;
            while let Some(event) = node_rx.recv().await {
                if matches!(event, StreamEvent::NodeError { .. }) && self.config.error_strategy == ErrorStrategy::FailFast {
                    cancel.cancel();
                    fatal = true;
                }
                if send_or_stop(tx, event).await.is_err() {
                    cancel.cancel();
                    break 'levels;
                }
            }
            for handle in handles {
                let _ = handle.await;
            }

            if send_or_stop(tx, StreamEvent::LevelComplete { level: level_idx }).await.is_err() {
                cancel.cancel();
                break 'levels;
            }
            if fatal {
                return Err(GraphError::NodeExecution {
                    node: self.output_node.clone(),
                    source: "a node failed under the fail-fast error strategy".into(),
                });
            }
            if caller_cancel.is_cancelled() {
                return Err(GraphError::Cancellation { level: level_idx, reason: "caller cancelled execution".to_string() });
            }
        }
        overview.end_execution();
        Ok(overview)
    }

    async fn run_one_streaming(
        self: Arc<Self>,
        level: usize,
        node_id: String,
        overview: Arc<Overview>,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) {
        if cancel.is_cancelled() {
            let _ = self.state.set_node_status(&node_id, NodeStatus::Skipped).await;
            let _ = tx.send(StreamEvent::NodeSkip { level, node_id, reason: "execution was cancelled".into() }).await;
            return;
        }

        let _ = tx.send(StreamEvent::NodeStart { level, node_id: node_id.clone() }).await;
        let _ = self.state.set_node_status(&node_id, NodeStatus::Running).await;

        let node = self.nodes.get(&node_id).expect("node exists");
        let mut upstream = HashMap::with_capacity(node.dependencies.len());
        for dep in &node.dependencies {
            if let Ok(Some(result)) = self.state.get_node_result(dep).await {
                upstream.insert(dep.clone(), result);
            }
        }
        let client = node.client.clone().or_else(|| self.default_client.clone());
        let input = NodeInput {
            upstream,
            state: Arc::clone(&self.state),
            params: node.params.clone(),
            client,
            tools: node.tools.clone(),
            overview,
        };

        let started = Instant::now();
        let (status, output) = match &node.streaming_executor {
            Some(streaming) => self.drive_streaming(streaming.as_ref(), input, level, &node_id, &tx, &cancel).await,
            None => self.drive_non_streaming(node.executor.as_ref(), input, &cancel).await,
        };
        let duration = started.elapsed();

        let result = match &output {
            Ok(value) => NodeResult::success(value.clone(), duration),
            Err(message) => NodeResult::failure(message.clone(), duration),
        };
        let _ = self.state.set_node_result(&node_id, result).await;
        let _ = self.state.set_node_status(&node_id, status).await;

        match status {
            NodeStatus::Failed => {
                let _ = tx
                    .send(StreamEvent::NodeError { level, node_id, message: output.err().unwrap_or_default() })
                    .await;
            }
            NodeStatus::Skipped => {
                let _ = tx.send(StreamEvent::NodeSkip { level, node_id, reason: "execution was cancelled".into() }).await;
            }
            _ => {
                let _ = tx.send(StreamEvent::NodeComplete { level, node_id }).await;
            }
        }
    }

    async fn drive_non_streaming(
        &self,
        executor: &(dyn crate::node::NodeExecutor),
        input: NodeInput,
        cancel: &CancellationToken,
    ) -> (NodeStatus, Result<Value, String>) {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => (NodeStatus::Skipped, Err("execution was cancelled".to_string())),
            res = executor.execute(input) => match res {
                Ok(value) => (NodeStatus::Completed, Ok(value)),
                Err(e) => (NodeStatus::Failed, Err(e.to_string())),
            },
        }
    }

    async fn drive_streaming(
        &self,
        executor: &(dyn crate::node::StreamingNodeExecutor),
        input: NodeInput,
        level: usize,
        node_id: &str,
        tx: &mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> (NodeStatus, Result<Value, String>) {
        let mut stream = match executor.execute_stream(input).await {
            Ok(stream) => stream,
            Err(e) => return (NodeStatus::Failed, Err(e.to_string())),
        };

        let mut last_content = String::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return (NodeStatus::Skipped, Err("execution was cancelled".to_string())),
                next = stream.next() => match next {
                    None => break,
                    Some(event) => {
                        let wire = match event {
                            NodeEvent::Content(delta) => {
                                last_content.push_str(&delta);
                                StreamEvent::NodeContent { level, node_id: node_id.to_string(), delta }
                            }
                            NodeEvent::Reasoning(delta) => {
                                StreamEvent::NodeReasoning { level, node_id: node_id.to_string(), delta }
                            }
                            NodeEvent::ToolCall { tool_name, tool_input } => {
                                StreamEvent::NodeToolCall { level, node_id: node_id.to_string(), tool_name, tool_input }
                            }
                            NodeEvent::ToolResult { tool_name, tool_output } => {
                                StreamEvent::NodeToolResult { level, node_id: node_id.to_string(), tool_name, tool_output }
                            }
                        };
                        if tx.send(wire).await.is_err() {
                            return (NodeStatus::Skipped, Err("consumer stopped".to_string()));
                        }
                    }
                },
            }
        }
        (NodeStatus::Completed, Ok(Value::String(last_content)))
    }
}

/// Send, mapping a closed receiver (the consumer stopped reading) to `Err(())`
/// instead of letting `mpsc::Sender::send`'s error type leak `StreamEvent`
/// back out — the caller only needs to know whether to keep going.
async fn send_or_stop(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> std::result::Result<(), ()> {
    tx.send(event).await.map_err(|_| ())
}
