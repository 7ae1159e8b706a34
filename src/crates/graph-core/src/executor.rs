//! The synchronous executor (spec.md §4.4): runs a [`Graph`] level by level,
//! fanning each level's ready nodes out across bounded concurrency and
//! fanning them back in before moving to the next level.
//!
//! "Synchronous" describes the caller's view — `execute` resolves once with
//! the final output — not the internals, which run every eligible node in a
//! level concurrently up to `config.max_concurrency`.

use crate::edge::ConditionContext;
use crate::error::{GraphError, Result};
use crate::graph::{ErrorStrategy, Graph};
use crate::node::NodeInput;
use crate::overview::Overview;
use graph_state::{NodeResult, NodeStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// The parsed output of a completed execution, plus the [`Overview`]
/// accumulated along the way (spec.md §4.6).
pub struct ExecutionOutcome<T> {
    pub output: T,
    pub overview: Arc<Overview>,
}

/// Why a node was excluded from a level's ready set.
pub(crate) enum Ineligible {
    DependencyIncomplete(String),
    EdgeDeclined,
}

impl Ineligible {
    pub(crate) fn reason(&self) -> String {
        match self {
            Ineligible::DependencyIncomplete(dep) => format!("dependency '{dep}' did not complete"),
            Ineligible::EdgeDeclined => "a conditional edge declined to route to this node".to_string(),
        }
    }
}

struct NodeOutcome {
    id: String,
    status: NodeStatus,
    result: NodeResult,
    timed_out: Option<u128>,
}

impl<T: Send + 'static> Graph<T> {
    /// Run the graph to completion. Shared state is seeded with
    /// `initial_state` before the first level runs.
    ///
    /// `cancel` is the single external cancellation source (spec.md §5):
    /// cancelling it before or during the run unblocks any in-flight node
    /// that is awaiting its own [`CancellationToken`] and surfaces
    /// [`GraphError::Cancellation`] rather than whatever the node was
    /// doing when it was interrupted. A fresh `CancellationToken::new()`
    /// is the right value when the caller has no cancellation source of
    /// its own.
    pub async fn execute(
        self: &Arc<Self>,
        initial_state: HashMap<String, Value>,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutcome<T>> {
        for (key, value) in initial_state {
            self.state.set(&key, value).await.map_err(GraphError::StateInit)?;
        }

        let overview = Arc::new(Overview::new());
        overview.start_execution();

        let root_span = self.observer.root_span(
            self.nodes.len(),
            self.levels.len(),
            &self.config.error_strategy.to_string(),
            &self.output_node,
        );
        let deadline = self.config.execution_timeout.map(|d| Instant::now() + d);

        let run = self.run_levels(Arc::clone(&overview), cancel, deadline);
        run.instrument(root_span).await?;

        self.finalize(overview).await
    }

    /// Reset every node's status to `Pending` and replace shared state with
    /// `new_initial_state` (spec.md §4.4's `Reset(ctx, newInitialState)`).
    pub async fn reset(&self, new_initial_state: HashMap<String, Value>) -> Result<()> {
        for id in self.nodes.keys() {
            self.state.set_node_status(id, NodeStatus::Pending).await.map_err(GraphError::StateInit)?;
        }
        for (key, value) in new_initial_state {
            self.state.set(&key, value).await.map_err(GraphError::StateInit)?;
        }
        Ok(())
    }

    async fn run_levels(
        self: &Arc<Self>,
        overview: Arc<Overview>,
        caller_cancel: CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<()> {
        // Node tasks only ever see this child token: the caller cancelling
        // `caller_cancel` cascades into it automatically, and fail-fast
        // cancelling it locally (below) never reaches back up to the caller.
        let cancel = caller_cancel.child_token();

        for (level_idx, level_nodes) in self.levels.iter().enumerate() {
            if caller_cancel.is_cancelled() {
                return Err(GraphError::Cancellation {
                    level: level_idx,
                    reason: "caller cancelled execution".to_string(),
                });
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(GraphError::GraphTimeout { level: level_idx });
                }
            }

            self.observer.on_level_start(level_idx, level_nodes);

            let mut join_set: JoinSet<NodeOutcome> = JoinSet::new();
            let semaphore = (self.config.max_concurrency > 0)
                .then(|| Arc::new(Semaphore::new(self.config.max_concurrency)));

            for node_id in level_nodes {
                match self.check_eligibility(level_idx, node_id).await? {
                    Ok(()) => {
                        self.spawn_node(&mut join_set, level_idx, node_id, &overview, semaphore.clone(), cancel.clone());
                    }
                    Err(reason) => {
                        let message = reason.reason();
                        self.state.set_node_status(node_id, NodeStatus::Skipped).await.map_err(GraphError::StateInit)?;
                        self.observer.on_node_skip(level_idx, node_id, &message);
                        self.observer.record_node_count(NodeStatus::Skipped);
                    }
                }
            }

            let mut fatal: Option<GraphError> = None;
            while let Some(joined) = join_set.join_next().await {
                let outcome = joined.expect("node task panicked");
                self.observer.record_node_count(outcome.status);
                if outcome.status == NodeStatus::Failed && self.config.error_strategy == ErrorStrategy::FailFast {
                    cancel.cancel();
                    if fatal.is_none() {
                        fatal = Some(match outcome.timed_out {
                            Some(elapsed_ms) => GraphError::NodeTimeout { node: outcome.id.clone(), elapsed_ms },
                            None => {
                                let reason = outcome.result.error.clone().unwrap_or_default();
                                GraphError::NodeExecution {
                                    node: outcome.id.clone(),
                                    source: Box::<dyn std::error::Error + Send + Sync>::from(reason),
                                }
                            }
                        });
                    }
                }
            }

            self.observer.on_level_complete(level_idx);
            if let Some(err) = fatal {
                return Err(err);
            }
            if caller_cancel.is_cancelled() {
                return Err(GraphError::Cancellation {
                    level: level_idx,
                    reason: "caller cancelled execution".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Checks whether `node_id`'s dependencies have all completed and every
    /// incoming edge's condition permits it to run this level.
    pub(crate) async fn check_eligibility(&self, level: usize, node_id: &str) -> Result<std::result::Result<(), Ineligible>> {
        let node = self.nodes.get(node_id).expect("node in its own level");
        for dep in &node.dependencies {
            let status = self.state.get_node_status(dep).await.map_err(GraphError::StateInit)?;
            if !status.is_completed() {
                return Ok(Err(Ineligible::DependencyIncomplete(dep.clone())));
            }
        }

        for &edge_idx in self.incoming.get(node_id).map(Vec::as_slice).unwrap_or_default() {
            let edge = &self.edges[edge_idx];
            if edge.condition.is_none() {
                continue;
            }
            let source_result = self
                .state
                .get_node_result(&edge.from)
                .await
                .map_err(GraphError::StateInit)?
                .expect("completed dependency has a stored result");
            let ctx = ConditionContext { level, from: &edge.from, to: &edge.to };
            if !edge.permits(ctx, &source_result, self.state.as_ref()) {
                return Ok(Err(Ineligible::EdgeDeclined));
            }
        }
        Ok(Ok(()))
    }

    fn spawn_node(
        self: &Arc<Self>,
        join_set: &mut JoinSet<NodeOutcome>,
        level: usize,
        node_id: &str,
        overview: &Arc<Overview>,
        semaphore: Option<Arc<Semaphore>>,
        cancel: CancellationToken,
    ) {
        let graph = Arc::clone(self);
        let overview = Arc::clone(overview);
        let node_id = node_id.to_string();
        let span = self.observer.node_span(&node_id, level, &graph.nodes[&node_id].dependencies);

        join_set.spawn(
            async move {
                if cancel.is_cancelled() {
                    return skip_outcome(&node_id, "execution was cancelled");
                }

                let _permit = match &semaphore {
                    Some(sem) => match sem.clone().acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return skip_outcome(&node_id, "concurrency semaphore was closed"),
                    },
                    None => None,
                };

                graph.observer.on_node_start(level, &node_id);
                let _ = graph.state.set_node_status(&node_id, NodeStatus::Running).await;

                let node = graph.nodes.get(&node_id).expect("node exists");
                let mut upstream = HashMap::with_capacity(node.dependencies.len());
                for dep in &node.dependencies {
                    if let Ok(Some(result)) = graph.state.get_node_result(dep).await {
                        upstream.insert(dep.clone(), result);
                    }
                }
                let client = node.client.clone().or_else(|| graph.default_client.clone());
                let input = NodeInput {
                    upstream,
                    state: Arc::clone(&graph.state),
                    params: node.params.clone(),
                    client,
                    tools: node.tools.clone(),
                    overview: Arc::clone(&overview),
                };

                let started = Instant::now();
                let execution = node.executor.execute(input);
                let outcome = match node.timeout {
                    Some(timeout) => {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => Err(NodeRunError::Cancelled),
                            res = tokio::time::timeout(timeout, execution) => match res {
                                Ok(Ok(value)) => Ok(value),
                                Ok(Err(e)) => Err(NodeRunError::Failed(e.to_string())),
                                Err(_) => Err(NodeRunError::TimedOut(timeout.as_millis())),
                            },
                        }
                    }
                    None => {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => Err(NodeRunError::Cancelled),
                            res = execution => match res {
                                Ok(value) => Ok(value),
                                Err(e) => Err(NodeRunError::Failed(e.to_string())),
                            },
                        }
                    }
                };
                let duration = started.elapsed();

                let outcome = match outcome {
                    Ok(value) => {
                        let result = NodeResult::success(value, duration);
                        let _ = graph.state.set_node_result(&node_id, result.clone()).await;
                        let _ = graph.state.set_node_status(&node_id, NodeStatus::Completed).await;
                        NodeOutcome { id: node_id.clone(), status: NodeStatus::Completed, result, timed_out: None }
                    }
                    Err(NodeRunError::Cancelled) => skip_outcome(&node_id, "execution was cancelled"),
                    Err(NodeRunError::Failed(message)) => {
                        let result = NodeResult::failure(message, duration);
                        let _ = graph.state.set_node_result(&node_id, result.clone()).await;
                        let _ = graph.state.set_node_status(&node_id, NodeStatus::Failed).await;
                        NodeOutcome { id: node_id.clone(), status: NodeStatus::Failed, result, timed_out: None }
                    }
                    Err(NodeRunError::TimedOut(elapsed_ms)) => {
                        let message = format!("timed out after {elapsed_ms}ms");
                        let result = NodeResult::failure(message, duration);
                        let _ = graph.state.set_node_result(&node_id, result.clone()).await;
                        let _ = graph.state.set_node_status(&node_id, NodeStatus::Failed).await;
                        NodeOutcome {
                            id: node_id.clone(),
                            status: NodeStatus::Failed,
                            result,
                            timed_out: Some(elapsed_ms),
                        }
                    }
                };

                graph.observer.on_node_complete(level, &outcome.id, outcome.status, duration);
                graph.observer.record_node_duration(&outcome.id, duration);
                outcome
            }
            .instrument(span),
        );
    }

    pub(crate) async fn finalize(&self, overview: Arc<Overview>) -> Result<ExecutionOutcome<T>> {
        let status = self.state.get_node_status(&self.output_node).await.map_err(GraphError::StateInit)?;
        if !status.is_completed() {
            overview.end_execution();
            self.observer.record_execution_duration(overview.execution_duration());
            return Err(GraphError::NodeInput {
                node: self.output_node.clone(),
                reason: format!("output node ended in status {status:?} instead of completed"),
            });
        }
        let result = self
            .state
            .get_node_result(&self.output_node)
            .await
            .map_err(GraphError::StateInit)?
            .expect("completed node has a stored result");

        overview.end_execution();
        self.observer.record_execution_duration(overview.execution_duration());

        let output = self.output_parser.parse(&result.output).map_err(|source| GraphError::OutputParse {
            node: self.output_node.clone(),
            source,
        })?;
        Ok(ExecutionOutcome { output, overview })
    }
}

enum NodeRunError {
    Cancelled,
    Failed(String),
    TimedOut(u128),
}

fn skip_outcome(node_id: &str, reason: &str) -> NodeOutcome {
    NodeOutcome {
        id: node_id.to_string(),
        status: NodeStatus::Skipped,
        result: NodeResult::failure(reason.to_string(), std::time::Duration::ZERO),
        timed_out: None,
    }
}
