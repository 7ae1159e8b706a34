//! [`GraphBuilder`]: the only way to produce a [`Graph`] (spec.md §4.2).
//!
//! Validation errors are deferred — `add_node`/`add_edge` record a problem
//! and keep going rather than returning early — so [`GraphBuilder::build`]
//! can report every structural mistake in one pass instead of forcing a
//! fix-one-rebuild-rediscover-the-next loop. Level partitioning is Kahn's
//! algorithm: repeatedly peel the frontier of zero-remaining-in-degree
//! nodes, each peel is one level, any node still unpeeled at the end means
//! a cycle.

use crate::edge::{Condition, Edge};
use crate::error::{GraphError, Result};
use crate::graph::{Graph, GraphConfig};
use crate::llm::LlmClient;
use crate::node::{Node, NodeExecutor, StreamingNodeExecutor};
use crate::observability::{NoopObserver, Observer};
use crate::parse::{JsonOutputParser, OutputParser};
use crate::tool::Tool;
use graph_state::{InMemoryStateProvider, StateProvider};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Per-node overrides accepted by [`GraphBuilder::add_node`].
#[derive(Default)]
pub struct NodeOptions {
    client: Option<Arc<dyn LlmClient>>,
    streaming_executor: Option<Arc<dyn StreamingNodeExecutor>>,
    tools: Vec<Arc<dyn Tool>>,
    params: HashMap<String, Value>,
    timeout: Option<Duration>,
}

impl NodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn streaming(mut self, executor: Arc<dyn StreamingNodeExecutor>) -> Self {
        self.streaming_executor = Some(executor);
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Per-edge overrides accepted by [`GraphBuilder::add_edge`].
#[derive(Default, Clone)]
pub struct EdgeOptions {
    condition: Option<Condition>,
}

impl EdgeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate this edge on a predicate (spec.md §4.8). An edge without a
    /// condition always permits its target to run.
    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

struct NodeEntry {
    executor: Arc<dyn NodeExecutor>,
    streaming_executor: Option<Arc<dyn StreamingNodeExecutor>>,
    client: Option<Arc<dyn LlmClient>>,
    tools: Vec<Arc<dyn Tool>>,
    params: HashMap<String, Value>,
    timeout: Option<Duration>,
}

/// Accumulates nodes, edges, and config; `build()` validates and freezes
/// everything into a [`Graph`].
pub struct GraphBuilder<T> {
    node_order: Vec<String>,
    node_entries: HashMap<String, NodeEntry>,
    edges: Vec<Edge>,
    errors: Vec<String>,
    config: GraphConfig,
    output_node: Option<String>,
    default_client: Option<Arc<dyn LlmClient>>,
    default_tools: Vec<Arc<dyn Tool>>,
    state: Option<Arc<dyn StateProvider>>,
    output_parser: Arc<dyn OutputParser<T> + Send + Sync>,
    observer: Option<Arc<dyn Observer>>,
    _output: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned + Send + Sync + 'static> GraphBuilder<T> {
    /// Builder for an output type with a default `serde` deserialization —
    /// covers `String`, `serde_json::Value`, and any `#[derive(Deserialize)]`
    /// struct a node's final output already matches structurally.
    pub fn new() -> Self {
        Self::new_with_parser(Arc::new(JsonOutputParser::default()))
    }
}

impl<T> GraphBuilder<T> {
    /// Builder for an output type needing custom parsing logic (schema
    /// coercion, a non-JSON wire shape, ...).
    pub fn new_with_parser(output_parser: Arc<dyn OutputParser<T> + Send + Sync>) -> Self {
        Self {
            node_order: Vec::new(),
            node_entries: HashMap::new(),
            edges: Vec::new(),
            errors: Vec::new(),
            config: GraphConfig::default(),
            output_node: None,
            default_client: None,
            default_tools: Vec::new(),
            state: None,
            output_parser,
            observer: None,
            _output: PhantomData,
        }
    }

    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        executor: Arc<dyn NodeExecutor>,
        options: NodeOptions,
    ) -> &mut Self {
        let id = id.into();
        if id.is_empty() {
            self.errors.push("node id must not be empty".to_string());
            return self;
        }
        if self.node_entries.contains_key(&id) {
            self.errors.push(format!("duplicate node id '{id}'"));
            return self;
        }
        self.node_order.push(id.clone());
        self.node_entries.insert(
            id,
            NodeEntry {
                executor,
                streaming_executor: options.streaming_executor,
                client: options.client,
                tools: options.tools,
                params: options.params,
                timeout: options.timeout,
            },
        );
        self
    }

    pub fn add_edge(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        options: EdgeOptions,
    ) -> &mut Self {
        let from = from.into();
        let to = to.into();
        if from.is_empty() || to.is_empty() {
            self.errors.push("edge endpoints must not be empty".to_string());
            return self;
        }
        if from == to {
            self.errors.push(format!("self-loop on node '{from}' is not allowed"));
            return self;
        }
        if self.edges.iter().any(|e| e.from == from && e.to == to) {
            self.errors.push(format!("duplicate edge '{from}' -> '{to}'"));
            return self;
        }
        self.edges.push(Edge { from, to, condition: options.condition });
        self
    }

    pub fn output_node(&mut self, id: impl Into<String>) -> &mut Self {
        self.output_node = Some(id.into());
        self
    }

    pub fn default_client(&mut self, client: Arc<dyn LlmClient>) -> &mut Self {
        self.default_client = Some(client);
        self
    }

    pub fn default_tool(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.default_tools.push(tool);
        self
    }

    pub fn state_provider(&mut self, state: Arc<dyn StateProvider>) -> &mut Self {
        self.state = Some(state);
        self
    }

    pub fn observer(&mut self, observer: Arc<dyn Observer>) -> &mut Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&mut self, config: GraphConfig) -> &mut Self {
        self.config = config;
        self
    }

    /// Validate and freeze the accumulated nodes/edges into a [`Graph`].
    ///
    /// Every structural error collected along the way — from `add_node`,
    /// `add_edge`, and the checks below — is joined into a single
    /// [`GraphError::Build`] rather than returned on the first one found.
    pub fn build(self) -> Result<Graph<T>> {
        let mut errors = self.errors;

        if self.node_entries.is_empty() {
            errors.push("graph must contain at least one node".to_string());
        }

        for edge in &self.edges {
            if !self.node_entries.contains_key(&edge.from) {
                errors.push(format!("edge references unknown node '{}'", edge.from));
            }
            if !self.node_entries.contains_key(&edge.to) {
                errors.push(format!("edge references unknown node '{}'", edge.to));
            }
        }

        if let Some(id) = &self.output_node {
            if !self.node_entries.contains_key(id) {
                errors.push(format!("output node '{id}' does not reference a known node"));
            }
        }

        if !errors.is_empty() {
            return Err(GraphError::Build(errors.join("; ")));
        }

        let insertion_index: HashMap<&str, usize> = self
            .node_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut incoming: HashMap<String, Vec<usize>> =
            self.node_order.iter().map(|id| (id.clone(), Vec::new())).collect();
        let mut outgoing: HashMap<String, Vec<usize>> =
            self.node_order.iter().map(|id| (id.clone(), Vec::new())).collect();
        for (idx, edge) in self.edges.iter().enumerate() {
            incoming.get_mut(&edge.to).expect("validated above").push(idx);
            outgoing.get_mut(&edge.from).expect("validated above").push(idx);
        }

        let (levels, topological_order) =
            partition_into_levels(&self.node_order, &insertion_index, &incoming, &outgoing, &self.edges)?;

        // If no output node was configured, the last node in topological
        // order is used — `partition_into_levels` already guarantees
        // `topological_order` is non-empty whenever `node_order` is (checked
        // above).
        let output_node = self
            .output_node
            .clone()
            .unwrap_or_else(|| topological_order.last().expect("non-empty graph").clone());

        let mut nodes = HashMap::with_capacity(self.node_entries.len());
        for (id, entry) in self.node_entries {
            let dependencies = incoming[&id].iter().map(|&idx| self.edges[idx].from.clone()).collect();
            let mut tools = self.default_tools.clone();
            tools.extend(entry.tools);
            nodes.insert(
                id.clone(),
                Node {
                    id,
                    executor: entry.executor,
                    streaming_executor: entry.streaming_executor,
                    client: entry.client,
                    tools,
                    params: entry.params,
                    timeout: entry.timeout,
                    dependencies,
                },
            );
        }

        let state = self.state.unwrap_or_else(InMemoryStateProvider::shared_arc);
        let observer: Arc<dyn Observer> = self.observer.unwrap_or_else(|| Arc::new(NoopObserver));

        Ok(Graph {
            nodes,
            edges: self.edges,
            incoming,
            topological_order,
            levels,
            output_node,
            default_client: self.default_client,
            default_tools: self.default_tools,
            config: self.config,
            state,
            output_parser: self.output_parser,
            observer,
            _output: PhantomData,
        })
    }
}

/// Kahn's algorithm with insertion-order-deterministic level partitioning.
fn partition_into_levels(
    node_order: &[String],
    insertion_index: &HashMap<&str, usize>,
    incoming: &HashMap<String, Vec<usize>>,
    outgoing: &HashMap<String, Vec<usize>>,
    edges: &[Edge],
) -> Result<(Vec<Vec<String>>, Vec<String>)> {
    let mut remaining_in_degree: HashMap<&str, usize> =
        node_order.iter().map(|id| (id.as_str(), incoming[id].len())).collect();

    let mut frontier: Vec<String> = node_order
        .iter()
        .filter(|id| remaining_in_degree[id.as_str()] == 0)
        .cloned()
        .collect();
    frontier.sort_by_key(|id| insertion_index[id.as_str()]);

    let mut levels = Vec::new();
    let mut topological_order = Vec::new();

    while !frontier.is_empty() {
        topological_order.extend(frontier.iter().cloned());

        let mut next = Vec::new();
        for id in &frontier {
            for &edge_idx in &outgoing[id] {
                let to = edges[edge_idx].to.as_str();
                let degree = remaining_in_degree.get_mut(to).expect("known node");
                *degree -= 1;
                if *degree == 0 {
                    next.push(to.to_string());
                }
            }
        }
        next.sort_by_key(|id| insertion_index[id.as_str()]);

        levels.push(std::mem::replace(&mut frontier, next));
    }

    if topological_order.len() != node_order.len() {
        let cyclic: BTreeSet<String> = remaining_in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        return Err(GraphError::Cycle(cyclic));
    }

    Ok((levels, topological_order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl NodeExecutor for Echo {
        async fn execute(&self, input: crate::node::NodeInput) -> std::result::Result<Value, Box<dyn std::error::Error + Send + Sync>> {
            let _ = input;
            Ok(Value::String("ok".into()))
        }
    }

    #[test]
    fn diamond_topology_partitions_into_three_levels() {
        let mut builder = GraphBuilder::<Value>::new();
        builder
            .add_node("start", Arc::new(Echo), NodeOptions::new())
            .add_node("left", Arc::new(Echo), NodeOptions::new())
            .add_node("right", Arc::new(Echo), NodeOptions::new())
            .add_node("join", Arc::new(Echo), NodeOptions::new())
            .add_edge("start", "left", EdgeOptions::new())
            .add_edge("start", "right", EdgeOptions::new())
            .add_edge("left", "join", EdgeOptions::new())
            .add_edge("right", "join", EdgeOptions::new())
            .output_node("join");

        let graph = builder.build().unwrap();
        assert_eq!(graph.levels().len(), 3);
        assert_eq!(graph.levels()[0], vec!["start".to_string()]);
        let mut mid = graph.levels()[1].clone();
        mid.sort();
        assert_eq!(mid, vec!["left".to_string(), "right".to_string()]);
        assert_eq!(graph.levels()[2], vec!["join".to_string()]);
        assert_eq!(graph.node("join").unwrap().dependencies.len(), 2);
    }

    #[test]
    fn cycle_is_rejected() {
        let mut builder = GraphBuilder::<Value>::new();
        builder
            .add_node("a", Arc::new(Echo), NodeOptions::new())
            .add_node("b", Arc::new(Echo), NodeOptions::new())
            .add_edge("a", "b", EdgeOptions::new())
            .add_edge("b", "a", EdgeOptions::new())
            .output_node("b");

        match builder.build() {
            Err(GraphError::Cycle(ids)) => {
                assert!(ids.contains("a"));
                assert!(ids.contains("b"));
            }
            other => panic!("expected Cycle error, got {other:?}"),
        }
    }

    #[test]
    fn deferred_errors_are_joined() {
        let mut builder = GraphBuilder::<Value>::new();
        builder
            .add_node("a", Arc::new(Echo), NodeOptions::new())
            .add_edge("a", "a", EdgeOptions::new())
            .add_edge("a", "missing", EdgeOptions::new());

        let err = builder.build().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("self-loop"));
        assert!(message.contains("unknown node 'missing'"));
    }

    #[test]
    fn unconfigured_output_node_defaults_to_last_in_topological_order() {
        let mut builder = GraphBuilder::<Value>::new();
        builder
            .add_node("a", Arc::new(Echo), NodeOptions::new())
            .add_node("b", Arc::new(Echo), NodeOptions::new())
            .add_edge("a", "b", EdgeOptions::new());

        let graph = builder.build().unwrap();
        assert_eq!(graph.output_node(), "b");
    }

    #[test]
    fn duplicate_node_id_is_an_error() {
        let mut builder = GraphBuilder::<Value>::new();
        builder
            .add_node("a", Arc::new(Echo), NodeOptions::new())
            .add_node("a", Arc::new(Echo), NodeOptions::new())
            .output_node("a");

        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("duplicate node id"));
    }
}
