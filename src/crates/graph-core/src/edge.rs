//! Directed edges, with optional runtime conditions.

use graph_state::{NodeResult, StateProvider};
use std::sync::Arc;

/// Context handed to an edge condition alongside the source node's result.
/// Kept deliberately thin (spec.md's "context" is opaque from the executor's
/// point of view) — it carries only what a condition plausibly needs to
/// reason about *where* it's being evaluated.
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    pub level: usize,
    pub from: &'a str,
    pub to: &'a str,
}

/// A pure predicate over (context, source result, shared state) deciding
/// whether a conditional edge permits its target to run.
pub type Condition = Arc<
    dyn for<'a> Fn(ConditionContext<'a>, &NodeResult, &dyn StateProvider) -> bool + Send + Sync,
>;

/// A directed edge `from -> to`, optionally gated by a [`Condition`].
///
/// An edge without a condition always permits (spec.md §4.8). `from != to`
/// and both endpoints must reference nodes that exist; both are enforced by
/// [`crate::builder::GraphBuilder`], not by this type.
#[derive(Clone)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub condition: Option<Condition>,
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("conditional", &self.condition.is_some())
            .finish()
    }
}

impl Edge {
    pub fn unconditional(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { from: from.into(), to: to.into(), condition: None }
    }

    pub fn conditional(from: impl Into<String>, to: impl Into<String>, condition: Condition) -> Self {
        Self { from: from.into(), to: to.into(), condition: Some(condition) }
    }

    /// Evaluate this edge's condition, defaulting to `true` when there is none.
    pub fn permits(&self, ctx: ConditionContext<'_>, source_result: &NodeResult, state: &dyn StateProvider) -> bool {
        match &self.condition {
            None => true,
            Some(predicate) => predicate(ctx, source_result, state),
        }
    }
}
