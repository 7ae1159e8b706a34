//! Structured spans, counters, histograms, and logs around scheduling
//! events (spec.md §4.7).
//!
//! The teacher's dependency stack has no metrics crate, so counters and
//! histograms are modeled here as [`Observer`] calls that a `tracing`-backed
//! implementation turns into structured events with `counter`/`histogram`
//! fields, rather than pulling in an unused third-party metrics library.
//! When no observer is configured the executor falls back to
//! [`NoopObserver`], whose every method is an empty, `#[inline]` no-op and
//! whose spans are `tracing::Span::none()` — the "nil observer path avoids
//! allocation" invariant (spec property P6) holds literally.

use graph_state::NodeStatus;
use std::time::Duration;
use tracing::Span;

/// Observability sink the executor reports scheduling events to.
///
/// All methods have default no-op bodies so an implementation only needs to
/// override what it cares about; [`NoopObserver`] uses every default.
pub trait Observer: Send + Sync {
    /// Open the root span for one execution. Entered for the lifetime of
    /// `Graph::execute`/`execute_stream`.
    fn root_span(&self, total_nodes: usize, total_levels: usize, error_strategy: &str, output_node: &str) -> Span {
        let _ = (total_nodes, total_levels, error_strategy, output_node);
        Span::none()
    }

    /// Open a child span for one node's execution.
    fn node_span(&self, node_id: &str, level: usize, dependencies: &[String]) -> Span {
        let _ = (node_id, level, dependencies);
        Span::none()
    }

    fn on_level_start(&self, level: usize, node_ids: &[String]) {
        let _ = (level, node_ids);
    }

    fn on_level_complete(&self, level: usize) {
        let _ = level;
    }

    fn on_node_start(&self, level: usize, node_id: &str) {
        let _ = (level, node_id);
    }

    fn on_node_complete(&self, level: usize, node_id: &str, status: NodeStatus, duration: Duration) {
        let _ = (level, node_id, status, duration);
    }

    fn on_node_skip(&self, level: usize, node_id: &str, reason: &str) {
        let _ = (level, node_id, reason);
    }

    /// `node.count` keyed by terminal status.
    fn record_node_count(&self, status: NodeStatus) {
        let _ = status;
    }

    /// `node.duration` histogram observation.
    fn record_node_duration(&self, node_id: &str, duration: Duration) {
        let _ = (node_id, duration);
    }

    /// `execution.duration` histogram observation.
    fn record_execution_duration(&self, duration: Duration) {
        let _ = duration;
    }
}

/// Zero-overhead default: every method is an empty no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Observer backed by the `tracing` crate. Spans carry the attribute names
/// spec.md §4.7 requires; counters and histograms are emitted as `tracing`
/// events tagged `counter`/`histogram` since the stack has no metrics crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn root_span(&self, total_nodes: usize, total_levels: usize, error_strategy: &str, output_node: &str) -> Span {
        tracing::info_span!(
            "graph.execute",
            total_nodes,
            total_levels,
            error_strategy,
            output_node,
        )
    }

    fn node_span(&self, node_id: &str, level: usize, dependencies: &[String]) -> Span {
        tracing::info_span!("graph.node", node_id, level, dependencies = ?dependencies)
    }

    fn on_level_start(&self, level: usize, node_ids: &[String]) {
        tracing::info!(level, node_ids = ?node_ids, "level start");
    }

    fn on_level_complete(&self, level: usize) {
        tracing::info!(level, "level complete");
    }

    fn on_node_start(&self, level: usize, node_id: &str) {
        tracing::info!(level, node_id, "node start");
    }

    fn on_node_complete(&self, level: usize, node_id: &str, status: NodeStatus, duration: Duration) {
        match status {
            NodeStatus::Failed => tracing::error!(level, node_id, ?status, ?duration, "node failed"),
            _ => tracing::info!(level, node_id, ?status, ?duration, "node complete"),
        }
    }

    fn on_node_skip(&self, level: usize, node_id: &str, reason: &str) {
        tracing::info!(level, node_id, reason, "node skipped");
    }

    fn record_node_count(&self, status: NodeStatus) {
        tracing::debug!(counter = "node.count", ?status, value = 1u64);
    }

    fn record_node_duration(&self, node_id: &str, duration: Duration) {
        tracing::debug!(histogram = "node.duration", node_id, millis = duration.as_millis() as u64);
    }

    fn record_execution_duration(&self, duration: Duration) {
        tracing::debug!(histogram = "execution.duration", millis = duration.as_millis() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_observer_spans_are_disabled() {
        let observer = NoopObserver;
        let span = observer.root_span(1, 1, "fail_fast", "out");
        assert!(span.is_none());
    }
}
