//! Pluggable shared-state and per-node status/result store.
//!
//! `graph-state` is the leaf dependency of the graph executor (`graph-core`):
//! it owns the [`NodeStatus`] and [`NodeResult`] types plus the
//! [`StateProvider`] trait that the executor drives every node's lifecycle
//! through. The only mandated implementation is [`InMemoryStateProvider`];
//! anything else (Postgres, Redis, a checkpoint-backed store) just needs to
//! implement the eight-method trait and respect JSON-serializability of
//! stored values.
//!
//! # Concurrency contract
//!
//! Every [`StateProvider`] method must be safe under arbitrary concurrent
//! invocation. The in-memory implementation follows a reader-writer
//! discipline via [`tokio::sync::RwLock`]; `get_all` always returns a
//! defensive copy so callers can never observe a torn read or mutate the
//! provider's internal map through the returned value.

mod error;
mod memory;
mod traits;

pub use error::StateError;
pub use memory::InMemoryStateProvider;
pub use traits::StateProvider;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;

/// Lifecycle status of a single node within one execution.
///
/// Transitions follow `Pending -> Running -> {Completed, Failed}` or
/// `Pending -> Skipped`. Every node known to the graph has exactly one
/// status at any observation point (spec invariant I1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not yet scheduled; the default for every node at the start of an execution.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully; `NodeResult` is observable.
    Completed,
    /// Finished with an error; `NodeResult` is observable with `error` set.
    Failed,
    /// Never ran because no incoming edge condition permitted it, or because
    /// every dependency was itself failed or skipped.
    Skipped,
}

impl NodeStatus {
    /// A node may be depended upon only once it reports `Completed`.
    ///
    /// `Failed` and `Skipped` both fail this check, so a downstream node
    /// with a failed or skipped dependency is never considered ready
    /// (spec.md §4.8, resolved open question (b) in SPEC_FULL.md).
    pub fn is_completed(self) -> bool {
        matches!(self, NodeStatus::Completed)
    }

    /// True for any of the three statuses a node cannot leave once reached.
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped)
    }
}

impl Default for NodeStatus {
    fn default() -> Self {
        NodeStatus::Pending
    }
}

/// Output of one node's execution.
///
/// Observable (via [`StateProvider::get_node_result`]) iff the node's status
/// is `Completed` or `Failed` (spec invariant I2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    /// Opaque output value. Must be JSON-serializable when a persistent
    /// `StateProvider` is in use.
    pub output: Value,
    /// Present iff the node's executor returned an error.
    pub error: Option<String>,
    /// Measured wall-clock duration of the node's executor invocation.
    #[serde(with = "duration_as_millis")]
    pub duration: Duration,
    /// Free-form metadata attached by the executor (token usage hints,
    /// provider identifiers, etc. live here, not in `output`).
    pub metadata: HashMap<String, Value>,
}

impl NodeResult {
    /// Build a successful result with no metadata.
    pub fn success(output: Value, duration: Duration) -> Self {
        Self { output, error: None, duration, metadata: HashMap::new() }
    }

    /// Build a failed result; `output` is `Value::Null`.
    pub fn failure(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            output: Value::Null,
            error: Some(error.into()),
            duration,
            metadata: HashMap::new(),
        }
    }

    /// True iff the executor that produced this result did not return an error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

mod duration_as_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_is_not_completed() {
        assert!(!NodeStatus::Pending.is_completed());
        assert!(!NodeStatus::Pending.is_terminal());
    }

    #[test]
    fn failed_and_skipped_are_terminal_but_not_completed() {
        for status in [NodeStatus::Failed, NodeStatus::Skipped] {
            assert!(status.is_terminal());
            assert!(!status.is_completed());
        }
    }

    #[test]
    fn node_result_roundtrips_through_json() {
        let result = NodeResult::success(serde_json::json!({"a": 1}), Duration::from_millis(42))
            .with_metadata("provider", Value::String("mock".into()));
        let json = serde_json::to_string(&result).unwrap();
        let back: NodeResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.duration, Duration::from_millis(42));
        assert_eq!(back.metadata["provider"], Value::String("mock".into()));
    }
}
