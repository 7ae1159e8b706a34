//! The [`StateProvider`] contract: shared key/value state plus per-node
//! status and result tracking, all safe under arbitrary concurrent access.

use crate::{NodeResult, NodeStatus, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Pluggable shared-state and per-node bookkeeping store.
///
/// Implementations must be safe under arbitrary concurrent invocation across
/// tasks; a reader-writer discipline is sufficient (spec.md §4.3). Every
/// method is async to leave room for durable backends that hit a network or
/// disk.
///
/// `get_node_status` for an id the provider has never seen returns
/// `NodeStatus::Pending` rather than an error — nodes are only known to the
/// provider once the executor has initialized them, and "unknown" and
/// "not yet started" are observationally the same thing from the outside.
#[async_trait]
pub trait StateProvider: Send + Sync {
    /// Look up a shared-state value. `Ok(None)` means the key was never set.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Set (or overwrite) a shared-state value.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// A defensive copy of the entire shared-state mapping. Mutating the
    /// returned map must never affect the provider's internal state.
    async fn get_all(&self) -> Result<HashMap<String, Value>>;

    /// Current status of a node; `Pending` if the node is unknown.
    async fn get_node_status(&self, node_id: &str) -> Result<NodeStatus>;

    /// Record a node's status transition.
    async fn set_node_status(&self, node_id: &str, status: NodeStatus) -> Result<()>;

    /// The node's result, if it has completed or failed. `None` for any
    /// other status, including for unknown node ids.
    async fn get_node_result(&self, node_id: &str) -> Result<Option<NodeResult>>;

    /// Persist a node's result.
    async fn set_node_result(&self, node_id: &str, result: NodeResult) -> Result<()>;
}
