//! In-memory reference implementation of [`StateProvider`].
//!
//! Backed by `Arc<RwLock<HashMap<...>>>`, matching the reader-writer
//! discipline the trait's contract requires. This is the only
//! implementation this crate ships; durable backends (Postgres, Redis, a
//! checkpoint log) are expected to implement the same eight methods.

use crate::{NodeResult, NodeStatus, Result, StateProvider};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default, non-durable [`StateProvider`].
///
/// Setting a node's status to [`NodeStatus::Pending`] clears any previously
/// stored result for that node as an atomic side effect of the write lock
/// acquisition below — this is how the "reset a node back to pending" need
/// (spec.md §4.3's private `resetNodeState`) is satisfied without adding a
/// ninth method to the public contract: callers only ever need
/// `set_node_status(id, Pending)` to both revert status and make any stale
/// result unobservable again (spec invariant I2).
#[derive(Debug, Default)]
pub struct InMemoryStateProvider {
    shared: RwLock<HashMap<String, Value>>,
    statuses: RwLock<HashMap<String, NodeStatus>>,
    results: RwLock<HashMap<String, NodeResult>>,
}

impl InMemoryStateProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl StateProvider for InMemoryStateProvider {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.shared.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.shared.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        Ok(self.shared.read().await.clone())
    }

    async fn get_node_status(&self, node_id: &str) -> Result<NodeStatus> {
        Ok(self.statuses.read().await.get(node_id).copied().unwrap_or_default())
    }

    async fn set_node_status(&self, node_id: &str, status: NodeStatus) -> Result<()> {
        self.statuses.write().await.insert(node_id.to_string(), status);
        if matches!(status, NodeStatus::Pending) {
            self.results.write().await.remove(node_id);
        }
        Ok(())
    }

    async fn get_node_result(&self, node_id: &str) -> Result<Option<NodeResult>> {
        Ok(self.results.read().await.get(node_id).cloned())
    }

    async fn set_node_result(&self, node_id: &str, result: NodeResult) -> Result<()> {
        self.results.write().await.insert(node_id.to_string(), result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn shared_state_round_trips() {
        let provider = InMemoryStateProvider::new();
        assert_eq!(provider.get("missing").await.unwrap(), None);

        provider.set("quality", Value::from(0.9)).await.unwrap();
        assert_eq!(provider.get("quality").await.unwrap(), Some(Value::from(0.9)));

        let all = provider.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn get_all_is_a_defensive_copy() {
        let provider = InMemoryStateProvider::new();
        provider.set("a", Value::from(1)).await.unwrap();

        let mut snapshot = provider.get_all().await.unwrap();
        snapshot.insert("b".into(), Value::from(2));

        assert_eq!(provider.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_node_defaults_to_pending() {
        let provider = InMemoryStateProvider::new();
        assert_eq!(provider.get_node_status("ghost").await.unwrap(), NodeStatus::Pending);
        assert!(provider.get_node_result("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resetting_to_pending_clears_the_result() {
        let provider = InMemoryStateProvider::new();
        provider.set_node_status("n1", NodeStatus::Completed).await.unwrap();
        provider
            .set_node_result("n1", NodeResult::success(Value::from("done"), Duration::from_millis(5)))
            .await
            .unwrap();
        assert!(provider.get_node_result("n1").await.unwrap().is_some());

        provider.set_node_status("n1", NodeStatus::Pending).await.unwrap();
        assert!(provider.get_node_result("n1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_lose_updates() {
        let provider = Arc::new(InMemoryStateProvider::new());
        let mut handles = Vec::new();
        for i in 0..50 {
            let provider = provider.clone();
            handles.push(tokio::spawn(async move {
                provider.set(&format!("k{i}"), Value::from(i)).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(provider.get_all().await.unwrap().len(), 50);
    }
}
