//! LLM client contract consumed by node executors (spec.md §6).
//!
//! Provider wire protocols (OpenAI, Anthropic, Ollama, ...) are explicitly
//! out of scope (spec.md §1); this module defines only the narrow interface
//! the graph passes through [`crate::node::NodeInput`] and the shape of the
//! usage data nodes report back into the [`crate::overview::Overview`].

use crate::observability::Observer;
use crate::overview::{MediaUsage, TokenUsage};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// What an [`LlmClient`] call returns: an opaque output payload plus the
/// usage the caller should fold into the execution's [`crate::overview::Overview`].
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub output: Value,
    pub usage: Option<TokenUsage>,
    pub media: Option<MediaUsage>,
}

/// An opaque LLM client handle, threaded through `NodeInput` (node-local
/// override or graph default). The graph executor never calls this itself —
/// only node executors do — but it resolves the effective client (node vs.
/// graph default) before building `NodeInput`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Issue one request; `request` is an opaque, provider-specific payload.
    async fn complete(
        &self,
        request: Value,
    ) -> Result<LlmResponse, Box<dyn std::error::Error + Send + Sync>>;

    /// Clients may carry their own observability hookup; the executor
    /// resolves it here when the caller didn't configure one explicitly.
    fn observer(&self) -> Option<Arc<dyn Observer>> {
        None
    }
}
