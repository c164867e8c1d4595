//! Core Backend trait
//!
//! Every vendor connector implements this three-operation contract. Backends
//! carry no cross-cutting policy — caching, circuit breaking, and global
//! metrics live in the orchestration layer above. A backend may internally
//! retry idempotent transport errors.

use async_trait::async_trait;

use crate::{ModelInfo, QueryOptions, QueryResponse, Result};

/// Uniform contract for one family of models.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend name for logging/debugging (matches the registry key).
    fn name(&self) -> &str;

    /// Connectivity and authentication probe. Fails closed: any error
    /// yields `false`.
    async fn health_check(&self) -> bool;

    /// Catalog the backend currently serves. May be empty.
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Perform one query. `latency_ms` on the response is wall time from
    /// send to received body.
    async fn query(
        &self,
        model: &str,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<QueryResponse>;
}
