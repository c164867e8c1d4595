//! MultiBackend — routes a logical model ID across the backend roster.
//!
//! Backends are stored in registration order, which the entry point sets
//! deterministically (native API backends first, then subscription, then
//! local). A `provider/model` ID dispatches exclusively to the named
//! backend; a bare ID tries each backend in order and the first success
//! wins.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{instrument, warn};

use crate::config::FallbackChains;
use crate::{Backend, HydraError, ModelInfo, QueryOptions, QueryResponse, Result};

/// Hard cap on fallback-chain recursion.
const MAX_FALLBACK_DEPTH: u32 = 2;

/// Routing backend over a registry of `{provider_key → Backend}`.
pub struct MultiBackend {
    backends: Vec<(String, Arc<dyn Backend>)>,
    fallback_chains: FallbackChains,
}

impl MultiBackend {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
            fallback_chains: FallbackChains::new(),
        }
    }

    /// Register a backend under a provider key (appended to the roster;
    /// registration order is the bare-ID tie-break).
    pub fn register(mut self, provider_key: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        self.backends.push((provider_key.into(), backend));
        self
    }

    /// Configure fallback chains (`primary model → alternatives`).
    pub fn fallback_chains(mut self, chains: FallbackChains) -> Self {
        self.fallback_chains = chains;
        self
    }

    /// Registered provider keys, in registration order.
    pub fn provider_keys(&self) -> Vec<&str> {
        self.backends.iter().map(|(key, _)| key.as_str()).collect()
    }

    fn backend_for(&self, provider_key: &str) -> Option<&Arc<dyn Backend>> {
        self.backends
            .iter()
            .find(|(key, _)| key == provider_key)
            .map(|(_, backend)| backend)
    }

    /// Route one query without applying fallback chains.
    async fn route(
        &self,
        model: &str,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<QueryResponse> {
        // A '/' at a non-zero position splits provider_key from inner ID.
        if let Some((provider_key, inner)) = model.split_once('/') {
            if !provider_key.is_empty() {
                let backend = self.backend_for(provider_key).ok_or_else(|| {
                    HydraError::Routing {
                        model: model.to_string(),
                        detail: format!("unknown provider '{provider_key}'"),
                    }
                })?;
                return backend.query(inner, prompt, options).await;
            }
        }

        // Bare ID: first success in registration order wins.
        let mut errors = Vec::new();
        for (key, backend) in &self.backends {
            match backend.query(model, prompt, options).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(provider = %key, model, error = %e, "backend declined query");
                    errors.push(format!("{key}: {e}"));
                }
            }
        }
        Err(HydraError::Routing {
            model: model.to_string(),
            detail: if errors.is_empty() {
                "no backends registered".into()
            } else {
                errors.join("; ")
            },
        })
    }

    fn query_with_depth<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
        options: &'a QueryOptions,
        depth: u32,
    ) -> futures_util::future::BoxFuture<'a, Result<QueryResponse>> {
        Box::pin(async move {
            let primary_err = match self.route(model, prompt, options).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if depth >= MAX_FALLBACK_DEPTH {
                return Err(primary_err);
            }
            let Some(alternatives) = self.fallback_chains.get(model) else {
                return Err(primary_err);
            };

            for alternative in alternatives {
                warn!(
                    primary = model,
                    alternative = %alternative,
                    error = %primary_err,
                    "applying fallback chain"
                );
                match self
                    .query_with_depth(alternative, prompt, options, depth + 1)
                    .await
                {
                    Ok(mut response) => {
                        response.fallback_from = Some(model.to_string());
                        return Ok(response);
                    }
                    Err(_) => continue,
                }
            }
            Err(primary_err)
        })
    }
}

impl Default for MultiBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MultiBackend {
    fn name(&self) -> &str {
        "multi"
    }

    /// True iff any registered backend is healthy. Probes run concurrently.
    async fn health_check(&self) -> bool {
        let probes = self
            .backends
            .iter()
            .map(|(_, backend)| backend.health_check());
        join_all(probes).await.into_iter().any(|healthy| healthy)
    }

    /// Aggregate all catalogs concurrently. A failing backend's entries are
    /// omitted, not fatal. IDs come back prefixed with `provider_key/`.
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let listings = self
            .backends
            .iter()
            .map(|(key, backend)| async move { (key, backend.list_models().await) });
        let mut catalog = Vec::new();
        for (key, result) in join_all(listings).await {
            match result {
                Ok(models) => {
                    catalog.extend(models.into_iter().map(|mut m| {
                        m.provider = key.clone();
                        m.prefixed()
                    }));
                }
                Err(e) => warn!(provider = %key, error = %e, "catalog listing failed"),
            }
        }
        Ok(catalog)
    }

    #[instrument(skip(self, prompt, options), fields(model = %model))]
    async fn query(
        &self,
        model: &str,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<QueryResponse> {
        self.query_with_depth(model, prompt, options, 0).await
    }
}
