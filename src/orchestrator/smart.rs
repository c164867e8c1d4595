//! SmartBackend — the composition point of the orchestration layer.
//!
//! Wraps any [`Backend`] with a circuit gate, response cache, model-list
//! cache, and metrics. Implements [`Backend`] itself, so nested
//! subprotocol calls (distiller, judge) pass through the same resilience
//! machinery as tool-level queries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::telemetry;
use crate::{Backend, HydraError, ModelInfo, QueryOptions, QueryResponse, Result};

use super::{
    CacheConfig, CircuitBreaker, MetricsRegistry, ModelListCache, ResponseCache,
};

/// Tuning for [`SmartBackend`]. Feature flags allow disabling the cache and
/// the circuit breaker independently.
#[derive(Debug, Clone)]
pub struct SmartConfig {
    pub max_failures: u32,
    pub cooldown: Duration,
    pub cache: CacheConfig,
    pub model_list_ttl: Duration,
    pub cache_enabled: bool,
    pub breaker_enabled: bool,
}

impl Default for SmartConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            cooldown: Duration::from_secs(60),
            cache: CacheConfig::default(),
            model_list_ttl: Duration::from_secs(30),
            cache_enabled: true,
            breaker_enabled: true,
        }
    }
}

impl SmartConfig {
    /// Derive orchestrator tuning from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_failures: config.max_failures,
            cooldown: config.cooldown,
            cache: CacheConfig::new()
                .max_entries(config.cache_max_entries)
                .ttl(config.cache_ttl),
            model_list_ttl: config.model_list_ttl,
            cache_enabled: true,
            breaker_enabled: true,
        }
    }

    /// Disable the response cache.
    pub fn without_cache(mut self) -> Self {
        self.cache_enabled = false;
        self
    }

    /// Disable the circuit breaker.
    pub fn without_breaker(mut self) -> Self {
        self.breaker_enabled = false;
        self
    }
}

/// Orchestrating backend: circuit gate → cache lookup → dispatch →
/// bookkeeping.
pub struct SmartBackend {
    inner: Arc<dyn Backend>,
    breaker: CircuitBreaker,
    cache: ResponseCache,
    catalog: ModelListCache,
    metrics: MetricsRegistry,
    cache_enabled: bool,
    breaker_enabled: bool,
}

impl SmartBackend {
    /// Wrap `inner` with default tuning.
    pub fn new(inner: Arc<dyn Backend>) -> Self {
        Self::with_config(inner, SmartConfig::default())
    }

    /// Wrap `inner` with explicit tuning.
    pub fn with_config(inner: Arc<dyn Backend>, config: SmartConfig) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(config.max_failures, config.cooldown),
            cache: ResponseCache::new(config.cache),
            catalog: ModelListCache::new(config.model_list_ttl),
            metrics: MetricsRegistry::new(),
            cache_enabled: config.cache_enabled,
            breaker_enabled: config.breaker_enabled,
        }
    }

    /// The metrics registry, for the tools layer.
    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// The circuit breaker, for catalog filtering and diagnostics.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl Backend for SmartBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }

    /// Aggregated catalog, cached briefly, always post-filtered so a model
    /// entering cooldown mid-cache-window disappears on the next call.
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let catalog = match self.catalog.get() {
            Some(catalog) => catalog,
            None => {
                let fresh = self.inner.list_models().await?;
                self.catalog.set(fresh.clone());
                fresh
            }
        };
        if !self.breaker_enabled {
            return Ok(catalog);
        }
        let open = self.breaker.open_models();
        Ok(catalog
            .into_iter()
            .filter(|m| !open.contains(&m.id))
            .collect())
    }

    #[instrument(skip(self, prompt, options), fields(model = %model))]
    async fn query(
        &self,
        model: &str,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<QueryResponse> {
        // 1. Circuit gate.
        if self.breaker_enabled && self.breaker.is_open(model) {
            let remaining = self.breaker.cooldown_remaining(model);
            self.metrics.record_failure(model);
            metrics::counter!(telemetry::CIRCUIT_REJECTIONS_TOTAL, "model" => model.to_owned())
                .increment(1);
            return Err(HydraError::Unavailable {
                model: model.to_string(),
                cooldown_remaining: remaining,
            });
        }

        // 2. Cache lookup.
        let key = ResponseCache::key(model, prompt, options);
        if self.cache_enabled {
            if let Some(mut cached) = self.cache.get(&key) {
                debug!(model, "cache hit");
                let tokens = cached.usage.map(|u| u.total_tokens as u64).unwrap_or(0);
                self.metrics.record_cache_hit(model, tokens);
                cached.latency_ms = 0;
                return Ok(cached);
            }
        }

        // 3. Dispatch.
        let started = std::time::Instant::now();
        match self.inner.query(model, prompt, options).await {
            Ok(mut response) => {
                // Zero latency is reserved for cache hits; a backend that
                // reports none gets the measured wall time, floored at 1ms.
                if response.latency_ms == 0 {
                    response.latency_ms = (started.elapsed().as_millis() as u64).max(1);
                }
                // 4. Bookkeeping before the caller observes the response.
                self.breaker.record_success(model);
                let tokens = response.usage.map(|u| u.total_tokens as u64).unwrap_or(0);
                self.metrics
                    .record_success(model, response.latency_ms, tokens);
                if self.cache_enabled {
                    self.cache.set(&key, response.clone());
                }
                Ok(response)
            }
            Err(e) => {
                // 5. Failure bookkeeping before the error surfaces.
                self.breaker.record_failure(model);
                self.metrics.record_failure(model);
                Err(e)
            }
        }
    }
}
