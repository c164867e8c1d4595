//! Per-model and session metrics.
//!
//! Append-only within the process lifetime; no decay. The in-process
//! registry is queryable by the tools layer; `metrics` facade counters are
//! emitted alongside for operators who install a recorder.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::telemetry;

/// Accumulated statistics for one model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelStats {
    pub queries: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_latency_ms: u64,
    pub total_tokens: u64,
    /// Unix-epoch milliseconds of the most recent query.
    pub last_query_ms: u64,
}

impl ModelStats {
    /// Mean latency over all queries, zero when none recorded.
    pub fn avg_latency_ms(&self) -> u64 {
        if self.queries == 0 {
            0
        } else {
            self.total_latency_ms / self.queries
        }
    }

    /// Fraction of queries that succeeded; 1.0 when none recorded.
    pub fn success_rate(&self) -> f64 {
        if self.queries == 0 {
            1.0
        } else {
            self.successes as f64 / self.queries as f64
        }
    }
}

/// Session-level totals.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionSummary {
    pub total_queries: u64,
    pub total_failures: u64,
    pub cache_hits: u64,
    pub cache_tokens_saved: u64,
}

/// In-memory metrics registry owned by the orchestrator.
#[derive(Default)]
pub struct MetricsRegistry {
    per_model: RwLock<HashMap<String, ModelStats>>,
    session: RwLock<SessionSummary>,
}

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful query.
    pub fn record_success(&self, model: &str, latency_ms: u64, tokens: u64) {
        {
            let mut per_model = self.per_model.write().expect("metrics lock poisoned");
            let stats = per_model.entry(model.to_string()).or_default();
            stats.queries += 1;
            stats.successes += 1;
            stats.total_latency_ms += latency_ms;
            stats.total_tokens += tokens;
            stats.last_query_ms = now_epoch_ms();
        }
        {
            let mut session = self.session.write().expect("metrics lock poisoned");
            session.total_queries += 1;
        }
        metrics::counter!(telemetry::QUERIES_TOTAL,
            "model" => model.to_owned(), "status" => "ok")
        .increment(1);
        metrics::histogram!(telemetry::QUERY_DURATION_SECONDS, "model" => model.to_owned())
            .record(latency_ms as f64 / 1000.0);
        metrics::counter!(telemetry::TOKENS_TOTAL, "model" => model.to_owned()).increment(tokens);
    }

    /// Record a failed query.
    pub fn record_failure(&self, model: &str) {
        {
            let mut per_model = self.per_model.write().expect("metrics lock poisoned");
            let stats = per_model.entry(model.to_string()).or_default();
            stats.queries += 1;
            stats.failures += 1;
            stats.last_query_ms = now_epoch_ms();
        }
        {
            let mut session = self.session.write().expect("metrics lock poisoned");
            session.total_queries += 1;
            session.total_failures += 1;
        }
        metrics::counter!(telemetry::QUERIES_TOTAL,
            "model" => model.to_owned(), "status" => "error")
        .increment(1);
    }

    /// Record a response served from cache: a zero-latency success plus
    /// the session-level savings counters.
    pub fn record_cache_hit(&self, model: &str, tokens_saved: u64) {
        self.record_success(model, 0, tokens_saved);
        {
            let mut session = self.session.write().expect("metrics lock poisoned");
            session.cache_hits += 1;
            session.cache_tokens_saved += tokens_saved;
        }
        metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
        metrics::counter!(telemetry::CACHE_TOKENS_SAVED_TOTAL).increment(tokens_saved);
    }

    /// Stats for one model, if any were recorded.
    pub fn model_stats(&self, model: &str) -> Option<ModelStats> {
        self.per_model
            .read()
            .expect("metrics lock poisoned")
            .get(model)
            .copied()
    }

    /// Snapshot of all per-model stats.
    pub fn snapshot(&self) -> Vec<(String, ModelStats)> {
        self.per_model
            .read()
            .expect("metrics lock poisoned")
            .iter()
            .map(|(id, stats)| (id.clone(), *stats))
            .collect()
    }

    /// Session-level totals.
    pub fn session_summary(&self) -> SessionSummary {
        *self.session.read().expect("metrics lock poisoned")
    }
}
