//! Telemetry metric name constants.
//!
//! Centralised metric names for hydra operations. Consumers install their
//! own `metrics` recorder; without a recorder installed, all metric calls
//! are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `hydra_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `model` — routed model ID
//! - `provider` — registry key (e.g. "openai", "ollama")
//! - `status` — outcome: "ok" or "error"
//! - `tool` — tool name for handler-level metrics

/// Total queries dispatched through the orchestrator.
///
/// Labels: `model`, `status` ("ok" | "error").
pub const QUERIES_TOTAL: &str = "hydra_queries_total";

/// Query duration in seconds.
///
/// Labels: `model`.
pub const QUERY_DURATION_SECONDS: &str = "hydra_query_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `provider`.
pub const RETRIES_TOTAL: &str = "hydra_retries_total";

/// Total tokens consumed.
///
/// Labels: `model`.
pub const TOKENS_TOTAL: &str = "hydra_tokens_total";

/// Total response-cache hits.
pub const CACHE_HITS_TOTAL: &str = "hydra_cache_hits_total";

/// Total tokens saved by serving completions from cache.
pub const CACHE_TOKENS_SAVED_TOTAL: &str = "hydra_cache_tokens_saved_total";

/// Total circuit-breaker rejections.
///
/// Labels: `model`.
pub const CIRCUIT_REJECTIONS_TOTAL: &str = "hydra_circuit_rejections_total";

/// Total tool invocations.
///
/// Labels: `tool`, `status` ("ok" | "error").
pub const TOOL_CALLS_TOTAL: &str = "hydra_tool_calls_total";
