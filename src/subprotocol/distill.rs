//! Response distillation.
//!
//! Compresses a worker model's response to a token budget using a cheap
//! distiller model. Runs only when the response meaningfully exceeds the
//! budget (strictly more than 1.2×); any distiller failure returns the raw
//! response unchanged. The distiller's own call sets `max_tokens` directly
//! — there is no nested compression.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::orchestrator::SmartBackend;
use crate::{Backend, QueryOptions, QueryResponse};

use super::select;

/// Fixed system prompt for the distiller.
const DISTILLER_SYSTEM_PROMPT: &str = "You are a response distiller. Rewrite the response below \
to fit the token budget while preserving all file paths, identifiers, error messages, code \
blocks, URLs, commands, numbers, and step lists. Strip filler, hedging, and repetition. Do not \
add commentary.";

/// Responses up to this multiple of the budget are passed through.
const SKIP_BAND: f64 = 1.2;

/// Metadata about a completed compression, rendered by the tools layer.
#[derive(Debug, Clone)]
pub struct DistillStats {
    pub source_tokens: u32,
    pub distilled_tokens: u32,
    pub distiller_model: String,
    pub distiller_latency_ms: u64,
}

impl DistillStats {
    /// Percentage of tokens removed by the compression.
    pub fn savings_pct(&self) -> u32 {
        if self.source_tokens == 0 {
            return 0;
        }
        let saved = self.source_tokens.saturating_sub(self.distilled_tokens);
        (saved * 100) / self.source_tokens
    }
}

/// Outcome of a distillation attempt.
#[derive(Debug, Clone)]
pub enum Distilled {
    /// Response was within the skip band; returned unchanged.
    Skipped(QueryResponse),
    /// Compression ran; contains the compressed response and stats.
    Compressed(QueryResponse, DistillStats),
}

impl Distilled {
    /// The response to emit, compressed or not.
    pub fn response(&self) -> &QueryResponse {
        match self {
            Distilled::Skipped(r) => r,
            Distilled::Compressed(r, _) => r,
        }
    }

    pub fn stats(&self) -> Option<&DistillStats> {
        match self {
            Distilled::Skipped(_) => None,
            Distilled::Compressed(_, stats) => Some(stats),
        }
    }
}

/// Distill `response` down to `budget` tokens.
///
/// Skips when `observed_tokens <= 1.2 * budget` (the boundary is strict
/// `>`), when no distiller besides the worker is available, or when the
/// distiller call fails.
pub async fn distill(
    smart: &Arc<SmartBackend>,
    worker_model: &str,
    response: QueryResponse,
    budget: u32,
) -> Distilled {
    let observed = response.observed_completion_tokens();
    if observed as f64 <= budget as f64 * SKIP_BAND {
        debug!(observed, budget, "distillation skipped: within budget band");
        return Distilled::Skipped(response);
    }

    let catalog = match smart.list_models().await {
        Ok(catalog) => catalog,
        Err(e) => {
            warn!(error = %e, "distillation skipped: catalog unavailable");
            return Distilled::Skipped(response);
        }
    };
    let Some(distiller) = select::pick_distiller(&catalog, worker_model) else {
        warn!(worker_model, "distillation skipped: no eligible distiller");
        return Distilled::Skipped(response);
    };

    let prompt = format!(
        "Token budget: {budget}\n\nResponse to distill:\n\n{}",
        response.content
    );
    let options = QueryOptions::default()
        .system_prompt(DISTILLER_SYSTEM_PROMPT)
        .temperature(0.0)
        .max_tokens(budget);

    match smart.query(&distiller, &prompt, &options).await {
        Ok(distilled) => {
            let stats = DistillStats {
                source_tokens: observed,
                distilled_tokens: distilled.observed_completion_tokens(),
                distiller_model: distiller,
                distiller_latency_ms: distilled.latency_ms,
            };
            let compressed = QueryResponse {
                content: distilled.content,
                ..response
            };
            Distilled::Compressed(compressed, stats)
        }
        Err(e) => {
            warn!(distiller = %distiller, error = %e, "distiller failed; returning raw response");
            Distilled::Skipped(response)
        }
    }
}
