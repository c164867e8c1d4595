//! Tool handlers: the high-level semantics exposed to the calling agent.
//!
//! Every handler validates its input against a declared schema, runs one
//! or more orchestrated queries, and emits a single human-readable
//! markdown string. Handlers catch their own errors and return a
//! tool-level error envelope — a domain failure never surfaces as a
//! protocol-level fault.

mod analyze;
mod ask;
mod catalog;
mod compare;
mod consensus;
mod recap;
mod synthesize;

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::orchestrator::SmartBackend;
use crate::session::SessionReader;
use crate::telemetry;
use crate::{HydraError, Result};

/// Shared state handed to every tool invocation.
pub struct ToolContext {
    pub smart: Arc<SmartBackend>,
    pub sessions: Option<SessionReader>,
}

/// The single `text` payload a tool call produces.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    fn ok(text: String) -> Self {
        Self {
            text,
            is_error: false,
        }
    }

    fn error(e: &HydraError) -> Self {
        Self {
            text: format!("**Error:** {e}\n\n**Recovery:** {}", e.recovery_hint()),
            is_error: true,
        }
    }
}

/// Declared surface of one tool, rendered into `tools/list`.
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// All registered tools, in presentation order.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        catalog::spec(),
        ask::spec(),
        compare::spec(),
        consensus::spec(),
        synthesize::spec(),
        analyze::analyze_spec(),
        analyze::smart_read_spec(),
        recap::spec(),
    ]
}

/// Dispatch one tool call. Unknown tool names are the only validation
/// failure reported here; everything else is the handler's own business.
pub async fn dispatch(ctx: &ToolContext, name: &str, args: Value) -> ToolOutput {
    let result = match name {
        "list_models" => catalog::run(ctx, args).await,
        "ask_model" => ask::run(ctx, args).await,
        "compare_models" => compare::run(ctx, args).await,
        "consensus" => consensus::run(ctx, args).await,
        "synthesize" => synthesize::run(ctx, args).await,
        "analyze_file" => analyze::run_analyze(ctx, args).await,
        "smart_read" => analyze::run_smart_read(ctx, args).await,
        "session_recap" => recap::run(ctx, args).await,
        _ => Err(HydraError::Validation(format!("unknown tool '{name}'"))),
    };
    match result {
        Ok(text) => {
            info!(tool = name, "tool call completed");
            metrics::counter!(telemetry::TOOL_CALLS_TOTAL,
                "tool" => name.to_owned(), "status" => "ok")
            .increment(1);
            ToolOutput::ok(text)
        }
        Err(e) => {
            warn!(tool = name, error = %e, "tool call failed");
            metrics::counter!(telemetry::TOOL_CALLS_TOTAL,
                "tool" => name.to_owned(), "status" => "error")
            .increment(1);
            ToolOutput::error(&e)
        }
    }
}

/// Deserialize tool arguments, mapping any shape mismatch to a
/// [`HydraError::Validation`] surfaced verbatim to the caller.
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| HydraError::Validation(e.to_string()))
}

/// Render a latency figure; zero is always a cache hit.
pub(crate) fn format_latency(latency_ms: u64) -> String {
    if latency_ms == 0 {
        "0ms (cached)".to_string()
    } else {
        format!("{latency_ms}ms")
    }
}

/// Render a token count, or a dash when the backend reported none.
pub(crate) fn format_tokens(usage: Option<crate::Usage>) -> String {
    match usage {
        Some(u) => u.total_tokens.to_string(),
        None => "—".to_string(),
    }
}
