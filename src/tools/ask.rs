//! ask_model — one query to one model, optionally distilled.

use serde::Deserialize;
use serde_json::json;

use crate::subprotocol::distill::{distill, Distilled};
use crate::tools::{format_latency, format_tokens, parse_args, ToolContext, ToolSpec};
use crate::{Backend, HydraError, QueryOptions, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AskInput {
    model: String,
    prompt: String,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default)]
    max_response_tokens: Option<u32>,
    #[serde(default)]
    format: Format,
    #[serde(default)]
    include_raw: bool,
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Format {
    Brief,
    #[default]
    Detailed,
}

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "ask_model",
        description: "Ask a single model one question and return its answer.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "model": {"type": "string", "description": "Model ID, optionally provider-prefixed (e.g. openai/gpt-4o)"},
                "prompt": {"type": "string"},
                "system_prompt": {"type": "string"},
                "temperature": {"type": "number", "minimum": 0, "maximum": 2},
                "max_tokens": {"type": "integer", "minimum": 1, "default": 1024},
                "max_response_tokens": {"type": "integer", "minimum": 1,
                    "description": "Distill the response down to this many tokens"},
                "format": {"type": "string", "enum": ["brief", "detailed"], "default": "detailed"},
                "include_raw": {"type": "boolean", "default": false}
            },
            "required": ["model", "prompt"]
        }),
    }
}

pub async fn run(ctx: &ToolContext, args: serde_json::Value) -> Result<String> {
    let input: AskInput = parse_args(args)?;
    if input.prompt.trim().is_empty() {
        return Err(HydraError::Validation("prompt must not be empty".into()));
    }
    if input.max_response_tokens == Some(0) {
        return Err(HydraError::Validation(
            "max_response_tokens must be at least 1".into(),
        ));
    }

    let mut options = QueryOptions::default().max_tokens(input.max_tokens);
    if let Some(system) = &input.system_prompt {
        options = options.system_prompt(system.clone());
    }
    if let Some(t) = input.temperature {
        options = options.temperature(t);
    }
    options.validate()?;

    let response = ctx.smart.query(&input.model, &input.prompt, &options).await?;

    // include_raw shows the pre-distillation text, so snapshot it before
    // compression consumes the response.
    let raw_snapshot = input.include_raw.then(|| response.content.clone());
    let distilled = match input.max_response_tokens {
        Some(budget) => distill(&ctx.smart, &input.model, response, budget).await,
        None => Distilled::Skipped(response),
    };
    let raw_content = match &distilled {
        Distilled::Compressed(..) => raw_snapshot,
        Distilled::Skipped(_) => None,
    };
    let response = distilled.response();

    let mut out = String::new();
    match input.format {
        Format::Brief => {
            out.push_str(&response.content);
            out.push_str(&format!(
                "\n\n_{} · Latency: {} · Tokens: {}_\n",
                response.model,
                format_latency(response.latency_ms),
                format_tokens(response.usage),
            ));
        }
        Format::Detailed => {
            out.push_str(&format!("## Response from {}\n\n", response.model));
            if let Some(from) = &response.fallback_from {
                out.push_str(&format!("> Fallback: originally routed to `{from}`\n\n"));
            }
            if let Some(warning) = &response.warning {
                out.push_str(&format!("> Warning: {warning}\n\n"));
            }
            out.push_str(&response.content);
            out.push_str("\n\n---\n");
            out.push_str(&format!(
                "- Latency: {}\n- Tokens: {}\n",
                format_latency(response.latency_ms),
                format_tokens(response.usage),
            ));
        }
    }

    if let Some(stats) = distilled.stats() {
        out.push_str(&format!(
            "\n### Distillation\n\n- Source tokens: {}\n- Distilled tokens: {}\n- Distiller: {} ({}ms)\n- Saved: {}%\n",
            stats.source_tokens,
            stats.distilled_tokens,
            stats.distiller_model,
            stats.distiller_latency_ms,
            stats.savings_pct(),
        ));
    }
    if let Some(raw) = raw_content {
        out.push_str(&format!(
            "\n<details>\n<summary>Raw response</summary>\n\n{raw}\n\n</details>\n"
        ));
    }
    Ok(out)
}
