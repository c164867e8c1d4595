//! compare_models — fan the same prompt out to several models side by side.

use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::json;

use crate::tools::{format_latency, format_tokens, parse_args, ToolContext, ToolSpec};
use crate::{Backend, HydraError, QueryOptions, QueryResponse, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CompareInput {
    models: Vec<String>,
    prompt: String,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    max_tokens: Option<u32>,
}

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "compare_models",
        description: "Send the same prompt to 2-5 models concurrently and compare their answers.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "models": {"type": "array", "items": {"type": "string"},
                    "minItems": 2, "maxItems": 5},
                "prompt": {"type": "string"},
                "system_prompt": {"type": "string"},
                "temperature": {"type": "number", "minimum": 0, "maximum": 2},
                "max_tokens": {"type": "integer", "minimum": 1}
            },
            "required": ["models", "prompt"]
        }),
    }
}

/// Fan `prompt` out to every model, settled: each branch resolves
/// independently and sibling failures never cancel survivors.
pub(crate) async fn fan_out(
    ctx: &ToolContext,
    models: &[String],
    prompt: &str,
    options: &QueryOptions,
) -> Vec<(String, Result<QueryResponse>)> {
    let branches = models.iter().map(|model| {
        let smart = ctx.smart.clone();
        let model = model.clone();
        let prompt = prompt.to_string();
        let options = options.clone();
        async move {
            let result = smart.query(&model, &prompt, &options).await;
            (model, result)
        }
    });
    join_all(branches).await
}

pub(crate) fn build_options(
    system_prompt: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
) -> Result<QueryOptions> {
    let mut options = QueryOptions::default();
    if let Some(system) = system_prompt {
        options = options.system_prompt(system);
    }
    if let Some(t) = temperature {
        options = options.temperature(t);
    }
    if let Some(m) = max_tokens {
        options = options.max_tokens(m);
    }
    options.validate()?;
    Ok(options)
}

/// Render results in the compare layout: summary table, response blocks,
/// errors section. Shared with the synthesize tool's fallback path.
pub(crate) fn render_comparison(results: &[(String, Result<QueryResponse>)]) -> String {
    let successes: Vec<(&String, &QueryResponse)> = results
        .iter()
        .filter_map(|(model, r)| r.as_ref().ok().map(|resp| (model, resp)))
        .collect();
    let failures: Vec<(&String, &HydraError)> = results
        .iter()
        .filter_map(|(model, r)| r.as_ref().err().map(|e| (model, e)))
        .collect();

    let fastest = successes
        .iter()
        .min_by_key(|(_, resp)| resp.latency_ms)
        .map(|(model, _)| model.as_str());

    let mut out = String::from("# Model comparison\n\n");
    if !successes.is_empty() {
        out.push_str("| Model | Latency | Tokens |\n|---|---|---|\n");
        for (model, resp) in &successes {
            let tag = if Some(model.as_str()) == fastest {
                " (fastest)"
            } else {
                ""
            };
            out.push_str(&format!(
                "| {model}{tag} | {} | {} |\n",
                format_latency(resp.latency_ms),
                format_tokens(resp.usage),
            ));
        }
        out.push('\n');
        for (model, resp) in &successes {
            out.push_str(&format!("## {model}\n\n{}\n\n", resp.content));
        }
    }
    if !failures.is_empty() {
        out.push_str("### Errors\n\n");
        for (model, e) in &failures {
            out.push_str(&format!("- **{model}**: {e}\n"));
        }
    }
    out
}

pub async fn run(ctx: &ToolContext, args: serde_json::Value) -> Result<String> {
    let input: CompareInput = parse_args(args)?;
    if !(2..=5).contains(&input.models.len()) {
        return Err(HydraError::Validation(format!(
            "compare_models takes 2-5 models, got {}",
            input.models.len()
        )));
    }
    let options = build_options(input.system_prompt, input.temperature, input.max_tokens)?;
    let results = fan_out(ctx, &input.models, &input.prompt, &options).await;
    Ok(render_comparison(&results))
}
