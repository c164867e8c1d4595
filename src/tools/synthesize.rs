//! synthesize — merge several models' answers into one unified response.

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::subprotocol::select;
use crate::tools::{compare, format_latency, parse_args, ToolContext, ToolSpec};
use crate::{Backend, HydraError, QueryOptions, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SynthesizeInput {
    models: Vec<String>,
    prompt: String,
    #[serde(default)]
    synthesizer_model: Option<String>,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    max_tokens: Option<u32>,
}

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "synthesize",
        description: "Ask 2-5 models the same question and merge their answers into one \
unified response via a synthesizer model.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "models": {"type": "array", "items": {"type": "string"},
                    "minItems": 2, "maxItems": 5},
                "prompt": {"type": "string"},
                "synthesizer_model": {"type": "string"},
                "system_prompt": {"type": "string"},
                "temperature": {"type": "number", "minimum": 0, "maximum": 2},
                "max_tokens": {"type": "integer", "minimum": 1}
            },
            "required": ["models", "prompt"]
        }),
    }
}

pub async fn run(ctx: &ToolContext, args: serde_json::Value) -> Result<String> {
    let input: SynthesizeInput = parse_args(args)?;
    if !(2..=5).contains(&input.models.len()) {
        return Err(HydraError::Validation(format!(
            "synthesize takes 2-5 models, got {}",
            input.models.len()
        )));
    }
    let options = compare::build_options(
        input.system_prompt.clone(),
        input.temperature,
        input.max_tokens,
    )?;
    let results = compare::fan_out(ctx, &input.models, &input.prompt, &options).await;

    let successes: Vec<(&String, &crate::QueryResponse)> = results
        .iter()
        .filter_map(|(model, r)| r.as_ref().ok().map(|resp| (model, resp)))
        .collect();
    let failures: Vec<(&String, String)> = results
        .iter()
        .filter_map(|(model, r)| r.as_ref().err().map(|e| (model, e.to_string())))
        .collect();

    if successes.len() < 2 {
        let mut out = String::from("## Synthesis failed\n\nFewer than two source responses succeeded.\n\n");
        out.push_str("### Errors\n\n");
        for (model, e) in &failures {
            out.push_str(&format!("- **{model}**: {e}\n"));
        }
        if let Some((model, response)) = successes.first() {
            out.push_str(&format!(
                "\n### Only response (from {model})\n\n{}\n",
                response.content
            ));
        }
        return Ok(out);
    }

    let catalog = ctx.smart.list_models().await.unwrap_or_default();
    let sources: Vec<String> = successes.iter().map(|(m, _)| (*m).clone()).collect();
    let Some(synthesizer) =
        select::pick_synthesizer(&catalog, &sources, input.synthesizer_model.as_deref())
    else {
        // Nothing left in the catalog to synthesize with.
        return Ok(compare::render_comparison(&results));
    };

    let mut synthesis_prompt = format!(
        "Multiple models answered the question below. Write a single unified answer that is \
shorter than the combined responses, keeps every correct and useful point, and resolves \
disagreements. Do not reference the individual models or that multiple answers existed.\n\n\
Question: {}\n\n",
        input.prompt
    );
    for (model, response) in &successes {
        synthesis_prompt.push_str(&format!("--- Answer from {model} ---\n{}\n\n", response.content));
    }

    let synth_options = QueryOptions::default()
        .max_tokens(input.max_tokens.unwrap_or(1024))
        .temperature(0.3);
    match ctx
        .smart
        .query(&synthesizer, &synthesis_prompt, &synth_options)
        .await
    {
        Ok(synthesis) => {
            let mut out = format!("# Synthesis (by {synthesizer})\n\n{}\n\n---\n", synthesis.content);
            out.push_str(&format!(
                "- Sources: {}\n- Synthesizer latency: {}\n",
                sources.join(", "),
                format_latency(synthesis.latency_ms),
            ));
            if !failures.is_empty() {
                out.push_str("\n### Errors\n\n");
                for (model, e) in &failures {
                    out.push_str(&format!("- **{model}**: {e}\n"));
                }
            }
            Ok(out)
        }
        Err(e) => {
            warn!(synthesizer = %synthesizer, error = %e, "synthesizer failed; rendering comparison");
            let mut out = format!(
                "> Synthesizer {synthesizer} failed ({e}); showing individual responses.\n\n"
            );
            out.push_str(&compare::render_comparison(&results));
            Ok(out)
        }
    }
}
