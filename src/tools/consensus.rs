//! consensus — poll several models and judge semantic agreement.

use serde::Deserialize;
use serde_json::json;

use crate::subprotocol::judge::{judge_agreement, jaccard_partition};
use crate::subprotocol::select;
use crate::tools::{compare, format_latency, parse_args, ToolContext, ToolSpec};
use crate::{Backend, HydraError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConsensusInput {
    models: Vec<String>,
    prompt: String,
    #[serde(default)]
    strategy: Strategy,
    #[serde(default)]
    judge_model: Option<String>,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Strategy {
    #[default]
    Majority,
    Supermajority,
    Unanimous,
}

impl Strategy {
    fn label(self) -> &'static str {
        match self {
            Strategy::Majority => "majority",
            Strategy::Supermajority => "supermajority",
            Strategy::Unanimous => "unanimous",
        }
    }

    /// Required quorum among N successful responses.
    fn required(self, n: usize) -> usize {
        match self {
            Strategy::Majority => (n as f64 * 0.5).ceil() as usize,
            Strategy::Supermajority => (n as f64 * 0.66).ceil() as usize,
            Strategy::Unanimous => n,
        }
    }
}

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "consensus",
        description: "Poll 3-7 models and report whether they agree, using a judge model to \
detect semantic agreement.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "models": {"type": "array", "items": {"type": "string"},
                    "minItems": 3, "maxItems": 7},
                "prompt": {"type": "string"},
                "strategy": {"type": "string",
                    "enum": ["majority", "supermajority", "unanimous"],
                    "default": "majority"},
                "judge_model": {"type": "string"},
                "system_prompt": {"type": "string"},
                "temperature": {"type": "number", "minimum": 0, "maximum": 2},
                "max_tokens": {"type": "integer", "minimum": 1}
            },
            "required": ["models", "prompt"]
        }),
    }
}

pub async fn run(ctx: &ToolContext, args: serde_json::Value) -> Result<String> {
    let input: ConsensusInput = parse_args(args)?;
    if !(3..=7).contains(&input.models.len()) {
        return Err(HydraError::Validation(format!(
            "consensus takes 3-7 models, got {}",
            input.models.len()
        )));
    }
    let options =
        compare::build_options(input.system_prompt, input.temperature, input.max_tokens)?;
    let results = compare::fan_out(ctx, &input.models, &input.prompt, &options).await;

    let successes: Vec<(String, crate::QueryResponse)> = results
        .iter()
        .filter_map(|(model, r)| r.as_ref().ok().map(|resp| (model.clone(), resp.clone())))
        .collect();
    let failures: Vec<(&String, String)> = results
        .iter()
        .filter_map(|(model, r)| r.as_ref().err().map(|e| (model, e.to_string())))
        .collect();

    let n = successes.len();
    if n == 0 {
        return Err(HydraError::Routing {
            model: input.models.join(", "),
            detail: format!(
                "all {} polled models failed: {}",
                input.models.len(),
                failures
                    .iter()
                    .map(|(m, e)| format!("{m}: {e}"))
                    .collect::<Vec<_>>()
                    .join("; ")
            ),
        });
    }

    let contents: Vec<String> = successes.iter().map(|(_, r)| r.content.clone()).collect();
    let agreement = match resolve_judge(ctx, input.judge_model.as_deref()).await {
        Some(judge_model) => {
            judge_agreement(&ctx.smart, &judge_model, &input.prompt, &contents).await
        }
        None => jaccard_partition(&contents),
    };

    let required = input.strategy.required(n);
    let agreeing = agreement.agreeing();
    let reached = agreeing.len() >= required;
    let confidence = (agreeing.len() as f64 / n as f64 * 100.0).round() as u32;

    let mut out = format!(
        "# Consensus: {}\n\n",
        if reached { "REACHED" } else { "NOT REACHED" }
    );
    out.push_str(&format!(
        "**Strategy:** {} (required {required} of {n})\n",
        input.strategy.label()
    ));
    out.push_str(&format!(
        "**Agreement:** {}/{n} ({confidence}%)\n",
        agreeing.len()
    ));
    if agreement.heuristic {
        out.push_str("**Judge:** keyword-overlap heuristic (judge unavailable)\n");
    } else if !agreement.reasoning.is_empty() {
        out.push_str(&format!("**Judge reasoning:** {}\n", agreement.reasoning));
    }
    out.push('\n');

    if let Some(&first) = agreeing.iter().min() {
        let (model, response) = &successes[first];
        out.push_str(&format!(
            "## Consensus answer (from {model})\n\n{}\n\n",
            response.content
        ));
    }

    out.push_str("## Individual responses\n\n| Model | Position | Latency |\n|---|---|---|\n");
    for (i, (model, response)) in successes.iter().enumerate() {
        let position = if agreeing.contains(&i) {
            "agree"
        } else {
            "dissent"
        };
        out.push_str(&format!(
            "| {model} | {position} | {} |\n",
            format_latency(response.latency_ms)
        ));
    }
    for (model, _) in &failures {
        out.push_str(&format!("| {model} | failed | — |\n"));
    }
    out.push('\n');

    let dissenting = agreement.dissenting();
    if !dissenting.is_empty() {
        out.push_str("### Dissenting views\n\n");
        for &i in &dissenting {
            let (model, response) = &successes[i];
            out.push_str(&format!("- **{model}**: {}\n", snippet(&response.content)));
        }
        out.push('\n');
    }
    if !failures.is_empty() {
        out.push_str(&format!("_{} model(s) failed to respond._\n", failures.len()));
    }
    Ok(out)
}

/// Resolve the judge model: explicit choice, or a large-context default
/// from the live catalog. `None` drops straight to the keyword heuristic.
async fn resolve_judge(ctx: &ToolContext, requested: Option<&str>) -> Option<String> {
    if let Some(model) = requested {
        return Some(model.to_string());
    }
    let catalog = ctx.smart.list_models().await.ok()?;
    select::pick_judge(&catalog, None)
}

fn snippet(text: &str) -> String {
    const LIMIT: usize = 160;
    let trimmed = text.trim().replace('\n', " ");
    if trimmed.chars().count() <= LIMIT {
        trimmed
    } else {
        let cut: String = trimmed.chars().take(LIMIT).collect();
        format!("{cut}…")
    }
}
