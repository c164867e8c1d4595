//! session_recap — two-pass summarization of recent coding sessions.
//!
//! Pass 1 (triage) asks a large-context model for a JSON inventory of
//! meaningful events; pass 2 writes the recap under a token budget scaled
//! by event density and session count. Each pass degrades independently:
//! triage failure yields an empty triage, recap failure yields a
//! triage-only fallback, and both failing yields a recovery message.

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::session::SessionTranscript;
use crate::subprotocol::select;
use crate::tools::{parse_args, ToolContext, ToolSpec};
use crate::util::json_extract::first_json_object;
use crate::{Backend, HydraError, QueryOptions, Result};

/// Recap budget bounds, in tokens.
const BUDGET_MIN: u32 = 1_000;
const BUDGET_MAX: u32 = 30_000;
/// Every section keeps at least this share of the budget.
const SECTION_FLOOR: f64 = 0.10;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecapInput {
    #[serde(default = "default_sessions")]
    sessions: usize,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    focus: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    max_summary_tokens: Option<u32>,
}

fn default_sessions() -> usize {
    3
}

/// Pass-1 triage counts. Missing fields parse as zero.
#[derive(Debug, Default, Clone, Deserialize)]
struct Triage {
    #[serde(default)]
    files_modified: u32,
    #[serde(default)]
    decisions_made: u32,
    #[serde(default)]
    errors_resolved: u32,
    #[serde(default)]
    features_built: u32,
    #[serde(default)]
    unfinished_work: u32,
    #[serde(default)]
    total_meaningful_events: u32,
}

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "session_recap",
        description: "Summarize the most recent coding sessions for a project from their \
on-disk transcripts.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "sessions": {"type": "integer", "minimum": 1, "maximum": 10, "default": 3},
                "project": {"type": "string",
                    "description": "Project name; auto-detected from history when omitted"},
                "focus": {"type": "string", "description": "Aspect to emphasize"},
                "model": {"type": "string"},
                "max_summary_tokens": {"type": "integer", "minimum": 1}
            }
        }),
    }
}

pub async fn run(ctx: &ToolContext, args: serde_json::Value) -> Result<String> {
    let input: RecapInput = parse_args(args)?;
    if !(1..=10).contains(&input.sessions) {
        return Err(HydraError::Validation(format!(
            "sessions must be 1-10, got {}",
            input.sessions
        )));
    }
    let reader = ctx.sessions.as_ref().ok_or_else(|| {
        HydraError::Configuration("no session transcript directory configured".into())
    })?;
    let transcripts = reader.read_sessions(input.project.as_deref(), input.sessions)?;
    if transcripts.is_empty() {
        return Ok("## No sessions found\n\nThere are no transcripts to recap for this \
project yet.\n"
            .to_string());
    }

    let combined = combine(&transcripts);
    let input_tokens = combined.chars().count().div_ceil(4) as u32;

    let catalog = ctx.smart.list_models().await.unwrap_or_default();
    let model = select::pick_large_context(&catalog, input.model.as_deref()).ok_or_else(|| {
        HydraError::Routing {
            model: "(large-context)".into(),
            detail: "no models available for session recap".into(),
        }
    })?;

    // Pass 1: triage.
    let triage = match triage_pass(ctx, &model, &combined).await {
        Ok(triage) => Some(triage),
        Err(e) => {
            warn!(error = %e, "triage pass failed; proceeding with empty triage");
            None
        }
    };
    let effective_triage = triage.clone().unwrap_or_default();

    // Pass 2: recap under the computed budget.
    let mut budget = recap_budget(
        input_tokens,
        effective_triage.total_meaningful_events,
        transcripts.len(),
    );
    if let Some(cap) = input.max_summary_tokens {
        budget = budget.min(cap);
    }

    match recap_pass(ctx, &model, &combined, &effective_triage, budget, input.focus.as_deref())
        .await
    {
        Ok(recap) => {
            let mut out = format!(
                "# Session recap\n\n_{} session(s) · ~{input_tokens} input tokens · budget \
{budget} tokens · by {model}_\n\n",
                transcripts.len()
            );
            out.push_str(&recap);
            out.push('\n');
            Ok(out)
        }
        Err(recap_err) => match triage {
            Some(t) => {
                warn!(error = %recap_err, "recap pass failed; emitting triage fallback");
                Ok(triage_fallback(&t, transcripts.len()))
            }
            None => Ok(format!(
                "## Recap unavailable\n\nBoth summarization passes failed (last error: \
{recap_err}).\n\n**Recovery:** {}\n",
                recap_err.recovery_hint()
            )),
        },
    }
}

fn combine(transcripts: &[SessionTranscript]) -> String {
    let mut combined = String::new();
    for (i, transcript) in transcripts.iter().enumerate() {
        combined.push_str(&format!(
            "=== Session {} ({}) ===\n{}\n",
            i + 1,
            transcript.path.file_name().unwrap_or_default().to_string_lossy(),
            transcript.text
        ));
    }
    combined
}

/// Budget formula: `clamp(round(0.04 · input_tokens · density · bonus),
/// 1000, 30000)` with `density = clamp(events/20, 0.5, 2.0)` and
/// `bonus = 1 + (sessions − 1) · 0.3`.
fn recap_budget(input_tokens: u32, events: u32, sessions: usize) -> u32 {
    let density = (events as f64 / 20.0).clamp(0.5, 2.0);
    let bonus = 1.0 + (sessions.saturating_sub(1)) as f64 * 0.3;
    let raw = (0.04 * input_tokens as f64 * density * bonus).round() as u32;
    raw.clamp(BUDGET_MIN, BUDGET_MAX)
}

/// Per-section budget shares proportional to triage counts, floored at 10%.
fn section_weights(triage: &Triage) -> Vec<(&'static str, f64)> {
    let sections = [
        ("Files modified", triage.files_modified),
        ("Decisions", triage.decisions_made),
        ("Errors resolved", triage.errors_resolved),
        ("Features built", triage.features_built),
        ("Unfinished work", triage.unfinished_work),
    ];
    let total: u32 = sections.iter().map(|(_, n)| n).sum();
    let raw: Vec<(&'static str, f64)> = sections
        .iter()
        .map(|(name, n)| {
            let share = if total == 0 {
                1.0 / sections.len() as f64
            } else {
                *n as f64 / total as f64
            };
            (*name, share.max(SECTION_FLOOR))
        })
        .collect();
    let sum: f64 = raw.iter().map(|(_, w)| w).sum();
    raw.into_iter().map(|(name, w)| (name, w / sum)).collect()
}

async fn triage_pass(ctx: &ToolContext, model: &str, combined: &str) -> Result<Triage> {
    let prompt = format!(
        "Inventory the coding session transcripts below. Reply with JSON only:\n\
{{\"files_modified\": n, \"decisions_made\": n, \"errors_resolved\": n, \
\"features_built\": n, \"unfinished_work\": n, \"total_meaningful_events\": n}}\n\n{combined}"
    );
    let options = QueryOptions::default().temperature(0.0).max_tokens(256);
    let response = ctx.smart.query(model, &prompt, &options).await?;
    let json = first_json_object(&response.content)
        .ok_or_else(|| HydraError::Validation("triage reply contained no JSON object".into()))?;
    Ok(serde_json::from_str(json)?)
}

async fn recap_pass(
    ctx: &ToolContext,
    model: &str,
    combined: &str,
    triage: &Triage,
    budget: u32,
    focus: Option<&str>,
) -> Result<String> {
    let weights = section_weights(triage);
    let mut section_guide = String::new();
    for (name, weight) in &weights {
        section_guide.push_str(&format!(
            "- {name}: about {} tokens\n",
            (*weight * budget as f64).round() as u32
        ));
    }
    let focus_line = focus
        .map(|f| format!("Emphasize: {f}\n"))
        .unwrap_or_default();
    let prompt = format!(
        "Write a markdown recap of the coding sessions below in at most {budget} tokens, \
with sections sized roughly as follows:\n{section_guide}{focus_line}\n{combined}"
    );
    let options = QueryOptions::default().temperature(0.2).max_tokens(budget);
    let response = ctx.smart.query(model, &prompt, &options).await?;
    Ok(response.content)
}

fn triage_fallback(triage: &Triage, sessions: usize) -> String {
    format!(
        "# Session recap (partial)\n\n_The recap pass failed; this is the raw triage of {sessions} \
session(s)._\n\n\
- Files modified: {}\n\
- Decisions made: {}\n\
- Errors resolved: {}\n\
- Features built: {}\n\
- Unfinished work: {}\n\
- Total meaningful events: {}\n",
        triage.files_modified,
        triage.decisions_made,
        triage.errors_resolved,
        triage.features_built,
        triage.unfinished_work,
        triage.total_meaningful_events,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_clamps_low() {
        // Tiny transcript, few events: floor at 1000.
        assert_eq!(recap_budget(1000, 5, 1), 1000);
    }

    #[test]
    fn budget_clamps_high() {
        assert_eq!(recap_budget(10_000_000, 100, 10), 30_000);
    }

    #[test]
    fn budget_scales_with_density_and_sessions() {
        // 100k input tokens, 20 events (density 1.0), 1 session → 4000.
        assert_eq!(recap_budget(100_000, 20, 1), 4_000);
        // 3 sessions: bonus 1.6 → 6400.
        assert_eq!(recap_budget(100_000, 20, 3), 6_400);
        // 40 events: density 2.0 → 8000.
        assert_eq!(recap_budget(100_000, 40, 1), 8_000);
    }

    #[test]
    fn section_weights_sum_to_one_with_floor() {
        let triage = Triage {
            files_modified: 100,
            decisions_made: 0,
            errors_resolved: 0,
            features_built: 0,
            unfinished_work: 0,
            total_meaningful_events: 100,
        };
        let weights = section_weights(&triage);
        let sum: f64 = weights.iter().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        // Zero-count sections still get a floored share.
        for (_, w) in &weights[1..] {
            assert!(*w > 0.05);
        }
    }

    #[test]
    fn empty_triage_splits_evenly() {
        let weights = section_weights(&Triage::default());
        for (_, w) in &weights {
            assert!((w - 0.2).abs() < 1e-9);
        }
    }
}
