//! Semantic agreement detection.
//!
//! A judge model partitions candidate responses into agreement groups. If
//! the judge call fails (or returns unparseable output), a deterministic
//! keyword-Jaccard heuristic stands in so the consensus tool always
//! produces a verdict.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::orchestrator::SmartBackend;
use crate::util::json_extract::first_json_object;
use crate::{Backend, QueryOptions};

/// Jaccard similarity above this threshold counts as agreement.
const JACCARD_THRESHOLD: f64 = 0.3;
/// Keywords shorter than this many characters are stripped before
/// comparison.
const MIN_KEYWORD_LEN: usize = 5;
/// Token budget for the judge's verdict.
const JUDGE_MAX_TOKENS: u32 = 512;

/// Partition of response indices into agreement groups, largest first.
#[derive(Debug, Clone)]
pub struct Agreement {
    /// Index groups; `groups[0]` is the consensus set.
    pub groups: Vec<Vec<usize>>,
    pub reasoning: String,
    /// True when the keyword heuristic produced this verdict.
    pub heuristic: bool,
}

impl Agreement {
    /// Indices of the largest (agreeing) group.
    pub fn agreeing(&self) -> &[usize] {
        self.groups.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Indices outside the largest group.
    pub fn dissenting(&self) -> Vec<usize> {
        self.groups.iter().skip(1).flatten().copied().collect()
    }
}

#[derive(Debug, Deserialize)]
struct JudgeVerdict {
    groups: Vec<Vec<usize>>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Ask `judge_model` to partition `responses` into agreement groups,
/// falling back to [`jaccard_partition`] on any failure.
pub async fn judge_agreement(
    smart: &Arc<SmartBackend>,
    judge_model: &str,
    question: &str,
    responses: &[String],
) -> Agreement {
    let mut prompt = format!(
        "Several models answered the same question. Partition the responses into groups that \
give semantically equivalent answers.\n\nQuestion: {question}\n\n"
    );
    for (i, response) in responses.iter().enumerate() {
        prompt.push_str(&format!("--- Response {i} ---\n{response}\n\n"));
    }
    prompt.push_str(
        "Reply with JSON only: {\"groups\": [[indices that agree], ...], \"reasoning\": \"one sentence\"}",
    );

    let options = QueryOptions::default()
        .temperature(0.0)
        .max_tokens(JUDGE_MAX_TOKENS);

    match smart.query(judge_model, &prompt, &options).await {
        Ok(verdict) => match parse_verdict(&verdict.content, responses.len()) {
            Some(agreement) => agreement,
            None => {
                warn!(judge = judge_model, "judge verdict unparseable; using keyword heuristic");
                jaccard_partition(responses)
            }
        },
        Err(e) => {
            warn!(judge = judge_model, error = %e, "judge call failed; using keyword heuristic");
            jaccard_partition(responses)
        }
    }
}

/// Parse and validate a judge verdict. Groups must be lists of in-range
/// indices; the largest group is moved to the front.
fn parse_verdict(content: &str, n: usize) -> Option<Agreement> {
    let json = first_json_object(content)?;
    let verdict: JudgeVerdict = serde_json::from_str(json).ok()?;
    if verdict.groups.is_empty() {
        return None;
    }
    for group in &verdict.groups {
        if group.iter().any(|&i| i >= n) {
            return None;
        }
    }
    let mut groups = verdict.groups;
    groups.sort_by_key(|g| std::cmp::Reverse(g.len()));
    Some(Agreement {
        groups,
        reasoning: verdict.reasoning.unwrap_or_default(),
        heuristic: false,
    })
}

/// Deterministic fallback: compare keyword sets against the first response
/// as pivot, declaring agreement at Jaccard similarity above the threshold.
pub fn jaccard_partition(responses: &[String]) -> Agreement {
    if responses.is_empty() {
        return Agreement {
            groups: Vec::new(),
            reasoning: String::new(),
            heuristic: true,
        };
    }

    let pivot = keywords(&responses[0]);
    let mut agreeing = vec![0usize];
    let mut dissenting = Vec::new();
    for (i, response) in responses.iter().enumerate().skip(1) {
        if jaccard(&pivot, &keywords(response)) > JACCARD_THRESHOLD {
            agreeing.push(i);
        } else {
            dissenting.push(i);
        }
    }

    let mut groups = vec![agreeing];
    groups.extend(dissenting.into_iter().map(|i| vec![i]));
    groups.sort_by_key(|g| std::cmp::Reverse(g.len()));
    Agreement {
        groups,
        reasoning: "keyword overlap against the first response".into(),
        heuristic: true,
    }
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= MIN_KEYWORD_LEN)
        .map(str::to_lowercase)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}
