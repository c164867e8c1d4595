//! Reasoning-model detection and dispatch adjustments.
//!
//! Models in the known reasoning set spend tokens on hidden thinking before
//! emitting visible output, so the effective completion budget is boosted
//! and the per-request deadline extended at backend dispatch.

use std::time::Duration;

/// Lower bound of the boosted completion budget.
pub const REASONING_MIN_TOKENS: u32 = 4_096;
/// Upper bound of the boosted completion budget.
pub const REASONING_MAX_TOKENS: u32 = 16_384;
/// Deadline multiplier applied to reasoning-model requests.
pub const REASONING_DEADLINE_FACTOR: u32 = 2;

/// Substrings identifying known reasoning model families, matched
/// case-insensitively against the routed model ID.
const REASONING_PATTERNS: &[&str] = &[
    "o1",
    "o3",
    "o4",
    "deepseek-r1",
    "qwq",
    "thinking",
    "gemini-3-pro",
];

/// Whether `model` is a known reasoning model.
///
/// The o-series patterns match only at the start of the bare ID (after any
/// provider prefix) so that e.g. "llama3-70b" does not trip on "o3".
pub fn is_reasoning_model(model: &str) -> bool {
    let bare = model.rsplit('/').next().unwrap_or(model).to_lowercase();
    REASONING_PATTERNS.iter().any(|p| match *p {
        "o1" | "o3" | "o4" => {
            bare.starts_with(p)
                && bare[p.len()..]
                    .chars()
                    .next()
                    .map(|c| !c.is_ascii_alphanumeric())
                    .unwrap_or(true)
        }
        _ => bare.contains(p),
    })
}

/// Boosted completion budget: `clamp(4 * requested, 4096, 16384)`.
pub fn boost_max_tokens(requested: u32) -> u32 {
    (requested.saturating_mul(4)).clamp(REASONING_MIN_TOKENS, REASONING_MAX_TOKENS)
}

/// Extend a deadline for a reasoning-model request.
pub fn extend_deadline(deadline: Duration) -> Duration {
    deadline.saturating_mul(REASONING_DEADLINE_FACTOR)
}

/// Prefix under which substituted reasoning text is surfaced when a model
/// returns empty content but non-empty reasoning.
pub const REASONING_FALLBACK_PREFIX: &str = "[model reasoning (no final answer was produced)]\n\n";
