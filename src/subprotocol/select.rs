//! Model selection heuristics.
//!
//! Preference tables are ordered best-first and matched against the bare
//! model ID (after any provider prefix), so a catalog entry like
//! `gemini/gemini-2.5-flash` matches the `gemini-2.5-flash` preference.

use crate::ModelInfo;

/// Large-context preference, ordered by context-size suitability. Flash
/// variants lead: file analysis and recap prompts are long but cheap.
const LARGE_CONTEXT_PREFERENCE: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.0-flash",
    "gemini-1.5-flash",
    "gemini-2.5-pro",
    "gemini-1.5-pro",
    "gpt-4.1",
    "gpt-4o",
    "claude-sonnet",
];

/// Distiller preference: lite/flash/haiku-class models.
const DISTILLER_PREFERENCE: &[&str] = &[
    "flash-lite",
    "haiku",
    "flash",
    "gpt-4o-mini",
    "gpt-5-mini",
    "mini",
];

fn bare_id(model_id: &str) -> &str {
    model_id.rsplit('/').next().unwrap_or(model_id)
}

fn first_matching(catalog: &[ModelInfo], preferences: &[&str]) -> Option<String> {
    preferences.iter().find_map(|pref| {
        catalog
            .iter()
            .find(|m| bare_id(&m.id).starts_with(pref) || bare_id(&m.id).contains(pref))
            .map(|m| m.id.clone())
    })
}

/// Pick a model able to accept very large prompts. An explicit override
/// always wins; otherwise the first preference present in the catalog,
/// falling back to the first catalog entry.
pub fn pick_large_context(catalog: &[ModelInfo], requested: Option<&str>) -> Option<String> {
    if let Some(model) = requested {
        return Some(model.to_string());
    }
    first_matching(catalog, LARGE_CONTEXT_PREFERENCE).or_else(|| catalog.first().map(|m| m.id.clone()))
}

/// Pick a distiller, excluding the worker model whose output is being
/// compressed.
pub fn pick_distiller(catalog: &[ModelInfo], worker_model: &str) -> Option<String> {
    let eligible: Vec<ModelInfo> = catalog
        .iter()
        .filter(|m| bare_id(&m.id) != bare_id(worker_model) && m.id != worker_model)
        .cloned()
        .collect();
    first_matching(&eligible, DISTILLER_PREFERENCE)
}

/// Pick a synthesizer: the explicit choice, or the first catalog model not
/// among the sources.
pub fn pick_synthesizer(
    catalog: &[ModelInfo],
    sources: &[String],
    requested: Option<&str>,
) -> Option<String> {
    if let Some(model) = requested {
        return Some(model.to_string());
    }
    catalog
        .iter()
        .find(|m| {
            !sources
                .iter()
                .any(|s| s == &m.id || bare_id(s) == bare_id(&m.id))
        })
        .map(|m| m.id.clone())
}

/// Pick a judge: the explicit choice, or a large-context default.
pub fn pick_judge(catalog: &[ModelInfo], requested: Option<&str>) -> Option<String> {
    if let Some(model) = requested {
        return Some(model.to_string());
    }
    pick_large_context(catalog, None)
}
