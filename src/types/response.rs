//! Query response types.

use serde::{Deserialize, Serialize};

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt: u32, completion: u32) -> Self {
        Self {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }
}

/// Reason the model stopped generating
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    ContentFilter,
    Other,
}

/// A completed query response.
///
/// Invariant: `latency_ms == 0` iff the response was served from the
/// response cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Model that produced the response (as routed, without prefix).
    pub model: String,
    pub content: String,
    /// Extended-thinking output, when the model reports it separately.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Wall time from send to received body. Zero marks a cache hit.
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Non-fatal annotation (e.g. reasoning text substituted for empty content).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Set when a fallback chain redirected the query away from this model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_from: Option<String>,
}

impl QueryResponse {
    /// Completion tokens as reported, or estimated at four characters per
    /// token when the backend did not report usage.
    pub fn observed_completion_tokens(&self) -> u32 {
        match self.usage {
            Some(u) if u.completion_tokens > 0 => u.completion_tokens,
            _ => self.content.len().div_ceil(4) as u32,
        }
    }
}
