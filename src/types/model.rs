//! Model catalog types.

use serde::{Deserialize, Serialize};

/// Information about an available model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier, globally unique within the process once prefixed
    /// (e.g., "openai/gpt-4o", "ollama/qwen2.5-coder").
    pub id: String,
    /// Human-readable name for display (e.g., "GPT-4o").
    pub display_name: String,
    /// Provider registry key (e.g., "openai", "anthropic", "ollama").
    pub provider: String,
}

impl ModelInfo {
    /// Create new model info. Display name defaults to the ID.
    pub fn new(id: impl Into<String>, provider: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            provider: provider.into(),
        }
    }

    /// Set a human-readable display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Return a copy with the ID prefixed by `provider/`, as exposed by the
    /// routing layer.
    pub fn prefixed(&self) -> Self {
        Self {
            id: format!("{}/{}", self.provider, self.id),
            display_name: self.display_name.clone(),
            provider: self.provider.clone(),
        }
    }
}
