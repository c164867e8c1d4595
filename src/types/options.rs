//! Query options (provider-agnostic).

use serde::{Deserialize, Serialize};

use crate::{HydraError, Result};

/// Options for a single model query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl QueryOptions {
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Validate ranges: temperature in [0, 2], max_tokens ≥ 1.
    pub fn validate(&self) -> Result<()> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(HydraError::Validation(format!(
                    "temperature must be in [0, 2], got {t}"
                )));
            }
        }
        if let Some(0) = self.max_tokens {
            return Err(HydraError::Validation(
                "max_tokens must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Canonical textual encoding used for cache keying.
    ///
    /// Fields are joined in declaration order with the unit-separator
    /// control character, which cannot appear in a JSON-transported string
    /// field's meaningful content and never in a float.
    pub fn canonical(&self) -> String {
        format!(
            "{}\u{1f}{}\u{1f}{}",
            self.system_prompt.as_deref().unwrap_or(""),
            self.temperature.map(|t| t.to_string()).unwrap_or_default(),
            self.max_tokens.map(|m| m.to_string()).unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_bounds() {
        assert!(QueryOptions::default().temperature(0.0).validate().is_ok());
        assert!(QueryOptions::default().temperature(2.0).validate().is_ok());
        assert!(QueryOptions::default().max_tokens(1).validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range() {
        assert!(QueryOptions::default().temperature(2.1).validate().is_err());
        assert!(QueryOptions::default()
            .temperature(-0.1)
            .validate()
            .is_err());
        assert!(QueryOptions::default().max_tokens(0).validate().is_err());
    }

    #[test]
    fn canonical_distinguishes_fields() {
        let a = QueryOptions::default().system_prompt("x").canonical();
        let b = QueryOptions::default().temperature(0.5).canonical();
        let c = QueryOptions::default().canonical();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn canonical_is_stable() {
        let opts = QueryOptions::default()
            .system_prompt("be brief")
            .temperature(0.7)
            .max_tokens(256);
        assert_eq!(opts.canonical(), opts.clone().canonical());
    }
}
