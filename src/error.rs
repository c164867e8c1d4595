//! Hydra error types
//!
//! The taxonomy mirrors the failure modes of the orchestration layer:
//! validation, routing, circuit-open, timeout, transport, backend HTTP
//! status, empty responses, and authentication. The retry layer consults
//! [`HydraError::is_transient()`] to decide what is worth another attempt.

use std::time::Duration;

/// Hydra error types
#[derive(Debug, thiserror::Error)]
pub enum HydraError {
    /// Tool input failed schema validation. Surfaced verbatim to the caller.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Unknown provider prefix, or no backend accepted a bare model ID.
    #[error("routing failed for '{model}': {detail}")]
    Routing { model: String, detail: String },

    /// Circuit open for this model; includes remaining cooldown.
    #[error("model '{model}' temporarily unavailable, retry in {cooldown_remaining:?}")]
    Unavailable {
        model: String,
        cooldown_remaining: Duration,
    },

    /// Per-request deadline exceeded.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Network, connection reset, DNS.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx from a backend. `4xx` non-retryable, `429`/`5xx` retryable.
    #[error("backend error ({status}): {body}")]
    Backend { status: u16, body: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Backend returned fewer than 10 non-whitespace characters and no
    /// reasoning content.
    #[error("empty response from model")]
    EmptyResponse,

    /// `401`/`403` from a backend, or a failed subscription token refresh.
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HydraError {
    /// Build the appropriate variant for a non-2xx HTTP status.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => HydraError::Auth(format!("HTTP {status}: {body}")),
            429 => HydraError::RateLimited { retry_after: None },
            _ => HydraError::Backend { status, body },
        }
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// Transport failures, timeouts, rate limits, and `5xx` statuses are
    /// transient. Validation, routing, auth, and other `4xx` are not.
    pub fn is_transient(&self) -> bool {
        match self {
            HydraError::Transport(_) | HydraError::Timeout(_) | HydraError::RateLimited { .. } => {
                true
            }
            HydraError::Backend { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Provider-supplied retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HydraError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// A one-line remediation hint rendered by the tools layer.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            HydraError::Validation(_) => "Fix the tool input and call again.",
            HydraError::Routing { .. } => {
                "Call list_models to see available model IDs and providers."
            }
            HydraError::Unavailable { .. } => {
                "Wait for the cooldown to expire, or call list_models to pick a healthy model."
            }
            HydraError::Timeout(_) => {
                "Retry, shorten the prompt, or raise HYDRA_TIMEOUT_MS for long-running models."
            }
            HydraError::Transport(_) => {
                "Check network connectivity and that the provider endpoint is reachable."
            }
            HydraError::Backend { .. } | HydraError::RateLimited { .. } => {
                "Retry shortly, or switch to a different model."
            }
            HydraError::EmptyResponse => {
                "Retry with a higher max_tokens, or try a different model."
            }
            HydraError::Auth(_) => {
                "Check the API key or subscription credentials for this provider."
            }
            HydraError::Json(_) => "Retry; the backend returned malformed output.",
            HydraError::Configuration(_) => "Fix the configuration value and restart.",
            HydraError::Io(_) => "Check that the path exists and is readable.",
        }
    }
}

/// Result type alias for Hydra operations
pub type Result<T> = std::result::Result<T, HydraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_401_maps_to_auth() {
        assert!(matches!(
            HydraError::from_status(401, "nope"),
            HydraError::Auth(_)
        ));
        assert!(matches!(
            HydraError::from_status(403, "nope"),
            HydraError::Auth(_)
        ));
    }

    #[test]
    fn status_429_maps_to_rate_limited() {
        let err = HydraError::from_status(429, "slow down");
        assert!(matches!(err, HydraError::RateLimited { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(HydraError::from_status(500, "boom").is_transient());
        assert!(HydraError::from_status(503, "down").is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(!HydraError::from_status(400, "bad").is_transient());
        assert!(!HydraError::from_status(404, "missing").is_transient());
        assert!(!HydraError::from_status(401, "auth").is_transient());
    }

    #[test]
    fn timeout_and_transport_are_transient() {
        assert!(HydraError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(HydraError::Transport("reset".into()).is_transient());
        assert!(!HydraError::Validation("bad".into()).is_transient());
    }
}
