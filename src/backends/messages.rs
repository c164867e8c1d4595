//! Messages wire format (Anthropic-family).
//!
//! `/v1/messages` differs from chat-completions: the system prompt is a
//! separate top-level field, `max_tokens` is mandatory, and the response
//! body is an array of typed content blocks with `input_tokens` /
//! `output_tokens` usage.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{finalize_response, transport_error};
use crate::util::deadline::{default_deadline, with_deadline};
use crate::util::reasoning;
use crate::util::retry::{with_retry, RetryConfig};
use crate::{
    Backend, FinishReason, HydraError, ModelInfo, QueryOptions, QueryResponse, Result, Usage,
};

/// Default base URL for the Anthropic API.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
/// API version header required on every request.
const API_VERSION: &str = "2023-06-01";
/// The wire format makes `max_tokens` mandatory; this is the default when
/// the caller sets none.
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Models served when the API's own catalog endpoint is unreachable.
const STATIC_CATALOG: &[(&str, &str)] = &[
    ("claude-opus-4-1", "Claude Opus 4.1"),
    ("claude-sonnet-4-5", "Claude Sonnet 4.5"),
    ("claude-haiku-4-5", "Claude Haiku 4.5"),
];

/// Backend speaking the messages wire format.
#[derive(Clone)]
pub struct MessagesBackend {
    name: String,
    api_key: String,
    http: Client,
    base_url: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl MessagesBackend {
    /// Create a backend for an Anthropic-family API.
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            http: Client::new(),
            base_url: DEFAULT_BASE_URL.into(),
            timeout: default_deadline(),
            retry: RetryConfig::default(),
        }
    }

    /// Override the base URL (custom deployments, wiremock).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the per-request deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry configuration for transient transport errors.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn deadline_for(&self, model: &str) -> Duration {
        if reasoning::is_reasoning_model(model) {
            reasoning::extend_deadline(self.timeout)
        } else {
            self.timeout
        }
    }

    async fn query_once(
        &self,
        model: &str,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<QueryResponse> {
        let url = format!("{}/v1/messages", self.base_url);

        let requested = options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let max_tokens = if reasoning::is_reasoning_model(model) {
            reasoning::boost_max_tokens(requested)
        } else {
            requested
        };

        let body = MessagesRequest {
            model,
            max_tokens,
            messages: vec![WireMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            system: options.system_prompt.clone(),
            temperature: options.temperature,
        };

        let started = Instant::now();
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HydraError::from_status(status.as_u16(), text));
        }

        let parsed: MessagesResponse = response.json().await.map_err(transport_error)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        // Flatten the typed content blocks: text becomes the answer,
        // thinking becomes reasoning content.
        let mut content = String::new();
        let mut reasoning_content = String::new();
        for block in parsed.content {
            match block {
                ContentBlock::Text { text } => content.push_str(&text),
                ContentBlock::Thinking { thinking } => reasoning_content.push_str(&thinking),
                ContentBlock::Other => {}
            }
        }

        finalize_response(QueryResponse {
            model: model.to_string(),
            content,
            reasoning_content: (!reasoning_content.is_empty()).then_some(reasoning_content),
            usage: parsed
                .usage
                .map(|u| Usage::new(u.input_tokens, u.output_tokens)),
            latency_ms,
            finish_reason: parsed.stop_reason.as_deref().map(|r| match r {
                "end_turn" | "stop_sequence" => FinishReason::Stop,
                "max_tokens" => FinishReason::Length,
                _ => FinishReason::Other,
            }),
            warning: None,
            fallback_from: None,
        })
    }
}

#[async_trait]
impl Backend for MessagesBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/v1/models", self.base_url);
        match self
            .http
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(Duration::from_secs(10))
            .send()
            .await;

        // The static catalog stands in when the endpoint is unreachable.
        let fallback = || {
            STATIC_CATALOG
                .iter()
                .map(|(id, display)| {
                    ModelInfo::new(*id, &self.name).with_display_name(*display)
                })
                .collect()
        };

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            _ => return Ok(fallback()),
        };
        match response.json::<ModelListResponse>().await {
            Ok(parsed) => Ok(parsed
                .data
                .into_iter()
                .map(|m| {
                    let display = m.display_name.unwrap_or_else(|| m.id.clone());
                    ModelInfo::new(m.id, &self.name).with_display_name(display)
                })
                .collect()),
            Err(_) => Ok(fallback()),
        }
    }

    #[instrument(skip(self, prompt, options), fields(backend = %self.name, model = %model))]
    async fn query(
        &self,
        model: &str,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<QueryResponse> {
        with_deadline(
            self.deadline_for(model),
            with_retry(&self.retry, &self.name, || {
                self.query_once(model, prompt, options)
            }),
        )
        .await
    }
}

// ============================================================================
// Wire DTOs
// ============================================================================

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Thinking { thinking: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelListResponse {
    data: Vec<ModelListEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelListEntry {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}
