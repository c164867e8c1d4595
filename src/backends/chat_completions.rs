//! Chat-completions wire format.
//!
//! Drives any OpenAI-compatible `/v1/chat/completions` endpoint, and — in
//! native mode — a local Ollama server via `/api/chat`, whose responses
//! report token counts as eval counts.

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

/// Default base URL for the OpenAI API.
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
/// Default base URL for a local Ollama daemon.
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Backend speaking the chat-completions wire format.
#[derive(Clone)]
pub struct ChatCompletionsBackend {
    name: String,
    api_key: Option<String>,
    http: Client,
    base_url: String,
    /// Native Ollama mode: `/api/chat` + `/api/tags`, eval-count usage.
    ollama_native: bool,
    timeout: Duration,
    retry: RetryConfig,
}

impl ChatCompletionsBackend {
    /// Create a backend for an OpenAI-family API.
    pub fn openai(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: Some(api_key.into()),
            http: Client::new(),
            base_url: DEFAULT_OPENAI_BASE_URL.into(),
            ollama_native: false,
            timeout: default_deadline(),
            retry: RetryConfig::default(),
        }
    }

    /// Create a backend for a local Ollama server (keyless, native wire).
    pub fn ollama(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: None,
            http: Client::new(),
            base_url: DEFAULT_OLLAMA_BASE_URL.into(),
            ollama_native: true,
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

    fn effective_max_tokens(model: &str, options: &QueryOptions) -> Option<u32> {
        let requested = options.max_tokens?;
        if reasoning::is_reasoning_model(model) {
            Some(reasoning::boost_max_tokens(requested))
        } else {
            Some(requested)
        }
    }

    async fn query_openai(
        &self,
        model: &str,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<QueryResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &options.system_prompt {
            messages.push(WireMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: prompt.to_string(),
        });

        let max_tokens = Self::effective_max_tokens(model, options);
        let body = ChatRequest {
            model,
            messages,
            temperature: options.temperature,
            max_tokens,
            // Reasoning models reject the legacy cap name; send both so
            // either vintage of the API honors the boost.
            max_completion_tokens: if reasoning::is_reasoning_model(model) {
                max_tokens
            } else {
                None
            },
        };

        let started = Instant::now();
        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HydraError::from_status(status.as_u16(), text));
        }

        let parsed: ChatResponse = response.json().await.map_err(transport_error)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(HydraError::EmptyResponse)?;

        finalize_response(QueryResponse {
            model: model.to_string(),
            content: choice.message.content.unwrap_or_default(),
            reasoning_content: choice.message.reasoning_content,
            usage: parsed.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            latency_ms,
            finish_reason: choice.finish_reason.as_deref().map(finish_reason),
            warning: None,
            fallback_from: None,
        })
    }

    async fn query_ollama(
        &self,
        model: &str,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<QueryResponse> {
        let url = format!("{}/api/chat", self.base_url);
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &options.system_prompt {
            messages.push(WireMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: prompt.to_string(),
        });

        let body = OllamaChatRequest {
            model,
            messages,
            stream: false,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: Self::effective_max_tokens(model, options),
            },
        };

        let started = Instant::now();
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HydraError::from_status(status.as_u16(), text));
        }

        let parsed: OllamaChatResponse = response.json().await.map_err(transport_error)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        // Native responses report usage as eval counts.
        let usage = match (parsed.prompt_eval_count, parsed.eval_count) {
            (None, None) => None,
            (p, c) => Some(Usage::new(p.unwrap_or(0), c.unwrap_or(0))),
        };

        finalize_response(QueryResponse {
            model: model.to_string(),
            content: parsed.message.map(|m| m.content).unwrap_or_default(),
            reasoning_content: None,
            usage,
            latency_ms,
            finish_reason: parsed.done_reason.as_deref().map(finish_reason),
            warning: None,
            fallback_from: None,
        })
    }
}

#[async_trait]
impl Backend for ChatCompletionsBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> bool {
        let url = if self.ollama_native {
            format!("{}/api/tags", self.base_url)
        } else {
            format!("{}/v1/models", self.base_url)
        };
        let mut request = self.http.get(&url).timeout(Duration::from_secs(5));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        if self.ollama_native {
            let url = format!("{}/api/tags", self.base_url);
            let response = self
                .http
                .get(&url)
                .timeout(Duration::from_secs(10))
                .send()
                .await
                .map_err(transport_error)?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(HydraError::from_status(status.as_u16(), text));
            }
            let parsed: OllamaTagsResponse = response.json().await.map_err(transport_error)?;
            return Ok(parsed
                .models
                .into_iter()
                .map(|m| ModelInfo::new(m.name, &self.name))
                .collect());
        }

        let url = format!("{}/v1/models", self.base_url);
        let mut request = self.http.get(&url).timeout(Duration::from_secs(10));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HydraError::from_status(status.as_u16(), text));
        }
        let parsed: ModelsResponse = response.json().await.map_err(transport_error)?;
        Ok(parsed
            .data
            .into_iter()
            .map(|m| ModelInfo::new(m.id, &self.name))
            .collect())
    }

    #[instrument(skip(self, prompt, options), fields(backend = %self.name, model = %model))]
    async fn query(
        &self,
        model: &str,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<QueryResponse> {
        // The overall deadline bounds the retry loop as a whole.
        with_deadline(
            self.deadline_for(model),
            with_retry(&self.retry, &self.name, || async {
                if self.ollama_native {
                    self.query_ollama(model, prompt, options).await
                } else {
                    self.query_openai(model, prompt, options).await
                }
            }),
        )
        .await
    }
}

fn finish_reason(raw: &str) -> FinishReason {
    match raw {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Other,
    }
}

// ============================================================================
// Wire DTOs
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct WireMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaTag>,
}

#[derive(Debug, Deserialize)]
struct OllamaTag {
    name: String,
}
