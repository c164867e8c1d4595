//! Generate-content wire format (Gemini-family).
//!
//! The model ID rides in the URL path, the API key as a query parameter.
//! The system prompt is a structured `systemInstruction` field and content
//! is split into `parts`. Model listing is paginated and filtered to
//! generative Gemini variants.

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

/// Default base URL for the Gemini API.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Backend speaking the generate-content wire format.
#[derive(Clone)]
pub struct GenerateContentBackend {
    name: String,
    api_key: String,
    http: Client,
    base_url: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl GenerateContentBackend {
    /// Create a backend for a Gemini-family API.
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
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let max_output_tokens = options.max_tokens.map(|requested| {
            if reasoning::is_reasoning_model(model) {
                reasoning::boost_max_tokens(requested)
            } else {
                requested
            }
        });

        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            system_instruction: options.system_prompt.as_ref().map(|s| Content {
                role: None,
                parts: vec![Part { text: s.clone() }],
            }),
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens,
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

        let parsed: GenerateResponse = response.json().await.map_err(transport_error)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or(HydraError::EmptyResponse)?;
        let content = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        finalize_response(QueryResponse {
            model: model.to_string(),
            content,
            reasoning_content: None,
            usage: parsed.usage_metadata.map(|u| Usage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            }),
            latency_ms,
            finish_reason: candidate.finish_reason.as_deref().map(|r| match r {
                "STOP" => FinishReason::Stop,
                "MAX_TOKENS" => FinishReason::Length,
                "SAFETY" => FinishReason::ContentFilter,
                _ => FinishReason::Other,
            }),
            warning: None,
            fallback_from: None,
        })
    }
}

#[async_trait]
impl Backend for GenerateContentBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> bool {
        let url = format!(
            "{}/v1beta/models?pageSize=1&key={}",
            self.base_url, self.api_key
        );
        match self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Walk the paginated model listing, keeping generative Gemini variants.
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = format!(
                "{}/v1beta/models?pageSize=100&key={}",
                self.base_url, self.api_key
            );
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={token}"));
            }
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
            let parsed: ModelListPage = response.json().await.map_err(transport_error)?;

            for entry in parsed.models {
                let id = entry
                    .name
                    .strip_prefix("models/")
                    .unwrap_or(&entry.name)
                    .to_string();
                let generative = entry
                    .supported_generation_methods
                    .iter()
                    .any(|m| m == "generateContent");
                if generative && id.starts_with("gemini") {
                    let display = entry.display_name.unwrap_or_else(|| id.clone());
                    models.push(ModelInfo::new(id, &self.name).with_display_name(display));
                }
            }

            page_token = parsed.next_page_token.filter(|t| !t.is_empty());
            if page_token.is_none() {
                break;
            }
        }
        Ok(models)
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
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ModelListPage {
    #[serde(default)]
    models: Vec<ModelListEntry>,
    #[serde(rename = "nextPageToken", default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelListEntry {
    name: String,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
    #[serde(rename = "supportedGenerationMethods", default)]
    supported_generation_methods: Vec<String>,
}
