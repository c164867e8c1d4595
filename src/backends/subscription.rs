//! Subscription backend.
//!
//! Uses a user's monthly plan via OAuth refresh tokens cached on disk
//! instead of a pay-per-token API key. One token file per family at a
//! well-known home path; each request reads the cached token set,
//! refreshes it through the family's token endpoint when the access token
//! is within a 60-second expiry window, atomically rewrites the file, and
//! dispatches using the family's wire shape.
//!
//! Refresh-and-persist is serialized per family: two concurrent refreshes
//! cannot race and write conflicting tokens to disk.

use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::{finalize_response, transport_error};
use crate::util::deadline::default_deadline;
use crate::util::reasoning;
use crate::{Backend, HydraError, ModelInfo, QueryOptions, QueryResponse, Result, Usage};

/// Access tokens within this window of expiry are refreshed before use.
const EXPIRY_WINDOW_MS: u64 = 60_000;

/// One subscription plan family, with its wire shape and token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionFamily {
    /// Anthropic plan — messages wire shape.
    Claude,
    /// OpenAI plan — chat-completions wire shape.
    Codex,
    /// Google plan — generate-content wire shape.
    Gemini,
}

impl SubscriptionFamily {
    fn key(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
        }
    }

    fn default_token_endpoint(self) -> &'static str {
        match self {
            Self::Claude => "https://console.anthropic.com/v1/oauth/token",
            Self::Codex => "https://auth.openai.com/oauth/token",
            Self::Gemini => "https://oauth2.googleapis.com/token",
        }
    }

    fn default_api_base_url(self) -> &'static str {
        match self {
            Self::Claude => "https://api.anthropic.com",
            Self::Codex => "https://api.openai.com",
            Self::Gemini => "https://generativelanguage.googleapis.com",
        }
    }

    fn client_id(self) -> &'static str {
        match self {
            Self::Claude => "9d1c250a-e61b-44d9-88ed-5944d1962f5e",
            Self::Codex => "app_EMoamEEZ73f0CkXaXp7hrann",
            Self::Gemini => "681255809395-oo8ft2oprdrnp9e3aqf6av3hmdib135j.apps.googleusercontent.com",
        }
    }

    /// Models served under this plan.
    fn catalog(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Claude => &[
                ("claude-opus-4-1", "Claude Opus 4.1 (subscription)"),
                ("claude-sonnet-4-5", "Claude Sonnet 4.5 (subscription)"),
                ("claude-haiku-4-5", "Claude Haiku 4.5 (subscription)"),
            ],
            Self::Codex => &[
                ("gpt-5", "GPT-5 (subscription)"),
                ("gpt-5-codex", "GPT-5 Codex (subscription)"),
                ("codex-mini", "Codex Mini (subscription)"),
            ],
            Self::Gemini => &[
                ("gemini-2.5-pro", "Gemini 2.5 Pro (subscription)"),
                ("gemini-2.5-flash", "Gemini 2.5 Flash (subscription)"),
            ],
        }
    }
}

/// Cached token set for one family.
#[derive(Debug, Clone)]
struct TokenSet {
    access_token: String,
    refresh_token: String,
    /// Unix-epoch milliseconds; zero means unknown, forcing a refresh.
    expires_at_ms: u64,
}

impl TokenSet {
    fn needs_refresh(&self) -> bool {
        let now = epoch_ms();
        self.expires_at_ms < now + EXPIRY_WINDOW_MS
    }
}

struct FamilySlot {
    family: SubscriptionFamily,
    token_file: PathBuf,
    token_endpoint: String,
    api_base_url: String,
    /// Serializes read-refresh-persist per family.
    tokens: Mutex<Option<TokenSet>>,
}

/// Backend that dispatches through subscription OAuth credentials.
pub struct SubscriptionBackend {
    name: String,
    http: Client,
    slots: Vec<FamilySlot>,
    timeout: Duration,
}

impl SubscriptionBackend {
    /// Create a subscription backend with no families registered.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            http: Client::new(),
            slots: Vec::new(),
            timeout: default_deadline(),
        }
    }

    /// Register a family with its on-disk token file.
    pub fn family(mut self, family: SubscriptionFamily, token_file: impl Into<PathBuf>) -> Self {
        self.slots.push(FamilySlot {
            family,
            token_file: token_file.into(),
            token_endpoint: family.default_token_endpoint().into(),
            api_base_url: family.default_api_base_url().into(),
            tokens: Mutex::new(None),
        });
        self
    }

    /// Override a family's token endpoint (testing).
    pub fn token_endpoint(mut self, family: SubscriptionFamily, url: impl Into<String>) -> Self {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.family == family) {
            slot.token_endpoint = url.into();
        }
        self
    }

    /// Override a family's API base URL (testing).
    pub fn api_base_url(mut self, family: SubscriptionFamily, url: impl Into<String>) -> Self {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.family == family) {
            slot.api_base_url = url.into();
        }
        self
    }

    /// Set the per-request deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn slot_for_model(&self, model: &str) -> Option<&FamilySlot> {
        self.slots.iter().find(|slot| {
            slot.family
                .catalog()
                .iter()
                .any(|(id, _)| *id == model)
        })
    }

    /// Obtain a valid access token for the slot, refreshing if needed.
    ///
    /// Holds the family mutex across read-refresh-persist so concurrent
    /// requests for the same family serialize on the refresh.
    async fn access_token(&self, slot: &FamilySlot) -> Result<String> {
        let mut guard = slot.tokens.lock().await;
        if guard.is_none() {
            *guard = Some(read_token_file(slot.family, &slot.token_file)?);
        }
        let tokens = guard.as_mut().expect("populated above");

        if tokens.needs_refresh() {
            debug!(family = slot.family.key(), "refreshing subscription token");
            let refreshed = self.refresh(slot, &tokens.refresh_token).await?;
            persist_token_file(slot.family, &slot.token_file, &refreshed)?;
            *tokens = refreshed;
        }
        Ok(tokens.access_token.clone())
    }

    async fn refresh(&self, slot: &FamilySlot, refresh_token: &str) -> Result<TokenSet> {
        let body = json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
            "client_id": slot.family.client_id(),
        });
        let response = self
            .http
            .post(&slot.token_endpoint)
            .json(&body)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HydraError::Auth(format!(
                "token refresh failed ({status}): {text}"
            )));
        }

        let parsed: Value = response.json().await.map_err(transport_error)?;
        let access_token = parsed
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| HydraError::Auth("refresh response missing access_token".into()))?
            .to_string();
        let new_refresh = parsed
            .get("refresh_token")
            .and_then(Value::as_str)
            .unwrap_or(refresh_token)
            .to_string();
        let expires_in = parsed
            .get("expires_in")
            .and_then(Value::as_u64)
            .unwrap_or(3600);

        Ok(TokenSet {
            access_token,
            refresh_token: new_refresh,
            expires_at_ms: epoch_ms() + expires_in * 1000,
        })
    }

    async fn dispatch(
        &self,
        slot: &FamilySlot,
        access_token: &str,
        model: &str,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<QueryResponse> {
        let deadline = if reasoning::is_reasoning_model(model) {
            reasoning::extend_deadline(self.timeout)
        } else {
            self.timeout
        };
        let max_tokens = options.max_tokens.map(|requested| {
            if reasoning::is_reasoning_model(model) {
                reasoning::boost_max_tokens(requested)
            } else {
                requested
            }
        });

        let started = Instant::now();
        let (url, body) = match slot.family {
            SubscriptionFamily::Codex => {
                let mut messages = Vec::new();
                if let Some(system) = &options.system_prompt {
                    messages.push(json!({"role": "system", "content": system}));
                }
                messages.push(json!({"role": "user", "content": prompt}));
                let mut body = json!({"model": model, "messages": messages});
                if let Some(t) = options.temperature {
                    body["temperature"] = json!(t);
                }
                if let Some(m) = max_tokens {
                    body["max_tokens"] = json!(m);
                    if reasoning::is_reasoning_model(model) {
                        body["max_completion_tokens"] = json!(m);
                    }
                }
                (format!("{}/v1/chat/completions", slot.api_base_url), body)
            }
            SubscriptionFamily::Claude => {
                let mut body = json!({
                    "model": model,
                    "max_tokens": max_tokens.unwrap_or(1024),
                    "messages": [{"role": "user", "content": prompt}],
                });
                if let Some(system) = &options.system_prompt {
                    body["system"] = json!(system);
                }
                if let Some(t) = options.temperature {
                    body["temperature"] = json!(t);
                }
                (format!("{}/v1/messages", slot.api_base_url), body)
            }
            SubscriptionFamily::Gemini => {
                let mut body = json!({
                    "contents": [{"role": "user", "parts": [{"text": prompt}]}],
                    "generationConfig": {},
                });
                if let Some(system) = &options.system_prompt {
                    body["systemInstruction"] = json!({"parts": [{"text": system}]});
                }
                if let Some(t) = options.temperature {
                    body["generationConfig"]["temperature"] = json!(t);
                }
                if let Some(m) = max_tokens {
                    body["generationConfig"]["maxOutputTokens"] = json!(m);
                }
                (
                    format!(
                        "{}/v1beta/models/{}:generateContent",
                        slot.api_base_url, model
                    ),
                    body,
                )
            }
        };

        let mut request = self
            .http
            .post(&url)
            .json(&body)
            .timeout(deadline)
            .bearer_auth(access_token);
        if slot.family == SubscriptionFamily::Claude {
            request = request.header("anthropic-version", "2023-06-01");
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HydraError::from_status(status.as_u16(), text));
        }
        let parsed: Value = response.json().await.map_err(transport_error)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (content, reasoning_content, usage) = extract_by_family(slot.family, &parsed);
        finalize_response(QueryResponse {
            model: model.to_string(),
            content,
            reasoning_content,
            usage,
            latency_ms,
            finish_reason: None,
            warning: None,
            fallback_from: None,
        })
    }
}

#[async_trait]
impl Backend for SubscriptionBackend {
    fn name(&self) -> &str {
        &self.name
    }

    /// Healthy when at least one family's token file exists and parses.
    async fn health_check(&self) -> bool {
        self.slots
            .iter()
            .any(|slot| read_token_file(slot.family, &slot.token_file).is_ok())
    }

    /// Static catalog, restricted to families whose token file is present.
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let mut models = Vec::new();
        for slot in &self.slots {
            if !slot.token_file.exists() {
                continue;
            }
            for (id, display) in slot.family.catalog() {
                models.push(ModelInfo::new(*id, &self.name).with_display_name(*display));
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
        let slot = self.slot_for_model(model).ok_or_else(|| HydraError::Routing {
            model: model.to_string(),
            detail: "no subscription family serves this model".into(),
        })?;
        let access_token = self.access_token(slot).await?;
        self.dispatch(slot, &access_token, model, prompt, options)
            .await
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Read a family's token file in its vendor-specific schema.
fn read_token_file(family: SubscriptionFamily, path: &std::path::Path) -> Result<TokenSet> {
    let body = std::fs::read_to_string(path).map_err(|e| {
        HydraError::Auth(format!(
            "cannot read {} token file {}: {e}",
            family.key(),
            path.display()
        ))
    })?;
    let value: Value = serde_json::from_str(&body)?;

    let missing = || HydraError::Auth(format!("{} token file malformed", family.key()));
    match family {
        SubscriptionFamily::Claude => {
            let oauth = value.get("claudeAiOauth").ok_or_else(missing)?;
            Ok(TokenSet {
                access_token: oauth
                    .get("accessToken")
                    .and_then(Value::as_str)
                    .ok_or_else(missing)?
                    .to_string(),
                refresh_token: oauth
                    .get("refreshToken")
                    .and_then(Value::as_str)
                    .ok_or_else(missing)?
                    .to_string(),
                expires_at_ms: oauth.get("expiresAt").and_then(Value::as_u64).unwrap_or(0),
            })
        }
        SubscriptionFamily::Codex => {
            let tokens = value.get("tokens").ok_or_else(missing)?;
            Ok(TokenSet {
                access_token: tokens
                    .get("access_token")
                    .and_then(Value::as_str)
                    .ok_or_else(missing)?
                    .to_string(),
                refresh_token: tokens
                    .get("refresh_token")
                    .and_then(Value::as_str)
                    .ok_or_else(missing)?
                    .to_string(),
                // The codex schema carries no expiry; force a refresh on
                // first use after load.
                expires_at_ms: value
                    .get("expires_at_ms")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
            })
        }
        SubscriptionFamily::Gemini => Ok(TokenSet {
            access_token: value
                .get("access_token")
                .and_then(Value::as_str)
                .ok_or_else(missing)?
                .to_string(),
            refresh_token: value
                .get("refresh_token")
                .and_then(Value::as_str)
                .ok_or_else(missing)?
                .to_string(),
            expires_at_ms: value.get("expiry_date").and_then(Value::as_u64).unwrap_or(0),
        }),
    }
}

/// Rewrite a family's token file in place (temp file + rename).
fn persist_token_file(
    family: SubscriptionFamily,
    path: &std::path::Path,
    tokens: &TokenSet,
) -> Result<()> {
    let body = match family {
        SubscriptionFamily::Claude => json!({
            "claudeAiOauth": {
                "accessToken": tokens.access_token,
                "refreshToken": tokens.refresh_token,
                "expiresAt": tokens.expires_at_ms,
            }
        }),
        SubscriptionFamily::Codex => json!({
            "tokens": {
                "access_token": tokens.access_token,
                "refresh_token": tokens.refresh_token,
            },
            "expires_at_ms": tokens.expires_at_ms,
        }),
        SubscriptionFamily::Gemini => json!({
            "access_token": tokens.access_token,
            "refresh_token": tokens.refresh_token,
            "expiry_date": tokens.expires_at_ms,
        }),
    };

    let tmp = path.with_extension("tmp");
    if let Err(e) = std::fs::write(&tmp, serde_json::to_string_pretty(&body)?)
        .and_then(|()| std::fs::rename(&tmp, path))
    {
        warn!(family = family.key(), error = %e, "failed to persist refreshed tokens");
        return Err(e.into());
    }
    Ok(())
}

/// Pull content, reasoning, and usage out of a family's response body.
fn extract_by_family(
    family: SubscriptionFamily,
    value: &Value,
) -> (String, Option<String>, Option<Usage>) {
    match family {
        SubscriptionFamily::Codex => {
            let content = value
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let reasoning = value
                .pointer("/choices/0/message/reasoning_content")
                .and_then(Value::as_str)
                .map(str::to_string);
            let usage = value.get("usage").map(|u| Usage {
                prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
                completion_tokens: u
                    .get("completion_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32,
                total_tokens: u.get("total_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            });
            (content, reasoning, usage)
        }
        SubscriptionFamily::Claude => {
            let mut content = String::new();
            let mut reasoning = String::new();
            if let Some(blocks) = value.get("content").and_then(Value::as_array) {
                for block in blocks {
                    match block.get("type").and_then(Value::as_str) {
                        Some("text") => {
                            content.push_str(block.get("text").and_then(Value::as_str).unwrap_or(""))
                        }
                        Some("thinking") => reasoning
                            .push_str(block.get("thinking").and_then(Value::as_str).unwrap_or("")),
                        _ => {}
                    }
                }
            }
            let usage = value.get("usage").map(|u| {
                Usage::new(
                    u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
                    u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
                )
            });
            (
                content,
                (!reasoning.is_empty()).then_some(reasoning),
                usage,
            )
        }
        SubscriptionFamily::Gemini => {
            let content = value
                .pointer("/candidates/0/content/parts")
                .and_then(Value::as_array)
                .map(|parts| {
                    parts
                        .iter()
                        .filter_map(|p| p.get("text").and_then(Value::as_str))
                        .collect::<String>()
                })
                .unwrap_or_default();
            let usage = value.get("usageMetadata").map(|u| Usage {
                prompt_tokens: u
                    .get("promptTokenCount")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32,
                completion_tokens: u
                    .get("candidatesTokenCount")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32,
                total_tokens: u
                    .get("totalTokenCount")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32,
            });
            (content, None, usage)
        }
    }
}
