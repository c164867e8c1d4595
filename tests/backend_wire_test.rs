//! Wire-format tests against wiremock: request shapes, response
//! normalization, error taxonomy, and retry behaviour.

mod common;

use std::time::Duration;

use hydramcp::backends::{ChatCompletionsBackend, GenerateContentBackend, MessagesBackend};
use hydramcp::util::retry::RetryConfig;
use hydramcp::{Backend, HydraError, QueryOptions};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn no_retry() -> RetryConfig {
    RetryConfig::disabled()
}

// =========================================================================
// Chat-completions shape
// =========================================================================

#[tokio::test]
async fn chat_completions_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o",
            "temperature": 0.5,
            "max_tokens": 256,
            "messages": [
                {"role": "system", "content": "be terse"},
                {"role": "user", "content": "hello"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"content": "a sufficiently long reply"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 6, "total_tokens": 18}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = ChatCompletionsBackend::openai("openai", "sk-test")
        .base_url(server.uri())
        .retry(no_retry());
    let options = QueryOptions::default()
        .system_prompt("be terse")
        .temperature(0.5)
        .max_tokens(256);
    let response = backend.query("gpt-4o", "hello", &options).await.unwrap();

    assert_eq!(response.content, "a sufficiently long reply");
    assert_eq!(response.usage.unwrap().total_tokens, 18);
}

#[tokio::test]
async fn reasoning_model_sends_both_token_caps() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "o3-mini",
            "max_tokens": 4096,
            "max_completion_tokens": 4096
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "reasoned out a full answer"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = ChatCompletionsBackend::openai("openai", "sk-test")
        .base_url(server.uri())
        .retry(no_retry());
    let options = QueryOptions::default().max_tokens(512);
    backend.query("o3-mini", "think hard", &options).await.unwrap();
}

#[tokio::test]
async fn empty_content_with_reasoning_is_substituted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {
                "content": "",
                "reasoning_content": "chain of thought that never concluded"
            }}]
        })))
        .mount(&server)
        .await;

    let backend = ChatCompletionsBackend::openai("openai", "sk-test")
        .base_url(server.uri())
        .retry(no_retry());
    let response = backend
        .query("o3-mini", "p", &QueryOptions::default())
        .await
        .unwrap();
    assert!(response.content.contains("chain of thought"));
    assert!(response.warning.is_some());
}

#[tokio::test]
async fn short_content_without_reasoning_is_empty_response_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "ok"}}]
        })))
        .mount(&server)
        .await;

    let backend = ChatCompletionsBackend::openai("openai", "sk-test")
        .base_url(server.uri())
        .retry(no_retry());
    let err = backend
        .query("gpt-4o", "p", &QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, HydraError::EmptyResponse));
}

#[tokio::test]
async fn auth_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = ChatCompletionsBackend::openai("openai", "sk-bad")
        .base_url(server.uri())
        .retry(RetryConfig::new().max_retries(3).initial_delay(Duration::from_millis(1)));
    let err = backend
        .query("gpt-4o", "p", &QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, HydraError::Auth(_)));
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("flaky"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "recovered on the third try"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = ChatCompletionsBackend::openai("openai", "sk-test")
        .base_url(server.uri())
        .retry(RetryConfig::new().max_retries(2).initial_delay(Duration::from_millis(1)));
    let response = backend
        .query("gpt-4o", "p", &QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(response.content, "recovered on the third try");
}

#[tokio::test]
async fn ollama_native_maps_eval_counts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"model": "qwen2.5", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "local model says hello"},
            "done_reason": "stop",
            "prompt_eval_count": 9,
            "eval_count": 4
        })))
        .mount(&server)
        .await;

    let backend = ChatCompletionsBackend::ollama("ollama")
        .base_url(server.uri())
        .retry(no_retry());
    let response = backend
        .query("qwen2.5", "hi", &QueryOptions::default())
        .await
        .unwrap();
    let usage = response.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 9);
    assert_eq!(usage.completion_tokens, 4);
    assert_eq!(usage.total_tokens, 13);
}

#[tokio::test]
async fn ollama_list_models_uses_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "qwen2.5:7b"}, {"name": "phi3:mini"}]
        })))
        .mount(&server)
        .await;

    let backend = ChatCompletionsBackend::ollama("ollama").base_url(server.uri());
    let models = backend.list_models().await.unwrap();
    let ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["qwen2.5:7b", "phi3:mini"]);
}

// =========================================================================
// Messages shape
// =========================================================================

#[tokio::test]
async fn messages_round_trip_with_system_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 1024,
            "system": "be helpful",
            "messages": [{"role": "user", "content": "hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"type": "text", "text": "a content-block based reply"},
                {"type": "thinking", "thinking": "private deliberation"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 7}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = MessagesBackend::new("anthropic", "sk-ant")
        .base_url(server.uri())
        .retry(no_retry());
    // max_tokens is mandatory on this wire: the default applies when unset.
    let options = QueryOptions::default().system_prompt("be helpful");
    let response = backend
        .query("claude-sonnet-4-5", "hello", &options)
        .await
        .unwrap();

    assert_eq!(response.content, "a content-block based reply");
    assert_eq!(response.reasoning_content.as_deref(), Some("private deliberation"));
    let usage = response.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 10);
    assert_eq!(usage.completion_tokens, 7);
    assert_eq!(usage.total_tokens, 17);
}

#[tokio::test]
async fn messages_catalog_falls_back_to_static_list() {
    // No mock for /v1/models: the request fails and the static catalog
    // stands in.
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let backend = MessagesBackend::new("anthropic", "sk-ant").base_url(server.uri());
    let models = backend.list_models().await.unwrap();
    assert!(!models.is_empty());
    assert!(models.iter().any(|m| m.id.starts_with("claude-")));
}

// =========================================================================
// Generate-content shape
// =========================================================================

#[tokio::test]
async fn generate_content_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .and(query_param("key", "g-key"))
        .and(body_partial_json(json!({
            "contents": [{"role": "user", "parts": [{"text": "hello"}]}],
            "systemInstruction": {"parts": [{"text": "be brief"}]},
            "generationConfig": {"temperature": 0.1, "maxOutputTokens": 128}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"parts": [{"text": "a parts-based model reply"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 8,
                "candidatesTokenCount": 5,
                "totalTokenCount": 13
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = GenerateContentBackend::new("gemini", "g-key")
        .base_url(server.uri())
        .retry(no_retry());
    let options = QueryOptions::default()
        .system_prompt("be brief")
        .temperature(0.1)
        .max_tokens(128);
    let response = backend
        .query("gemini-2.5-flash", "hello", &options)
        .await
        .unwrap();

    assert_eq!(response.content, "a parts-based model reply");
    assert_eq!(response.usage.unwrap().total_tokens, 13);
}

#[tokio::test]
async fn generate_content_listing_paginates_and_filters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models"))
        .and(query_param("pageToken", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{
                "name": "models/gemini-2.5-pro",
                "displayName": "Gemini 2.5 Pro",
                "supportedGenerationMethods": ["generateContent"]
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {
                    "name": "models/gemini-2.5-flash",
                    "displayName": "Gemini 2.5 Flash",
                    "supportedGenerationMethods": ["generateContent"]
                },
                {
                    "name": "models/text-embedding-004",
                    "displayName": "Embeddings",
                    "supportedGenerationMethods": ["embedContent"]
                }
            ],
            "nextPageToken": "page2"
        })))
        .mount(&server)
        .await;

    let backend = GenerateContentBackend::new("gemini", "g-key").base_url(server.uri());
    let models = backend.list_models().await.unwrap();
    let ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["gemini-2.5-flash", "gemini-2.5-pro"]);
}

#[tokio::test]
async fn health_check_fails_closed_on_unreachable_host() {
    let backend =
        ChatCompletionsBackend::openai("openai", "sk").base_url("http://127.0.0.1:1");
    assert!(!backend.health_check().await);
}
