//! Subscription backend: token refresh, on-disk persistence, dispatch.

mod common;

use hydramcp::backends::{SubscriptionBackend, SubscriptionFamily};
use hydramcp::{Backend, HydraError, QueryOptions};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_claude_tokens(dir: &tempfile::TempDir, expires_at_ms: u64) -> std::path::PathBuf {
    let token_path = dir.path().join("credentials.json");
    std::fs::write(
        &token_path,
        json!({
            "claudeAiOauth": {
                "accessToken": "stale-access",
                "refreshToken": "refresh-1",
                "expiresAt": expires_at_ms,
            }
        })
        .to_string(),
    )
    .unwrap();
    token_path
}

fn far_future_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
        + 3_600_000
}

#[tokio::test]
async fn expired_token_is_refreshed_and_persisted() {
    let api = MockServer::start().await;
    let auth = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let token_path = write_claude_tokens(&dir, 0); // unknown expiry forces refresh

    Mock::given(method("POST"))
        .and(path("/v1/oauth/token"))
        .and(body_partial_json(json!({
            "grant_type": "refresh_token",
            "refresh_token": "refresh-1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-access",
            "refresh_token": "refresh-2",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&auth)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(wiremock::matchers::header("authorization", "Bearer fresh-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "answered on the subscription plan"}],
            "usage": {"input_tokens": 5, "output_tokens": 6}
        })))
        .expect(1)
        .mount(&api)
        .await;

    let backend = SubscriptionBackend::new("subscription")
        .family(SubscriptionFamily::Claude, &token_path)
        .token_endpoint(SubscriptionFamily::Claude, format!("{}/v1/oauth/token", auth.uri()))
        .api_base_url(SubscriptionFamily::Claude, api.uri());

    let response = backend
        .query("claude-opus-4-1", "hello", &QueryOptions::default().max_tokens(64))
        .await
        .unwrap();
    assert_eq!(response.content, "answered on the subscription plan");

    // The token file was rewritten in place with the rotated tokens.
    let persisted: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&token_path).unwrap()).unwrap();
    assert_eq!(persisted["claudeAiOauth"]["accessToken"], "fresh-access");
    assert_eq!(persisted["claudeAiOauth"]["refreshToken"], "refresh-2");
}

#[tokio::test]
async fn fresh_token_skips_the_refresh_endpoint() {
    let api = MockServer::start().await;
    let auth = MockServer::start().await; // no refresh mock: any call would 404
    let dir = tempfile::tempdir().unwrap();
    let token_path = write_claude_tokens(&dir, far_future_ms());

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(wiremock::matchers::header("authorization", "Bearer stale-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "no refresh was necessary"}],
            "usage": {"input_tokens": 5, "output_tokens": 6}
        })))
        .expect(1)
        .mount(&api)
        .await;

    let backend = SubscriptionBackend::new("subscription")
        .family(SubscriptionFamily::Claude, &token_path)
        .token_endpoint(SubscriptionFamily::Claude, format!("{}/v1/oauth/token", auth.uri()))
        .api_base_url(SubscriptionFamily::Claude, api.uri());

    let response = backend
        .query("claude-opus-4-1", "hello", &QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(response.content, "no refresh was necessary");
}

#[tokio::test]
async fn failed_refresh_is_an_auth_error() {
    let auth = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let token_path = write_claude_tokens(&dir, 0);

    Mock::given(method("POST"))
        .and(path("/v1/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&auth)
        .await;

    let backend = SubscriptionBackend::new("subscription")
        .family(SubscriptionFamily::Claude, &token_path)
        .token_endpoint(SubscriptionFamily::Claude, format!("{}/v1/oauth/token", auth.uri()));

    let err = backend
        .query("claude-opus-4-1", "hello", &QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, HydraError::Auth(_)));
}

#[tokio::test]
async fn unknown_model_is_a_routing_error() {
    let dir = tempfile::tempdir().unwrap();
    let token_path = write_claude_tokens(&dir, far_future_ms());
    let backend = SubscriptionBackend::new("subscription")
        .family(SubscriptionFamily::Claude, &token_path);

    let err = backend
        .query("gpt-4o", "hello", &QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, HydraError::Routing { .. }));
}

#[tokio::test]
async fn catalog_lists_only_families_with_token_files() {
    let dir = tempfile::tempdir().unwrap();
    let token_path = write_claude_tokens(&dir, far_future_ms());

    let backend = SubscriptionBackend::new("subscription")
        .family(SubscriptionFamily::Claude, &token_path)
        .family(SubscriptionFamily::Codex, dir.path().join("missing-auth.json"));

    let models = backend.list_models().await.unwrap();
    assert!(models.iter().any(|m| m.id.starts_with("claude-")));
    assert!(!models.iter().any(|m| m.id.starts_with("gpt-")));
}

#[tokio::test]
async fn health_check_requires_a_readable_token_file() {
    let dir = tempfile::tempdir().unwrap();
    let token_path = write_claude_tokens(&dir, far_future_ms());
    let healthy = SubscriptionBackend::new("subscription")
        .family(SubscriptionFamily::Claude, &token_path);
    assert!(healthy.health_check().await);

    let unhealthy = SubscriptionBackend::new("subscription")
        .family(SubscriptionFamily::Claude, dir.path().join("nope.json"));
    assert!(!unhealthy.health_check().await);
}
