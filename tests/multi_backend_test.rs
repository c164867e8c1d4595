//! MultiBackend routing: prefix dispatch, bare-ID iteration, catalog
//! aggregation, and fallback chains.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{ok_response, MockBackend};
use hydramcp::backends::MultiBackend;
use hydramcp::{Backend, HydraError, QueryOptions};

fn options() -> QueryOptions {
    QueryOptions::default().max_tokens(64)
}

// =========================================================================
// Routing (scenario: routing prefix wins over auto)
// =========================================================================

#[tokio::test]
async fn prefixed_id_dispatches_exclusively() {
    let openai = Arc::new(MockBackend::new("openai").respond(
        "qwen",
        ok_response("qwen", "from openai, oddly enough", 50, (1, 1)),
    ));
    let ollama = Arc::new(MockBackend::new("ollama").respond(
        "qwen",
        ok_response("qwen", "from the local daemon", 80, (1, 1)),
    ));
    let multi = MultiBackend::new()
        .register("openai", openai.clone() as Arc<dyn Backend>)
        .register("ollama", ollama.clone() as Arc<dyn Backend>);

    let response = multi.query("ollama/qwen", "p", &options()).await.unwrap();
    assert_eq!(response.content, "from the local daemon");
    assert_eq!(openai.calls(), 0);
    assert_eq!(ollama.calls(), 1);
}

#[tokio::test]
async fn bare_id_tries_registration_order_first_success_wins() {
    // openai does not serve "qwen" (404); ollama does.
    let openai = Arc::new(MockBackend::new("openai").model("gpt-4o"));
    let ollama = Arc::new(MockBackend::new("ollama").respond(
        "qwen",
        ok_response("qwen", "served by the second backend", 80, (1, 1)),
    ));
    let multi = MultiBackend::new()
        .register("openai", openai.clone() as Arc<dyn Backend>)
        .register("ollama", ollama.clone() as Arc<dyn Backend>);

    let response = multi.query("qwen", "p", &options()).await.unwrap();
    assert_eq!(response.content, "served by the second backend");
    assert_eq!(openai.calls(), 1);
    assert_eq!(ollama.calls(), 1);
}

#[tokio::test]
async fn unknown_provider_prefix_is_routing_error() {
    let multi = MultiBackend::new().register(
        "openai",
        Arc::new(MockBackend::new("openai")) as Arc<dyn Backend>,
    );
    let err = multi.query("mystery/model", "p", &options()).await.unwrap_err();
    match err {
        HydraError::Routing { detail, .. } => assert!(detail.contains("mystery")),
        other => panic!("expected Routing, got {other:?}"),
    }
}

#[tokio::test]
async fn all_backends_failing_accumulates_messages() {
    let multi = MultiBackend::new()
        .register(
            "a",
            Arc::new(MockBackend::new("a").fail("m", 500, "a exploded")) as Arc<dyn Backend>,
        )
        .register(
            "b",
            Arc::new(MockBackend::new("b").fail("m", 503, "b overloaded")) as Arc<dyn Backend>,
        );

    let err = multi.query("m", "p", &options()).await.unwrap_err();
    match err {
        HydraError::Routing { detail, .. } => {
            assert!(detail.contains("a exploded"));
            assert!(detail.contains("b overloaded"));
        }
        other => panic!("expected Routing, got {other:?}"),
    }
}

#[tokio::test]
async fn routing_is_deterministic_for_identical_ids() {
    let first = Arc::new(MockBackend::new("first").respond(
        "shared",
        ok_response("shared", "always from the first", 10, (1, 1)),
    ));
    let second = Arc::new(MockBackend::new("second").respond(
        "shared",
        ok_response("shared", "never reached at all", 10, (1, 1)),
    ));
    let multi = MultiBackend::new()
        .register("first", first as Arc<dyn Backend>)
        .register("second", second.clone() as Arc<dyn Backend>);

    for _ in 0..3 {
        let response = multi.query("shared", "p", &options()).await.unwrap();
        assert_eq!(response.content, "always from the first");
    }
    assert_eq!(second.calls(), 0);
}

// =========================================================================
// Catalog aggregation
// =========================================================================

#[tokio::test]
async fn list_models_prefixes_and_skips_failing_backends() {
    let multi = MultiBackend::new()
        .register(
            "openai",
            Arc::new(MockBackend::new("openai").model("gpt-4o")) as Arc<dyn Backend>,
        )
        .register(
            "broken",
            Arc::new(MockBackend::new("broken").model("ghost").listing_fails())
                as Arc<dyn Backend>,
        )
        .register(
            "ollama",
            Arc::new(MockBackend::new("ollama").model("qwen")) as Arc<dyn Backend>,
        );

    let ids: Vec<String> = multi
        .list_models()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert!(ids.contains(&"openai/gpt-4o".to_string()));
    assert!(ids.contains(&"ollama/qwen".to_string()));
    assert!(!ids.iter().any(|id| id.contains("ghost")));
}

#[tokio::test]
async fn health_check_true_if_any_backend_healthy() {
    let multi = MultiBackend::new()
        .register(
            "down",
            Arc::new(MockBackend::new("down").unhealthy()) as Arc<dyn Backend>,
        )
        .register("up", Arc::new(MockBackend::new("up")) as Arc<dyn Backend>);
    assert!(multi.health_check().await);

    let all_down = MultiBackend::new().register(
        "down",
        Arc::new(MockBackend::new("down").unhealthy()) as Arc<dyn Backend>,
    );
    assert!(!all_down.health_check().await);
}

// =========================================================================
// Fallback chains
// =========================================================================

fn chains(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
        .collect()
}

#[tokio::test]
async fn fallback_chain_tags_fallback_from() {
    let backend = Arc::new(
        MockBackend::new("mock")
            .fail("primary", 500, "down")
            .respond("alt", ok_response("alt", "the alternative answered", 30, (1, 1))),
    );
    let multi = MultiBackend::new()
        .register("mock", backend as Arc<dyn Backend>)
        .fallback_chains(chains(&[("primary", &["alt"])]));

    let response = multi.query("primary", "p", &options()).await.unwrap();
    assert_eq!(response.content, "the alternative answered");
    assert_eq!(response.fallback_from.as_deref(), Some("primary"));
}

#[tokio::test]
async fn fallback_tries_alternatives_in_order() {
    let backend = Arc::new(
        MockBackend::new("mock")
            .fail("primary", 500, "down")
            .fail("alt1", 500, "also down")
            .respond("alt2", ok_response("alt2", "third time is the charm", 30, (1, 1))),
    );
    let multi = MultiBackend::new()
        .register("mock", backend as Arc<dyn Backend>)
        .fallback_chains(chains(&[("primary", &["alt1", "alt2"])]));

    let response = multi.query("primary", "p", &options()).await.unwrap();
    assert_eq!(response.content, "third time is the charm");
}

#[tokio::test]
async fn fallback_depth_is_capped() {
    // a → b → c → d would need depth 3; the cap is 2, so the chain stops
    // and the primary error surfaces.
    let backend = Arc::new(
        MockBackend::new("mock")
            .fail("a", 500, "a down")
            .fail("b", 500, "b down")
            .fail("c", 500, "c down")
            .respond("d", ok_response("d", "too deep to ever reach", 30, (1, 1))),
    );
    let multi = MultiBackend::new()
        .register("mock", backend.clone() as Arc<dyn Backend>)
        .fallback_chains(chains(&[("a", &["b"]), ("b", &["c"]), ("c", &["d"])]));

    let err = multi.query("a", "p", &options()).await.unwrap_err();
    assert!(matches!(err, HydraError::Routing { .. }));
    assert_eq!(backend.calls_for("d"), 0);
}

#[tokio::test]
async fn no_chain_configured_surfaces_primary_error() {
    let backend = Arc::new(MockBackend::new("mock").fail("m", 500, "down"));
    let multi = MultiBackend::new().register("mock", backend as Arc<dyn Backend>);
    assert!(multi.query("m", "p", &options()).await.is_err());
}
