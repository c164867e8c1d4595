//! session_recap tool: two-pass flow with graceful degradation.

mod common;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use common::{ok_response, smart, MockBackend};
use hydramcp::session::SessionReader;
use hydramcp::tools::{dispatch, ToolContext};
use serde_json::json;

fn write_transcript(dir: &Path, name: &str) {
    let mut f = std::fs::File::create(dir.join(name)).unwrap();
    writeln!(
        f,
        r#"{{"role": "user", "content": "please add retry logic to the fetcher"}}"#
    )
    .unwrap();
    writeln!(
        f,
        r#"{{"role": "assistant", "content": "added exponential backoff in fetch.rs"}}"#
    )
    .unwrap();
}

fn sessions_fixture() -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    let project = root.path().join("myproj");
    std::fs::create_dir(&project).unwrap();
    write_transcript(&project, "s1.jsonl");
    write_transcript(&project, "s2.jsonl");
    root
}

fn ctx_with_sessions(backend: Arc<MockBackend>, root: &tempfile::TempDir) -> ToolContext {
    ToolContext {
        smart: smart(backend),
        sessions: Some(SessionReader::new(root.path())),
    }
}

const TRIAGE_JSON: &str = r#"{"files_modified": 3, "decisions_made": 2, "errors_resolved": 1,
"features_built": 1, "unfinished_work": 2, "total_meaningful_events": 9}"#;

#[tokio::test]
async fn two_pass_recap_emits_summary_with_header() {
    // Script: first call is the triage, second is the recap.
    let backend = Arc::new(
        MockBackend::new("mock")
            .respond("writer", ok_response("writer", TRIAGE_JSON, 60, (500, 40)))
            .respond(
                "writer",
                ok_response("writer", "## What happened\n\nRetry logic landed.", 120, (500, 80)),
            ),
    );
    let root = sessions_fixture();
    let ctx = ctx_with_sessions(backend.clone(), &root);

    let output = dispatch(
        &ctx,
        "session_recap",
        json!({"project": "myproj", "model": "writer"}),
    )
    .await;

    assert!(!output.is_error, "got: {}", output.text);
    assert!(output.text.contains("# Session recap"));
    assert!(output.text.contains("2 session(s)"));
    assert!(output.text.contains("Retry logic landed"));
    assert_eq!(backend.calls_for("writer"), 2);
}

#[tokio::test]
async fn recap_failure_with_triage_success_emits_partial() {
    let backend = Arc::new(
        MockBackend::new("mock")
            .respond("writer", ok_response("writer", TRIAGE_JSON, 60, (500, 40)))
            .fail("writer", 500, "recap pass died"),
    );
    let root = sessions_fixture();
    let ctx = ctx_with_sessions(backend, &root);

    let output = dispatch(
        &ctx,
        "session_recap",
        json!({"project": "myproj", "model": "writer"}),
    )
    .await;

    assert!(!output.is_error);
    assert!(output.text.contains("(partial)"));
    assert!(output.text.contains("Files modified: 3"));
    assert!(output.text.contains("Unfinished work: 2"));
}

#[tokio::test]
async fn both_passes_failing_emits_recovery_message() {
    let backend = Arc::new(
        MockBackend::new("mock")
            .fail("writer", 500, "triage died")
            .fail("writer", 500, "recap died"),
    );
    let root = sessions_fixture();
    let ctx = ctx_with_sessions(backend, &root);

    let output = dispatch(
        &ctx,
        "session_recap",
        json!({"project": "myproj", "model": "writer"}),
    )
    .await;

    assert!(!output.is_error);
    assert!(output.text.contains("Recap unavailable"));
    assert!(output.text.contains("**Recovery:**"));
}

#[tokio::test]
async fn unparseable_triage_still_produces_a_recap() {
    let backend = Arc::new(
        MockBackend::new("mock")
            .respond("writer", ok_response("writer", "no json in this reply at all", 60, (500, 40)))
            .respond(
                "writer",
                ok_response("writer", "Recap written despite empty triage.", 120, (500, 80)),
            ),
    );
    let root = sessions_fixture();
    let ctx = ctx_with_sessions(backend, &root);

    let output = dispatch(
        &ctx,
        "session_recap",
        json!({"project": "myproj", "model": "writer"}),
    )
    .await;

    assert!(!output.is_error);
    assert!(output.text.contains("Recap written despite empty triage"));
}

#[tokio::test]
async fn session_count_bounds_are_validated() {
    let root = sessions_fixture();
    let ctx = ctx_with_sessions(Arc::new(MockBackend::new("mock").model("writer")), &root);

    let output = dispatch(
        &ctx,
        "session_recap",
        json!({"project": "myproj", "sessions": 11}),
    )
    .await;
    assert!(output.is_error);
    assert!(output.text.contains("1-10"));
}

#[tokio::test]
async fn missing_sessions_dir_is_configuration_error() {
    let backend = Arc::new(MockBackend::new("mock").model("writer"));
    let ctx = ToolContext {
        smart: smart(backend),
        sessions: None,
    };
    let output = dispatch(&ctx, "session_recap", json!({})).await;
    assert!(output.is_error);
    assert!(output.text.contains("transcript directory"));
}
