//! Remote executors always produce a result, falling back to the local handler.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use storyloop_a2a::{handler_fn, serve_with_shutdown, AgentService, Payload};
use storyloop_core::{
    build_executor, A2aSettings, AgentDefinition, ExecutionStrategy, Orchestrator,
    PipelineConfig, Role, Story, StoryStatus, StoryStore,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

fn remote_settings(role: Role, url: &str) -> A2aSettings {
    let mut settings = A2aSettings {
        execution_mode: ExecutionStrategy::Remote,
        timeout_secs: 2,
        ..Default::default()
    };
    settings.agents.insert(
        role.as_str().to_string(),
        AgentDefinition {
            url: Some(url.to_string()),
            ..Default::default()
        },
    );
    settings
}

fn local_qa() -> Arc<dyn storyloop_a2a::SkillHandler> {
    handler_fn(|_| async { Ok(json!({"status": "pass", "via": "local"})) })
}

/// Serve a QA agent whose skill passes, or fails when `fail` is set.
async fn spawn_qa_agent(fail: bool) -> (String, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    let service = AgentService::new(Role::Qa.card(&url)).with_handler(
        Role::Qa.default_skill(),
        handler_fn(move |_: Payload| async move {
            if fail {
                anyhow::bail!("pytest crashed");
            }
            Ok(json!({"status": "pass", "via": "remote"}))
        }),
    );
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(serve_with_shutdown(service, listener, async {
        let _ = rx.await;
    }));
    (url, tx)
}

#[tokio::test]
async fn unreachable_agent_answers_from_local_handler() {
    let settings = remote_settings(Role::Qa, "http://127.0.0.1:9/");
    let exec = build_executor(Role::Qa, Some(local_qa()), &settings);
    assert_eq!(exec.kind(), "remote");

    let result = tokio::time::timeout(Duration::from_secs(10), exec.execute(Payload::new()))
        .await
        .unwrap();
    assert_eq!(result.get("via"), Some(&json!("local")));
}

#[tokio::test]
async fn healthy_agent_result_is_returned() {
    let (url, _stop) = spawn_qa_agent(false).await;
    let exec = build_executor(Role::Qa, Some(local_qa()), &remote_settings(Role::Qa, &url));

    let result = exec.execute(Payload::new()).await;
    assert_eq!(result.get("via"), Some(&json!("remote")));
}

#[tokio::test]
async fn agent_error_falls_back() {
    let (url, _stop) = spawn_qa_agent(true).await;
    let exec = build_executor(Role::Qa, Some(local_qa()), &remote_settings(Role::Qa, &url));

    let result = exec.execute(Payload::new()).await;
    assert_eq!(result.get("via"), Some(&json!("local")));
}

/// Serve a peer that answers `/health` with `health` and counts `/jsonrpc` calls.
async fn spawn_unhealthy_peer(health: (StatusCode, Value)) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    let rpc_calls = Arc::new(AtomicUsize::new(0));
    let counter = rpc_calls.clone();
    let app = Router::new()
        .route(
            "/health",
            get(move || {
                let (status, body) = health.clone();
                async move { (status, Json(body)) }
            }),
        )
        .route(
            "/jsonrpc",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"jsonrpc": "2.0", "id": 1, "result": {"status": "pass", "via": "remote"}}))
                }
            }),
        );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (url, rpc_calls)
}

#[tokio::test]
async fn peer_reporting_down_is_bypassed() {
    let (url, rpc_calls) = spawn_unhealthy_peer((StatusCode::OK, json!({"status": "down"}))).await;
    let exec = build_executor(Role::Qa, Some(local_qa()), &remote_settings(Role::Qa, &url));

    let result = exec.execute(Payload::new()).await;

    assert_eq!(result.get("via"), Some(&json!("local")));
    assert_eq!(rpc_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn peer_answering_503_is_bypassed() {
    let (url, rpc_calls) =
        spawn_unhealthy_peer((StatusCode::SERVICE_UNAVAILABLE, json!({"status": "ok"}))).await;
    let exec = build_executor(Role::Qa, Some(local_qa()), &remote_settings(Role::Qa, &url));

    let result = exec.execute(Payload::new()).await;

    assert_eq!(result.get("via"), Some(&json!("local")));
    assert_eq!(rpc_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_fallback_still_yields_a_result() {
    let exec = build_executor(Role::Qa, None, &remote_settings(Role::Qa, "http://127.0.0.1:9/"));
    let result = exec.execute(Payload::new()).await;
    assert!(!result.is_ok());
    assert!(result.error_message().is_some());
}

#[tokio::test]
async fn engine_completes_story_through_remote_qa_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::default();
    config.paths.stories = dir.path().join("stories.yaml");
    config.paths.notes = dir.path().join("NOTES.md");
    config.paths.artifacts = dir.path().join("artifacts");
    config.a2a = remote_settings(Role::Qa, "http://127.0.0.1:9/");
    config.a2a.execution_mode = ExecutionStrategy::Local;
    config.a2a.agents.get_mut("qa").unwrap().strategy = Some(ExecutionStrategy::Remote);

    let store = StoryStore::new(&config.paths.stories);
    store.persist(&[Story::new("S1")]).unwrap();

    let mut registry = storyloop_core::HandlerRegistry::new();
    registry.insert(
        Role::Developer,
        handler_fn(|_| async { Ok::<Value, anyhow::Error>(json!({"status": "ok"})) }),
    );
    registry.insert(Role::Qa, local_qa());

    let mut engine = Orchestrator::from_config(&config, &registry);
    engine.run_iteration(1).await.unwrap();

    assert_eq!(store.load()[0].status, StoryStatus::Done);
}
