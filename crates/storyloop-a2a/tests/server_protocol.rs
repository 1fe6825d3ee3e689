//! Endpoint-level tests for the agent server's validation pipeline.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{json, Value};
use storyloop_a2a::{
    build_router, handler_fn, AgentCard, AgentService, AgentSkill, ErrorCode, Payload,
};
use tower::util::ServiceExt;

fn qa_service() -> AgentService {
    let card = AgentCard::new(
        "QA Agent",
        "Validates implementation quality via automated checks.",
        "http://localhost:8005/",
        "0.2.0",
    )
    .with_skill(AgentSkill::json(
        "run_quality_checks",
        "Run Quality Checks",
        "Executes test suites and reports findings.",
    ))
    .with_skill(AgentSkill::json("explode", "Explode", "Always fails"));

    AgentService::new(card)
        .with_handler(
            "run_quality_checks",
            handler_fn(|payload: Payload| async move {
                Ok(json!({
                    "status": "pass",
                    "story": payload.get("story_id").cloned().unwrap_or(Value::Null),
                }))
            }),
        )
        .with_handler(
            "explode",
            handler_fn(|_| async { Err::<Value, _>(anyhow::anyhow!("pytest binary missing")) }),
        )
}

async fn post_jsonrpc(body: String) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::POST)
        .uri("/jsonrpc")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let resp = build_router(qa_service()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn assert_rpc_error(body: &Value, code: ErrorCode) {
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["error"]["code"], code.code());
    assert!(body.get("result").is_none());
}

#[tokio::test]
async fn health_reports_ok() {
    let req = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let resp = build_router(qa_service()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn agent_card_lists_skills() {
    let req = Request::builder()
        .method(Method::GET)
        .uri("/.well-known/agent-card.json")
        .body(Body::empty())
        .unwrap();
    let resp = build_router(qa_service()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let card: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(card["name"], "QA Agent");
    assert_eq!(card["skills"][0]["id"], "run_quality_checks");
    assert_eq!(card["default_output_modes"][0], "application/json");
}

#[tokio::test]
async fn successful_call_returns_handler_result() {
    let (status, body) = post_jsonrpc(
        json!({
            "jsonrpc": "2.0", "id": "req-1", "method": "message/send",
            "params": {"skill_id": "run_quality_checks", "payload": {"story_id": "S1"}}
        })
        .to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "req-1");
    assert_eq!(body["result"], json!({"status": "pass", "story": "S1"}));
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn wrong_version_is_invalid_request() {
    let (status, body) = post_jsonrpc(
        json!({
            "jsonrpc": "1.0", "id": 1, "method": "message/send",
            "params": {"skill_id": "run_quality_checks", "payload": {}}
        })
        .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_rpc_error(&body, ErrorCode::InvalidRequest);
    assert_eq!(body["id"], 1);
}

#[tokio::test]
async fn version_is_checked_before_method() {
    let (status, body) = post_jsonrpc(json!({"id": 1, "method": "tasks/get"}).to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_rpc_error(&body, ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn unknown_method_is_not_found() {
    let (status, body) = post_jsonrpc(
        json!({"jsonrpc": "2.0", "id": 2, "method": "tasks/get", "params": {}}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_rpc_error(&body, ErrorCode::MethodNotFound);
}

#[tokio::test]
async fn non_string_skill_id_is_invalid_params() {
    let (status, body) = post_jsonrpc(
        json!({
            "jsonrpc": "2.0", "id": 3, "method": "message/send",
            "params": {"skill_id": 7, "payload": {}}
        })
        .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_rpc_error(&body, ErrorCode::InvalidParams);
}

#[tokio::test]
async fn missing_params_is_invalid_params() {
    let (status, body) = post_jsonrpc(
        json!({"jsonrpc": "2.0", "id": 3, "method": "message/send"}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_rpc_error(&body, ErrorCode::InvalidParams);
}

#[tokio::test]
async fn unregistered_skill_is_not_found() {
    let (status, body) = post_jsonrpc(
        json!({
            "jsonrpc": "2.0", "id": 4, "method": "message/send",
            "params": {"skill_id": "deploy", "payload": {}}
        })
        .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_rpc_error(&body, ErrorCode::MethodNotFound);
    assert!(body["error"]["message"].as_str().unwrap().contains("deploy"));
}

#[tokio::test]
async fn skill_is_resolved_before_payload_is_checked() {
    let (status, body) = post_jsonrpc(
        json!({
            "jsonrpc": "2.0", "id": 5, "method": "message/send",
            "params": {"skill_id": "deploy", "payload": "not-an-object"}
        })
        .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_rpc_error(&body, ErrorCode::MethodNotFound);
}

#[tokio::test]
async fn non_object_payload_is_invalid_params() {
    let (status, body) = post_jsonrpc(
        json!({
            "jsonrpc": "2.0", "id": 6, "method": "message/send",
            "params": {"skill_id": "run_quality_checks", "payload": ["a"]}
        })
        .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_rpc_error(&body, ErrorCode::InvalidParams);
}

#[tokio::test]
async fn handler_failure_is_internal_error_with_detail() {
    let (status, body) = post_jsonrpc(
        json!({
            "jsonrpc": "2.0", "id": 7, "method": "message/send",
            "params": {"skill_id": "explode", "payload": {}}
        })
        .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_rpc_error(&body, ErrorCode::InternalError);
    assert!(body["error"]["data"]["detail"]
        .as_str()
        .unwrap()
        .contains("pytest binary missing"));
}

#[tokio::test]
async fn garbage_body_is_parse_error() {
    let (status, body) = post_jsonrpc("{\"jsonrpc\": ".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_rpc_error(&body, ErrorCode::ParseError);
    assert_eq!(body["id"], Value::Null);
}
