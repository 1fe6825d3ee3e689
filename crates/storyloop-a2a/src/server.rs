//! Hosting a role as an A2A agent over HTTP.
//!
//! Three endpoints are exposed per agent:
//! - `GET /.well-known/agent-card.json` returns the [`AgentCard`]
//! - `GET /health` returns `{"status":"ok"}`
//! - `POST /jsonrpc` accepts `message/send` calls and dispatches to the
//!   registered [`SkillHandler`]
//!
//! Request validation short-circuits on the first failure, in this order:
//! JSON body, `jsonrpc == "2.0"`, method, `params.skill_id`, skill lookup,
//! `params.payload`, handler invocation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::card::{AgentCard, AGENT_CARD_PATH};
use crate::envelope::{JsonRpcResponse, JSONRPC_VERSION, METHOD_MESSAGE_SEND};
use crate::error::{A2aError, ErrorCode, RpcError};
use crate::handler::{invoke_guarded, SkillHandler};

/// An agent card plus the handlers for its skills.
#[derive(Clone)]
pub struct AgentService {
    card: AgentCard,
    handlers: HashMap<String, Arc<dyn SkillHandler>>,
}

impl AgentService {
    pub fn new(card: AgentCard) -> Self {
        Self {
            card,
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for `skill_id`.
    pub fn with_handler(mut self, skill_id: &str, handler: Arc<dyn SkillHandler>) -> Self {
        self.handlers.insert(skill_id.to_string(), handler);
        self
    }

    pub fn card(&self) -> &AgentCard {
        &self.card
    }

    /// Validate and execute one raw `POST /jsonrpc` body.
    pub async fn dispatch(&self, body: &[u8]) -> (StatusCode, JsonRpcResponse) {
        let request: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                return reject(
                    Value::Null,
                    RpcError::new(ErrorCode::ParseError, format!("invalid JSON body: {e}")),
                )
            }
        };

        let id = request.get("id").cloned().unwrap_or(Value::Null);

        if request.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return reject(
                id,
                RpcError::new(ErrorCode::InvalidRequest, "JSON-RPC 2.0 required"),
            );
        }

        if request.get("method").and_then(Value::as_str) != Some(METHOD_MESSAGE_SEND) {
            return reject(
                id,
                RpcError::new(ErrorCode::MethodNotFound, "Unsupported method"),
            );
        }

        let params = request.get("params");
        let Some(skill_id) = params.and_then(|p| p.get("skill_id")).and_then(Value::as_str)
        else {
            return reject(
                id,
                RpcError::new(ErrorCode::InvalidParams, "skill_id must be a string"),
            );
        };

        let Some(handler) = self.handlers.get(skill_id) else {
            return reject(
                id,
                RpcError::new(
                    ErrorCode::MethodNotFound,
                    format!("Skill '{skill_id}' not found"),
                ),
            );
        };

        let Some(payload) = params
            .and_then(|p| p.get("payload"))
            .and_then(Value::as_object)
        else {
            return reject(
                id,
                RpcError::new(ErrorCode::InvalidParams, "payload must be an object"),
            );
        };

        match invoke_guarded(handler.as_ref(), payload.clone()).await {
            Ok(result) => (StatusCode::OK, JsonRpcResponse::success(id, result)),
            Err(detail) => {
                warn!(skill_id = %skill_id, error = %detail, "skill execution failed");
                reject(
                    id,
                    RpcError::new(ErrorCode::InternalError, "Skill execution failed")
                        .with_data(json!({ "detail": detail })),
                )
            }
        }
    }
}

fn reject(id: Value, error: RpcError) -> (StatusCode, JsonRpcResponse) {
    let status = error
        .kind()
        .and_then(|k| StatusCode::from_u16(k.http_status()).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, JsonRpcResponse::failure(id, error))
}

/// Build the axum router for an agent.
pub fn build_router(service: AgentService) -> Router {
    Router::new()
        .route(AGENT_CARD_PATH, get(agent_card))
        .route("/health", get(health))
        .route("/jsonrpc", post(jsonrpc))
        .with_state(Arc::new(service))
}

async fn agent_card(State(service): State<Arc<AgentService>>) -> Json<AgentCard> {
    Json(service.card.clone())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn jsonrpc(
    State(service): State<Arc<AgentService>>,
    body: Bytes,
) -> (StatusCode, Json<JsonRpcResponse>) {
    let (status, response) = service.dispatch(&body).await;
    (status, Json(response))
}

/// Resolve the `host:port` an agent listens on from its advertised URL.
///
/// The URL must carry an explicit port.
pub fn bind_address(url: &str) -> Result<(String, u16), A2aError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| A2aError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let port = parsed.port().ok_or_else(|| A2aError::InvalidUrl {
        url: url.to_string(),
        reason: "agent URL must include an explicit port".to_string(),
    })?;
    let host = parsed.host_str().unwrap_or("0.0.0.0").to_string();
    Ok((host, port))
}

/// Serve `service` on an already-bound listener until `shutdown` resolves.
pub async fn serve_with_shutdown<S>(
    service: AgentService,
    listener: TcpListener,
    shutdown: S,
) -> Result<(), A2aError>
where
    S: Future<Output = ()> + Send + 'static,
{
    let local = listener.local_addr()?;
    info!(agent = %service.card.name, addr = %local, "agent listening");
    axum::serve(listener, build_router(service))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Bind to the address in `url` and serve until Ctrl-C.
pub async fn run_agent(service: AgentService, url: &str) -> Result<(), A2aError> {
    let (host, port) = bind_address(url)?;
    let listener = TcpListener::bind((host.as_str(), port)).await?;
    serve_with_shutdown(service, listener, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::AgentSkill;
    use crate::envelope::Payload;
    use crate::handler::handler_fn;

    fn service() -> AgentService {
        let card = AgentCard::new("Echo", "echoes", "http://127.0.0.1:9000/", "0.1.0")
            .with_skill(AgentSkill::json("echo", "Echo", "Echo the payload"));
        AgentService::new(card).with_handler(
            "echo",
            handler_fn(|payload: Payload| async move {
                Ok(json!({"status": "ok", "payload": payload}))
            }),
        )
    }

    #[tokio::test]
    async fn dispatch_rejects_non_json_body() {
        let (status, resp) = service().dispatch(b"{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.error.unwrap().code, ErrorCode::ParseError.code());
        assert_eq!(resp.id, Value::Null);
    }

    #[tokio::test]
    async fn dispatch_echoes_request_id() {
        let body = json!({
            "jsonrpc": "2.0", "id": 41, "method": "message/send",
            "params": {"skill_id": "echo", "payload": {"k": "v"}}
        });
        let (status, resp) = service().dispatch(body.to_string().as_bytes()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp.id, json!(41));
        assert_eq!(resp.result.unwrap()["payload"]["k"], "v");
    }

    #[test]
    fn bind_address_requires_port() {
        assert_eq!(
            bind_address("http://localhost:8005/").unwrap(),
            ("localhost".to_string(), 8005)
        );
        assert!(matches!(
            bind_address("http://localhost/"),
            Err(A2aError::InvalidUrl { .. })
        ));
        assert!(bind_address("not a url").is_err());
    }
}
