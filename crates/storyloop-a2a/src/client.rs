//! HTTP client for talking to a remote A2A agent.

use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;

use crate::card::{AgentCard, AGENT_CARD_PATH};
use crate::envelope::{JsonRpcRequest, JsonRpcResponse, Payload};
use crate::error::A2aError;
use crate::Result;

/// Default per-call deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client bound to one agent base URL
#[derive(Debug, Clone)]
pub struct A2aClient {
    base_url: String,
    timeout: Duration,
    http_client: reqwest::Client,
}

impl A2aClient {
    /// Create a client for the agent at `base_url` with a bounded per-call timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("storyloop-a2a/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| A2aError::Transport(e.to_string()))?;

        Ok(A2aClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn classify(&self, err: reqwest::Error) -> A2aError {
        if err.is_timeout() {
            A2aError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            A2aError::from(err)
        }
    }

    /// Fetch the agent's discovery card
    pub async fn fetch_card(&self) -> Result<AgentCard> {
        let response = self
            .http_client
            .get(self.endpoint(AGENT_CARD_PATH))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(A2aError::Upstream {
                status: status.as_u16(),
                error: None,
            });
        }

        response
            .json::<AgentCard>()
            .await
            .map_err(|e| A2aError::Protocol(format!("malformed agent card: {e}")))
    }

    /// Check `GET /health`.
    ///
    /// Healthy only on a 2xx answer whose JSON body is `{"status":"ok"}`.
    /// Timeouts, connection errors and malformed bodies all count as unhealthy.
    pub async fn is_healthy(&self) -> bool {
        let response = match self.http_client.get(self.endpoint("/health")).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(url = %self.base_url, error = %e, "health check failed");
                return false;
            }
        };

        if !response.status().is_success() {
            debug!(url = %self.base_url, status = %response.status(), "health check non-2xx");
            return false;
        }

        match response.json::<Value>().await {
            Ok(body) => body.get("status").and_then(Value::as_str) == Some("ok"),
            Err(_) => false,
        }
    }

    /// Send a `message/send` call for `skill_id` and return the `result` member.
    ///
    /// A request id is generated when `request_id` is `None`.
    pub async fn send_task(
        &self,
        skill_id: &str,
        payload: Payload,
        request_id: Option<String>,
    ) -> Result<Value> {
        let request = JsonRpcRequest::message_send(skill_id, payload, request_id);
        debug!(url = %self.base_url, skill_id = %skill_id, id = %request.id, "sending task");

        let response = self
            .http_client
            .post(self.endpoint("/jsonrpc"))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        let envelope = serde_json::from_slice::<JsonRpcResponse>(&body);

        if !status.is_success() {
            return Err(A2aError::Upstream {
                status: status.as_u16(),
                error: envelope.ok().and_then(|e| e.error),
            });
        }

        let envelope =
            envelope.map_err(|e| A2aError::Protocol(format!("malformed JSON-RPC response: {e}")))?;

        if let Some(error) = envelope.error {
            return Err(A2aError::Upstream {
                status: status.as_u16(),
                error: Some(error),
            });
        }

        Ok(envelope
            .result
            .unwrap_or_else(|| Value::Object(Map::new())))
    }
}
