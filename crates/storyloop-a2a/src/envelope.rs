//! JSON-RPC request/response envelopes for `message/send`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RpcError;

pub const JSONRPC_VERSION: &str = "2.0";
pub const METHOD_MESSAGE_SEND: &str = "message/send";

/// Skill payload: always a JSON object.
pub type Payload = Map<String, Value>;

/// Parameters of a `message/send` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendParams {
    pub skill_id: String,
    pub payload: Payload,
}

/// Outgoing request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    pub params: SendParams,
}

impl JsonRpcRequest {
    /// Build a `message/send` request. A UUID v4 id is generated when none is given.
    pub fn message_send(
        skill_id: impl Into<String>,
        payload: Payload,
        request_id: Option<String>,
    ) -> Self {
        let id = request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Value::String(id),
            method: METHOD_MESSAGE_SEND.to_string(),
            params: SendParams {
                skill_id: skill_id.into(),
                payload,
            },
        }
    }
}

/// Response envelope: exactly one of `result` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}
