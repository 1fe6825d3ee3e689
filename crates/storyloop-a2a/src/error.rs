//! Error types for the A2A protocol layer

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// JSON-RPC error codes, plus the three upstream codes used between agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    UpstreamFailure,
    Timeout,
    Unavailable,
}

impl ErrorCode {
    /// Numeric code carried on the wire.
    pub const fn code(self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::UpstreamFailure => -32000,
            ErrorCode::Timeout => -32001,
            ErrorCode::Unavailable => -32002,
        }
    }

    /// Reverse lookup of a wire code.
    pub fn from_code(code: i64) -> Option<Self> {
        [
            ErrorCode::ParseError,
            ErrorCode::InvalidRequest,
            ErrorCode::MethodNotFound,
            ErrorCode::InvalidParams,
            ErrorCode::InternalError,
            ErrorCode::UpstreamFailure,
            ErrorCode::Timeout,
            ErrorCode::Unavailable,
        ]
        .into_iter()
        .find(|c| c.code() == code)
    }

    /// HTTP status the agent server answers with for this code.
    pub const fn http_status(self) -> u16 {
        match self {
            ErrorCode::ParseError | ErrorCode::InvalidRequest | ErrorCode::InvalidParams => 400,
            ErrorCode::MethodNotFound => 404,
            ErrorCode::InternalError => 500,
            ErrorCode::UpstreamFailure => 502,
            ErrorCode::Timeout => 504,
            ErrorCode::Unavailable => 503,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::MethodNotFound => "METHOD_NOT_FOUND",
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::UpstreamFailure => "UPSTREAM_FAILURE",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Unavailable => "UNAVAILABLE",
        };
        write!(f, "{s}")
    }
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The known code this error carries, if any.
    pub fn kind(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "{kind} ({}): {}", self.code, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

/// Errors that can occur while talking to, or hosting, an agent
#[derive(Error, Debug)]
pub enum A2aError {
    /// Peer answered with something that is not a JSON-RPC envelope
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Network-level failure (connect, DNS, reset)
    #[error("transport error: {0}")]
    Transport(String),

    /// The per-call deadline elapsed
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Peer answered non-2xx or with a JSON-RPC error member
    #[error("upstream failure (HTTP {status}){}", .error.as_ref().map(|e| format!(": {e}")).unwrap_or_default())]
    Upstream {
        status: u16,
        error: Option<RpcError>,
    },

    /// Agent URL could not be used
    #[error("invalid agent url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl A2aError {
    /// Wire code that best describes this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            A2aError::Protocol(_) | A2aError::Json(_) => ErrorCode::ParseError,
            A2aError::Transport(_) | A2aError::Io(_) => ErrorCode::Unavailable,
            A2aError::Timeout { .. } => ErrorCode::Timeout,
            A2aError::Upstream { .. } => ErrorCode::UpstreamFailure,
            A2aError::InvalidUrl { .. } => ErrorCode::InvalidRequest,
        }
    }
}

impl From<reqwest::Error> for A2aError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return A2aError::Upstream {
                status: status.as_u16(),
                error: None,
            };
        }
        A2aError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_json_rpc_convention() {
        assert_eq!(ErrorCode::ParseError.code(), -32700);
        assert_eq!(ErrorCode::InvalidRequest.code(), -32600);
        assert_eq!(ErrorCode::MethodNotFound.code(), -32601);
        assert_eq!(ErrorCode::InvalidParams.code(), -32602);
        assert_eq!(ErrorCode::InternalError.code(), -32603);
        assert_eq!(ErrorCode::UpstreamFailure.code(), -32000);
        assert_eq!(ErrorCode::Timeout.code(), -32001);
        assert_eq!(ErrorCode::Unavailable.code(), -32002);
    }

    #[test]
    fn from_code_reverses_code() {
        assert_eq!(ErrorCode::from_code(-32601), Some(ErrorCode::MethodNotFound));
        assert_eq!(ErrorCode::from_code(-32002), Some(ErrorCode::Unavailable));
        assert_eq!(ErrorCode::from_code(42), None);
    }

    #[test]
    fn rpc_error_omits_absent_data() {
        let err = RpcError::new(ErrorCode::InvalidRequest, "JSON-RPC 2.0 required");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], -32600);
        assert!(json.get("data").is_none());

        let err = err.with_data(serde_json::json!({"detail": "boom"}));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["data"]["detail"], "boom");
    }

    #[test]
    fn upstream_display_includes_rpc_error() {
        let err = A2aError::Upstream {
            status: 404,
            error: Some(RpcError::new(ErrorCode::MethodNotFound, "Skill 'x' not found")),
        };
        let msg = err.to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("METHOD_NOT_FOUND"));
        assert_eq!(err.code(), ErrorCode::UpstreamFailure);
    }
}
