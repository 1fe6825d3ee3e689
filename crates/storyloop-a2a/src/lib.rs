//! storyloop-a2a: agent-to-agent protocol for storyloop roles
//!
//! This crate is the wire layer that lets a pipeline role run on an
//! independent network peer instead of in-process.
//!
//! ## Protocol
//!
//! - `GET /.well-known/agent-card.json`: discovery document ([`AgentCard`])
//! - `GET /health`: readiness check answering `{"status":"ok"}`
//! - `POST /jsonrpc`: JSON-RPC 2.0 `message/send` with `{skill_id, payload}`
//!
//! Errors use the JSON-RPC code space plus three upstream codes
//! (see [`ErrorCode`]).

pub mod card;
pub mod client;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod server;

pub use card::{AgentCard, AgentSkill, AGENT_CARD_PATH};
pub use client::{A2aClient, DEFAULT_TIMEOUT};
pub use envelope::{
    JsonRpcRequest, JsonRpcResponse, Payload, SendParams, JSONRPC_VERSION, METHOD_MESSAGE_SEND,
};
pub use error::{A2aError, ErrorCode, RpcError};
pub use handler::{handler_fn, invoke_guarded, FnHandler, SkillHandler};
pub use server::{bind_address, build_router, run_agent, serve_with_shutdown, AgentService};

/// Result type for A2A operations
pub type Result<T> = std::result::Result<T, A2aError>;
