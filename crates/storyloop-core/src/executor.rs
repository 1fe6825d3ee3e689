//! Role executors: run a role's capability in-process or on a remote agent.
//!
//! `execute` never fails. Handler errors and panics come back as
//! `{status: "exception", error}`, and every remote problem (no URL,
//! unhealthy peer, transport error, peer error, odd result) is answered by
//! the local fallback instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use storyloop_a2a::{invoke_guarded, A2aClient, Payload, SkillHandler};
use tracing::{debug, warn};

use crate::config::{A2aSettings, ExecutionStrategy};
use crate::metrics::METRICS;
use crate::obs;
use crate::roles::Role;

/// The `status` field of an execution result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Ok,
    Error,
    Exception,
    Other(String),
    Missing,
}

/// A role's structured result: always a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionResult(Map<String, Value>);

impl ExecutionResult {
    /// Objects are kept verbatim; anything else is wrapped as `{status: "ok", result}`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            other => {
                let mut map = Map::new();
                map.insert("status".into(), json!("ok"));
                map.insert("result".into(), other);
                Self(map)
            }
        }
    }

    pub fn exception(message: impl Into<String>) -> Self {
        Self::with_status("exception", message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_status("error", message)
    }

    fn with_status(status: &str, message: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("status".into(), json!(status));
        map.insert("error".into(), Value::String(message.into()));
        Self(map)
    }

    pub fn status(&self) -> ExecutionStatus {
        match self.0.get("status").and_then(Value::as_str) {
            Some("ok") => ExecutionStatus::Ok,
            Some("error") => ExecutionStatus::Error,
            Some("exception") => ExecutionStatus::Exception,
            Some(other) => ExecutionStatus::Other(other.to_string()),
            None => ExecutionStatus::Missing,
        }
    }

    /// Raw `status` string, or `"missing"`.
    pub fn status_str(&self) -> &str {
        self.0
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("missing")
    }

    pub fn is_ok(&self) -> bool {
        self.status() == ExecutionStatus::Ok
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.0.get("error").and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// Runs the role's registered in-process handler.
#[derive(Clone)]
pub struct LocalExecutor {
    role: Role,
    handler: Option<Arc<dyn SkillHandler>>,
}

impl LocalExecutor {
    pub fn new(role: Role, handler: Option<Arc<dyn SkillHandler>>) -> Self {
        Self { role, handler }
    }

    pub async fn execute(&self, payload: Payload) -> ExecutionResult {
        debug!(role = %self.role, "executing locally");
        let Some(handler) = &self.handler else {
            return ExecutionResult::error(format!(
                "no local handler registered for role '{}'",
                self.role
            ));
        };
        match invoke_guarded(handler.as_ref(), payload).await {
            Ok(value) => ExecutionResult::from_value(value),
            Err(message) => {
                warn!(role = %self.role, error = %message, "local handler failed");
                ExecutionResult::exception(message)
            }
        }
    }
}

/// Calls the role's remote agent, answering from `fallback` when that is not possible.
pub struct RemoteExecutor {
    role: Role,
    skill_id: String,
    client: Option<A2aClient>,
    fallback: LocalExecutor,
    warned_missing_url: AtomicBool,
}

impl RemoteExecutor {
    pub fn new(
        role: Role,
        skill_id: impl Into<String>,
        url: Option<&str>,
        settings: &A2aSettings,
        fallback: LocalExecutor,
    ) -> Self {
        let client = url.and_then(|u| match A2aClient::new(u, settings.timeout()) {
            Ok(client) => Some(client),
            Err(err) => {
                warn!(role = %role, url = %u, error = %err, "cannot build A2A client");
                None
            }
        });
        Self {
            role,
            skill_id: skill_id.into(),
            client,
            fallback,
            warned_missing_url: AtomicBool::new(false),
        }
    }

    pub async fn execute(&self, payload: Payload) -> ExecutionResult {
        let Some(client) = &self.client else {
            if !self.warned_missing_url.swap(true, Ordering::Relaxed) {
                warn!(role = %self.role, "remote agent URL missing; executing locally");
            }
            return self.fallback.execute(payload).await;
        };

        if !client.is_healthy().await {
            return self
                .fall_back(payload, "agent is not healthy".to_string())
                .await;
        }

        match client.send_task(&self.skill_id, payload.clone(), None).await {
            Ok(Value::Object(map)) => ExecutionResult(map),
            Ok(other) => {
                self.fall_back(payload, format!("non-object result: {other}"))
                    .await
            }
            Err(err) => self.fall_back(payload, err.to_string()).await,
        }
    }

    async fn fall_back(&self, payload: Payload, reason: String) -> ExecutionResult {
        obs::emit_executor_fallback(self.role.as_str(), &reason);
        METRICS.inc_remote_fallbacks();
        self.fallback.execute(payload).await
    }
}

/// A role's executor, chosen once from configuration.
pub enum RoleExecutor {
    Local(LocalExecutor),
    Remote(RemoteExecutor),
}

impl RoleExecutor {
    pub async fn execute(&self, payload: Payload) -> ExecutionResult {
        match self {
            RoleExecutor::Local(local) => local.execute(payload).await,
            RoleExecutor::Remote(remote) => remote.execute(payload).await,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            RoleExecutor::Local(local) => local.role,
            RoleExecutor::Remote(remote) => remote.role,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RoleExecutor::Local(_) => "local",
            RoleExecutor::Remote(_) => "remote",
        }
    }
}

/// Pick the executor for `role`.
///
/// `local` strategy, or no configured URL, gives a local executor; anything
/// else gives a remote executor wrapping the local one.
pub fn build_executor(
    role: Role,
    handler: Option<Arc<dyn SkillHandler>>,
    settings: &A2aSettings,
) -> RoleExecutor {
    let local = LocalExecutor::new(role, handler);
    let strategy = settings.effective_strategy(role);
    if strategy == ExecutionStrategy::Local {
        return RoleExecutor::Local(local);
    }

    let Some(url) = settings.agent(role).and_then(|a| a.url()) else {
        if strategy == ExecutionStrategy::Remote {
            warn!(role = %role, "remote strategy requested but no URL configured; using local execution");
        }
        return RoleExecutor::Local(local);
    };

    RoleExecutor::Remote(RemoteExecutor::new(
        role,
        settings.skill_for(role),
        Some(url),
        settings,
        local,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentDefinition;
    use storyloop_a2a::handler_fn;

    fn settings_with(role: Role, url: Option<&str>, strategy: Option<ExecutionStrategy>) -> A2aSettings {
        let mut settings = A2aSettings::default();
        settings.agents.insert(
            role.as_str().to_string(),
            AgentDefinition {
                url: url.map(str::to_string),
                strategy,
                ..Default::default()
            },
        );
        settings
    }

    #[test]
    fn non_object_results_are_wrapped() {
        let result = ExecutionResult::from_value(json!([1, 2]));
        assert!(result.is_ok());
        assert_eq!(result.get("result"), Some(&json!([1, 2])));

        let result = ExecutionResult::from_value(json!({"status": "fail"}));
        assert_eq!(result.status(), ExecutionStatus::Other("fail".into()));
        assert_eq!(ExecutionResult::default().status(), ExecutionStatus::Missing);
    }

    #[tokio::test]
    async fn local_handler_error_becomes_exception() {
        let handler = handler_fn(|_| async { Err::<Value, _>(anyhow::anyhow!("llm quota exceeded")) });
        let exec = LocalExecutor::new(Role::Developer, Some(handler));
        let result = exec.execute(Payload::new()).await;
        assert_eq!(result.status(), ExecutionStatus::Exception);
        assert!(result.error_message().unwrap().contains("llm quota exceeded"));
    }

    #[tokio::test]
    async fn missing_local_handler_is_error_result() {
        let exec = LocalExecutor::new(Role::Architect, None);
        let result = exec.execute(Payload::new()).await;
        assert_eq!(result.status(), ExecutionStatus::Error);
    }

    #[test]
    fn factory_selection() {
        let local = settings_with(Role::Qa, Some("http://127.0.0.1:9/"), Some(ExecutionStrategy::Local));
        assert_eq!(build_executor(Role::Qa, None, &local).kind(), "local");

        let no_url = settings_with(Role::Qa, None, Some(ExecutionStrategy::Remote));
        assert_eq!(build_executor(Role::Qa, None, &no_url).kind(), "local");

        let remote = settings_with(Role::Qa, Some("http://127.0.0.1:9/"), None);
        let exec = build_executor(Role::Qa, None, &remote);
        assert_eq!(exec.kind(), "remote");
        assert_eq!(exec.role(), Role::Qa);
    }

    #[tokio::test]
    async fn remote_without_url_uses_fallback() {
        let handler = handler_fn(|_| async { Ok(json!({"status": "ok", "via": "local"})) });
        let exec = RemoteExecutor::new(
            Role::Qa,
            "run_quality_checks",
            None,
            &A2aSettings::default(),
            LocalExecutor::new(Role::Qa, Some(handler)),
        );
        let first = exec.execute(Payload::new()).await;
        let second = exec.execute(Payload::new()).await;
        assert_eq!(first.get("via"), Some(&json!("local")));
        assert_eq!(first, second);
        assert!(exec.warned_missing_url.load(Ordering::Relaxed));
    }
}
