//! Local role handlers backed by an external command.
//!
//! The payload reaches the command twice: as JSON on stdin, and flattened
//! into `STORY`, `DETAIL_LEVEL`, `ITERATION_COUNT`, `ARCHITECT_MODE` and
//! `ALLOW_NO_TESTS` environment variables for scripts that only read env.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use storyloop_a2a::{Payload, SkillHandler};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::{HandlerSettings, PipelineConfig};
use crate::domain::{Result, StoryloopError};
use crate::orchestrator::HandlerRegistry;
use crate::roles::Role;

/// Lines of stdout/stderr kept in the result.
const TAIL_LINES: usize = 20;

/// Payload key to environment variable.
const ENV_KEYS: &[(&str, &str)] = &[
    ("story_id", "STORY"),
    ("detail_level", "DETAIL_LEVEL"),
    ("iteration_count", "ITERATION_COUNT"),
    ("mode", "ARCHITECT_MODE"),
    ("allow_no_tests", "ALLOW_NO_TESTS"),
    ("attempt", "DEV_ATTEMPT"),
];

#[derive(Debug, Clone)]
pub struct CommandHandler {
    role: Role,
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
    report_path: Option<PathBuf>,
    workdir: Option<PathBuf>,
}

impl CommandHandler {
    pub fn new(role: Role, settings: &HandlerSettings) -> anyhow::Result<Self> {
        let (program, args) = settings
            .command
            .split_first()
            .with_context(|| format!("handler for role '{role}' has an empty command"))?;
        Ok(Self {
            role,
            program: program.clone(),
            args: args.to_vec(),
            timeout: settings
                .timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            report_path: settings.report_path.clone(),
            workdir: settings.workdir.clone(),
        })
    }

    async fn run(&self, payload: &Payload) -> anyhow::Result<Map<String, Value>> {
        let start = Instant::now();
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env("STORYLOOP_ROLE", self.role.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, var) in ENV_KEYS {
            if let Some(value) = payload.get(*key).and_then(env_value) {
                command.env(var, value);
            }
        }
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn '{}' for role '{}'", self.program, self.role))?;

        // Written from a separate task so a command that never drains stdin
        // still falls under the timeout below.
        if let Some(mut stdin) = child.stdin.take() {
            let body = serde_json::to_vec(payload)?;
            let role = self.role;
            tokio::spawn(async move {
                if let Err(err) = stdin.write_all(&body).await {
                    tracing::debug!(role = %role, error = %err, "command did not read its stdin");
                }
            });
        }

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    anyhow::anyhow!(
                        "role '{}' command timed out after {} seconds",
                        self.role,
                        limit.as_secs()
                    )
                })??,
            None => child.wait_with_output().await?,
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let mut result = Map::new();
        result.insert(
            "status".into(),
            json!(if output.status.success() { "ok" } else { "error" }),
        );
        result.insert("return_code".into(), json!(exit_code));
        result.insert("duration_ms".into(), json!(start.elapsed().as_millis() as u64));
        result.insert("stdout_tail".into(), json!(tail(&stdout)));
        result.insert("stderr_tail".into(), json!(tail(&stderr)));
        if !output.status.success() {
            result.insert(
                "error".into(),
                json!(format!("command exited with code {exit_code}")),
            );
        }

        if let Some(extra) = last_json_object(&stdout) {
            result.extend(extra);
        }
        if let Some(path) = &self.report_path {
            match read_report(path) {
                Ok(report) => result.extend(report),
                Err(err) => tracing::warn!(
                    role = %self.role,
                    path = %path.display(),
                    error = %err,
                    "report file unreadable"
                ),
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl SkillHandler for CommandHandler {
    async fn handle(&self, payload: Payload) -> anyhow::Result<Value> {
        Ok(Value::Object(self.run(&payload).await?))
    }
}

/// Build a [`CommandHandler`] for every `handlers.<role>` entry.
pub fn registry_from_config(config: &PipelineConfig) -> Result<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    for (key, settings) in &config.handlers {
        let role: Role = key.parse()?;
        let handler = CommandHandler::new(role, settings)
            .map_err(|err| StoryloopError::Handler(err.to_string()))?;
        registry.insert(role, Arc::new(handler));
    }
    Ok(registry)
}

fn env_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(TAIL_LINES);
    lines[start..].join("\n")
}

/// The last non-empty stdout line, if it is a JSON object.
fn last_json_object(stdout: &str) -> Option<Map<String, Value>> {
    let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    match serde_json::from_str(line.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn read_report(path: &Path) -> anyhow::Result<Map<String, Value>> {
    let raw = std::fs::read(path)?;
    match serde_json::from_slice(&raw)? {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("report is not a JSON object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(command: &[&str]) -> HandlerSettings {
        HandlerSettings {
            command: command.iter().map(|s| s.to_string()).collect(),
            timeout_secs: Some(10),
            report_path: None,
            workdir: None,
        }
    }

    fn payload(v: Value) -> Payload {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandHandler::new(Role::Developer, &settings(&[])).is_err());
    }

    #[test]
    fn registry_covers_configured_roles() {
        let config = PipelineConfig::from_yaml(
            "handlers:\n  qa: {command: [\"true\"]}\n  developer: {command: [\"make\", \"dev\"]}\n",
        )
        .unwrap();
        let registry = registry_from_config(&config).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains_key(&Role::Qa));

        let bad = PipelineConfig::from_yaml("handlers:\n  tester: {command: [\"true\"]}\n").unwrap();
        assert!(matches!(
            registry_from_config(&bad),
            Err(StoryloopError::Config(_))
        ));
    }

    #[test]
    fn last_line_json_is_detected() {
        let out = "building...\n{\"status\": \"pass\", \"areas\": {}}\n\n";
        assert_eq!(last_json_object(out).unwrap()["status"], "pass");
        assert!(last_json_object("{\"a\":1}\ndone\n").is_none());
    }

    #[tokio::test]
    async fn env_and_stdin_reach_the_command() {
        let handler = CommandHandler::new(
            Role::Architect,
            &settings(&[
                "sh",
                "-c",
                "read body; echo \"{\\\"story\\\": \\\"$STORY\\\", \\\"level\\\": \\\"$DETAIL_LEVEL\\\", \\\"n\\\": \\\"$ITERATION_COUNT\\\"}\"",
            ]),
        )
        .unwrap();
        let out = handler
            .handle(payload(json!({
                "story_id": "S3", "detail_level": "high", "iteration_count": 1
            })))
            .await
            .unwrap();
        assert_eq!(out["status"], "ok");
        assert_eq!(out["story"], "S3");
        assert_eq!(out["level"], "high");
        assert_eq!(out["n"], "1");
    }

    #[tokio::test]
    async fn non_zero_exit_is_error_status() {
        let handler = CommandHandler::new(Role::Developer, &settings(&["sh", "-c", "echo oops >&2; exit 3"])).unwrap();
        let out = handler.handle(Payload::new()).await.unwrap();
        assert_eq!(out["status"], "error");
        assert_eq!(out["return_code"], 3);
        assert_eq!(out["stderr_tail"], "oops");
    }

    #[tokio::test]
    async fn qa_report_file_is_merged() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("qa_report.json");
        std::fs::write(&report, r#"{"status": "no_tests", "areas": {"backend": {"has_tests": true, "rc": 0}}}"#).unwrap();

        let mut cfg = settings(&["true"]);
        cfg.report_path = Some(report);
        let handler = CommandHandler::new(Role::Qa, &cfg).unwrap();
        let out = handler.handle(Payload::new()).await.unwrap();
        assert_eq!(out["status"], "no_tests");
        assert_eq!(out["areas"]["backend"]["rc"], 0);
    }

    #[tokio::test]
    async fn timeout_is_an_error() {
        let mut cfg = settings(&["sleep", "5"]);
        cfg.timeout_secs = Some(1);
        let handler = CommandHandler::new(Role::Qa, &cfg).unwrap();
        let err = handler.handle(Payload::new()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn undrained_stdin_still_times_out() {
        let mut cfg = settings(&["sleep", "5"]);
        cfg.timeout_secs = Some(1);
        let handler = CommandHandler::new(Role::Developer, &cfg).unwrap();
        // well past any pipe buffer
        let big = "x".repeat(512 * 1024);

        let err = tokio::time::timeout(
            Duration::from_secs(4),
            handler.handle(payload(json!({"story_id": "S1", "notes": big}))),
        )
        .await
        .expect("handler must respect its own timeout")
        .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
