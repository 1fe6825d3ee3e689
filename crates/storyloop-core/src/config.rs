//! Pipeline configuration, read from a YAML file.
//!
//! Every section is optional; a missing file yields [`PipelineConfig::default`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{ConfigError, StoryStatus};
use crate::roles::Role;

/// How a role's work is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    Local,
    Remote,
    #[default]
    Auto,
}

/// A role's remote agent, as configured under `a2a.agents.<role>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefinition {
    pub role: Option<String>,
    pub url: Option<String>,
    pub capabilities: Map<String, Value>,
    pub skills: BTreeMap<String, Value>,
    #[serde(alias = "execution_strategy")]
    pub strategy: Option<ExecutionStrategy>,
}

impl AgentDefinition {
    /// The configured URL, if non-blank.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyRoleSettings {
    pub strategy: Option<ExecutionStrategy>,
}

/// The `a2a` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct A2aSettings {
    pub execution_mode: ExecutionStrategy,
    pub timeout_secs: u64,
    pub agents: BTreeMap<String, AgentDefinition>,
    /// Older configs set strategies here instead of on the agent.
    pub roles: BTreeMap<String, LegacyRoleSettings>,
}

impl Default for A2aSettings {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionStrategy::Auto,
            timeout_secs: 30,
            agents: BTreeMap::new(),
            roles: BTreeMap::new(),
        }
    }
}

impl A2aSettings {
    pub fn agent(&self, role: Role) -> Option<&AgentDefinition> {
        self.agents.get(role.as_str())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Strategy declared for `role`: agent entry, then legacy `roles`, then `auto`.
    pub fn declared_strategy(&self, role: Role) -> ExecutionStrategy {
        self.agent(role)
            .and_then(|a| a.strategy)
            .or_else(|| self.roles.get(role.as_str()).and_then(|r| r.strategy))
            .unwrap_or(ExecutionStrategy::Auto)
    }

    /// Declared strategy with `auto` resolved to the global `execution_mode`.
    pub fn effective_strategy(&self, role: Role) -> ExecutionStrategy {
        match self.declared_strategy(role) {
            ExecutionStrategy::Auto => self.execution_mode,
            other => other,
        }
    }

    /// Skill to call on the remote agent: the first configured skill, else the role default.
    pub fn skill_for(&self, role: Role) -> String {
        self.agent(role)
            .and_then(|a| a.skills.keys().next().cloned())
            .unwrap_or_else(|| role.default_skill().to_string())
    }

    /// URL the role's agent is served at.
    pub fn url_for(&self, role: Role) -> String {
        self.agent(role)
            .and_then(AgentDefinition::url)
            .map(str::to_string)
            .unwrap_or_else(|| role.default_url())
    }
}

/// The `orchestrator` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub max_loops: u32,
    pub force_approval_attempts: u32,
    pub dev_retry_attempts: u32,
    pub allow_no_tests: bool,
    pub status_for_no_tests: StoryStatus,
    pub architect_intervention: bool,
    pub create_test_story: bool,
    /// Run, failure-report and metrics artifacts older than this are pruned
    /// at run start. `0` keeps everything.
    pub artifact_retention_days: u32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_loops: 1,
            force_approval_attempts: 3,
            dev_retry_attempts: 3,
            allow_no_tests: false,
            status_for_no_tests: StoryStatus::InReview,
            architect_intervention: true,
            create_test_story: false,
            artifact_retention_days: 7,
        }
    }
}

/// The `paths` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub stories: PathBuf,
    pub notes: PathBuf,
    pub artifacts: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            stories: PathBuf::from("planning/stories.yaml"),
            notes: PathBuf::from("docs/NOTES.md"),
            artifacts: PathBuf::from("artifacts"),
        }
    }
}

/// A command-backed local handler, under `handlers.<role>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerSettings {
    /// Program followed by its arguments.
    pub command: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// QA only: JSON report the command leaves behind.
    #[serde(default)]
    pub report_path: Option<PathBuf>,
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub a2a: A2aSettings,
    pub orchestrator: OrchestratorSettings,
    pub paths: PathSettings,
    pub handlers: BTreeMap<String, HandlerSettings>,
}

impl PipelineConfig {
    /// Load from `path`; a missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn handler(&self, role: Role) -> Option<&HandlerSettings> {
        self.handlers.get(role.as_str())
    }
}
