//! Agent Card: the discovery document served at `/.well-known/agent-card.json`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const AGENT_CARD_PATH: &str = "/.well-known/agent-card.json";

/// A callable capability exposed by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub input_modes: Vec<String>,
    pub output_modes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

impl AgentSkill {
    /// A JSON-in / JSON-out skill.
    pub fn json(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            input_modes: vec!["application/json".to_string()],
            output_modes: vec!["application/json".to_string()],
            examples: Vec::new(),
        }
    }
}

/// Static discovery document describing an agent and its skills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub url: String,
    pub version: String,
    pub default_input_modes: Vec<String>,
    pub default_output_modes: Vec<String>,
    pub capabilities: Map<String, Value>,
    #[serde(default = "default_authentication")]
    pub authentication: Value,
    pub skills: Vec<AgentSkill>,
}

fn default_authentication() -> Value {
    json!({"mode": "none"})
}

impl AgentCard {
    /// Card with JSON default modes, no streaming and no authentication.
    pub fn new(name: &str, description: &str, url: &str, version: &str) -> Self {
        let mut capabilities = Map::new();
        capabilities.insert("streaming".to_string(), Value::Bool(false));
        Self {
            name: name.to_string(),
            description: description.to_string(),
            url: url.to_string(),
            version: version.to_string(),
            default_input_modes: vec!["application/json".to_string()],
            default_output_modes: vec!["application/json".to_string()],
            capabilities,
            authentication: default_authentication(),
            skills: Vec::new(),
        }
    }

    pub fn with_skill(mut self, skill: AgentSkill) -> Self {
        self.skills.push(skill);
        self
    }

    pub fn skill(&self, id: &str) -> Option<&AgentSkill> {
        self.skills.iter().find(|s| s.id == id)
    }
}
