//! Pipeline roles and their built-in agent cards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use storyloop_a2a::{AgentCard, AgentSkill};

use crate::domain::ConfigError;

/// The five roles of the delivery pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    BusinessAnalyst,
    ProductOwner,
    Architect,
    Developer,
    Qa,
}

struct RoleProfile {
    key: &'static str,
    agent_name: &'static str,
    agent_description: &'static str,
    skill_id: &'static str,
    skill_name: &'static str,
    skill_description: &'static str,
    port: u16,
}

const PROFILES: [RoleProfile; 5] = [
    RoleProfile {
        key: "business_analyst",
        agent_name: "Business Analyst Agent",
        agent_description: "Transforms concepts into structured requirements for the pipeline.",
        skill_id: "extract_requirements",
        skill_name: "Extract Requirements",
        skill_description: "Derives structured requirements from a concept description.",
        port: 8001,
    },
    RoleProfile {
        key: "product_owner",
        agent_name: "Product Owner Agent",
        agent_description: "Maintains product vision and validates requirement alignment.",
        skill_id: "evaluate_alignment",
        skill_name: "Evaluate Alignment",
        skill_description: "Assesses requirements against the product vision.",
        port: 8002,
    },
    RoleProfile {
        key: "architect",
        agent_name: "Architect Agent",
        agent_description: "Generates technical plans and story backlogs from requirements.",
        skill_id: "generate_plan",
        skill_name: "Generate Plan",
        skill_description: "Produces PRD, architecture, and backlog artifacts.",
        port: 8003,
    },
    RoleProfile {
        key: "developer",
        agent_name: "Developer Agent",
        agent_description: "Implements backlog stories by generating code and tests.",
        skill_id: "implement_story",
        skill_name: "Implement Story",
        skill_description: "Generates code and tests for an assigned story.",
        port: 8004,
    },
    RoleProfile {
        key: "qa",
        agent_name: "QA Agent",
        agent_description: "Validates implementation quality via automated checks.",
        skill_id: "run_quality_checks",
        skill_name: "Run Quality Checks",
        skill_description: "Executes test suites and reports findings.",
        port: 8005,
    },
];

impl Role {
    pub const ALL: [Role; 5] = [
        Role::BusinessAnalyst,
        Role::ProductOwner,
        Role::Architect,
        Role::Developer,
        Role::Qa,
    ];

    fn profile(&self) -> &'static RoleProfile {
        let idx = match self {
            Role::BusinessAnalyst => 0,
            Role::ProductOwner => 1,
            Role::Architect => 2,
            Role::Developer => 3,
            Role::Qa => 4,
        };
        &PROFILES[idx]
    }

    /// Config key, e.g. `business_analyst`.
    pub fn as_str(&self) -> &'static str {
        self.profile().key
    }

    pub fn default_skill(&self) -> &'static str {
        self.profile().skill_id
    }

    pub fn default_port(&self) -> u16 {
        self.profile().port
    }

    pub fn default_url(&self) -> String {
        format!("http://localhost:{}/", self.default_port())
    }

    /// The role's agent card, advertised at `url`.
    pub fn card(&self, url: &str) -> AgentCard {
        let p = self.profile();
        AgentCard::new(p.agent_name, p.agent_description, url, env!("CARGO_PKG_VERSION"))
            .with_skill(AgentSkill::json(p.skill_id, p.skill_name, p.skill_description))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ConfigError;

    /// Accepts the config key; `-` and `_` are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownRole(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skills_and_ports() {
        assert_eq!(Role::Qa.default_skill(), "run_quality_checks");
        assert_eq!(Role::Architect.default_port(), 8003);
        assert_eq!(Role::BusinessAnalyst.default_url(), "http://localhost:8001/");
    }

    #[test]
    fn parse_role_names() {
        assert_eq!("product-owner".parse::<Role>().unwrap(), Role::ProductOwner);
        assert_eq!("QA".parse::<Role>().unwrap(), Role::Qa);
        assert!("tester".parse::<Role>().is_err());
    }

    #[test]
    fn card_advertises_default_skill() {
        let card = Role::Developer.card("http://localhost:8004/");
        assert_eq!(card.name, "Developer Agent");
        assert_eq!(card.skills.len(), 1);
        assert!(card.skill("implement_story").is_some());
    }
}
