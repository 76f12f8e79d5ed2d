//! Agent identity types

use serde::{Deserialize, Serialize};

/// Position of an agent in the delegation hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Supervisor,
    Worker,
    #[default]
    Specialist,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRole::Supervisor => write!(f, "supervisor"),
            AgentRole::Worker => write!(f, "worker"),
            AgentRole::Specialist => write!(f, "specialist"),
        }
    }
}

/// Who an agent is. Built once when the agent is constructed and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub id: String,
    /// Display name, unique per registry ignoring case
    pub name: String,
    /// Short visual marker shown next to the name (emoji, initials)
    pub tag: String,
    pub role: AgentRole,
    pub description: String,
}

impl AgentIdentity {
    /// Create an identity with a generated id
    pub fn new(name: impl Into<String>, role: AgentRole) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            tag: String::new(),
            role,
            description: String::new(),
        }
    }

    /// Instantiate the identity described by a specialist template
    pub fn from_template(template: &IdentityTemplate) -> Self {
        Self::new(template.name.clone(), template.role)
            .with_tag(template.tag.clone())
            .with_description(template.description.clone())
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// "🔬 Researcher" or just "Researcher" when no tag is set
    pub fn display_label(&self) -> String {
        if self.tag.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.tag, self.name)
        }
    }
}

/// Identity part of a specialist template (no id; one is generated per agent)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityTemplate {
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub role: AgentRole,
    #[serde(default)]
    pub description: String,
}

/// What an agent is allowed to use, fixed at registration time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    /// Specialist template type this agent was created from
    pub agent_type: String,
    /// Tool-access whitelist; empty or `["*"]` means unrestricted
    pub tool_access: Vec<String>,
}

impl AgentCapabilities {
    pub fn new(agent_type: impl Into<String>, tool_access: Vec<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            tool_access,
        }
    }

    /// Capabilities with no tool restrictions
    pub fn unrestricted(agent_type: impl Into<String>) -> Self {
        Self::new(agent_type, Vec::new())
    }
}
