//! Specialist role templates
//!
//! A template describes a role the supervisor can staff: the identity new
//! agents of that type get, which tools they may see, and whom they may
//! delegate to. Templates are registered once at startup and read-only after.

use serde::{Deserialize, Serialize};

use super::delegation::DelegationConfig;
use super::identity::{AgentRole, IdentityTemplate};
use crate::tools::pattern_matches;

/// A named agent role with bounded tool access and delegation permissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialistTemplate {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(flatten)]
    pub identity: IdentityTemplate,
    /// Ordered tool-access patterns (`name`, `prefix*`, `!excluded`)
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub delegation: Option<DelegationConfig>,
    /// Hint for UIs to collapse this agent's output by default
    #[serde(default)]
    pub collapse: bool,
}

impl SpecialistTemplate {
    pub fn new(type_name: impl Into<String>, identity: IdentityTemplate) -> Self {
        Self {
            type_name: type_name.into(),
            identity,
            tools: Vec::new(),
            delegation: None,
            collapse: false,
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_delegation(mut self, delegation: DelegationConfig) -> Self {
        self.delegation = Some(delegation);
        self
    }

    pub fn collapsed(mut self) -> Self {
        self.collapse = true;
        self
    }
}

/// Explicit patterns plus default exclusions, minus any exclusion that would
/// hide a tool the template lists by name.
pub fn effective_tool_access(explicit: &[String], default_exclusions: &[String]) -> Vec<String> {
    let mut access = explicit.to_vec();
    let named: Vec<&str> = explicit
        .iter()
        .map(|pattern| pattern.trim())
        .filter(|pattern| {
            !pattern.is_empty() && !pattern.starts_with('!') && !pattern.ends_with('*')
        })
        .collect();

    for exclusion in default_exclusions {
        let target = exclusion.strip_prefix('!').unwrap_or(exclusion);
        if explicit.iter().any(|pattern| pattern == target)
            || named.iter().any(|name| pattern_matches(target, name))
        {
            continue;
        }
        if !access.contains(exclusion) {
            access.push(exclusion.clone());
        }
    }

    access
}

/// Access for types without a template: everything except the defaults.
pub fn unrestricted_tool_access(default_exclusions: &[String]) -> Vec<String> {
    let mut access = vec!["*".to_string()];
    access.extend(default_exclusions.iter().cloned());
    access
}

fn identity(name: &str, tag: &str, role: AgentRole, description: &str) -> IdentityTemplate {
    IdentityTemplate {
        name: name.to_string(),
        tag: tag.to_string(),
        role,
        description: description.to_string(),
    }
}

/// Roles available without any configuration
pub fn builtin_templates() -> Vec<SpecialistTemplate> {
    vec![
        SpecialistTemplate::new(
            "supervisor",
            identity(
                "Supervisor",
                "🧭",
                AgentRole::Supervisor,
                "Plans the work and hands it to specialists",
            ),
        )
        .with_tools(["*", "delegate_to_specialist", "spawn_agent"])
        .with_delegation(
            DelegationConfig::delegating(Vec::<String>::new()).supervisor_can_invoke(false),
        ),
        SpecialistTemplate::new(
            "deep-research-lead",
            identity(
                "Research Lead",
                "🔭",
                AgentRole::Supervisor,
                "Coordinates multi-step research and merges findings",
            ),
        )
        .with_tools([
            "web_search",
            "web_fetch",
            "memory_*",
            "delegate_to_specialist",
        ])
        .with_delegation(DelegationConfig::delegating(["research-worker"])),
        SpecialistTemplate::new(
            "research-worker",
            identity(
                "Researcher",
                "🔬",
                AgentRole::Worker,
                "Investigates one research question and reports back",
            ),
        )
        .with_tools(["web_search", "web_fetch", "read_url"])
        .with_delegation(
            DelegationConfig::default()
                .restricted_to("deep-research")
                .supervisor_can_invoke(false),
        )
        .collapsed(),
        SpecialistTemplate::new(
            "browser-specialist",
            identity(
                "Browser",
                "🌐",
                AgentRole::Specialist,
                "Navigates and extracts content from web pages",
            ),
        )
        .with_tools(["browser_*", "!browser_execute_script", "screenshot"]),
        SpecialistTemplate::new(
            "code-specialist",
            identity(
                "Coder",
                "🛠️",
                AgentRole::Specialist,
                "Reads, writes and runs code in the workspace",
            ),
        )
        .with_tools(["read", "write", "edit", "bash", "grep", "glob"]),
    ]
}
