//! Tool registry for managing available tools
//!
//! Tools live in one namespace per source (native, user-defined, plugin).
//! Names only need to be unique inside their own namespace; the catalog
//! disambiguates them by prefix.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::constants;

/// Where a tool comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ToolSource {
    #[default]
    Native,
    UserDefined,
    ExternalPlugin,
}

impl std::fmt::Display for ToolSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolSource::Native => write!(f, "native"),
            ToolSource::UserDefined => write!(f, "user-defined"),
            ToolSource::ExternalPlugin => write!(f, "external-plugin"),
        }
    }
}

impl ToolSource {
    /// Catalog name for a tool of this source
    pub fn qualify(&self, name: &str) -> String {
        match self {
            ToolSource::UserDefined if !name.starts_with(constants::tools::USER_DEFINED_PREFIX) => {
                format!("{}{}", constants::tools::USER_DEFINED_PREFIX, name)
            }
            _ => name.to_string(),
        }
    }

    /// Infer the source of a name from its shape alone. Only a fallback for
    /// names missing from the catalog: a native name containing `__` or a
    /// plugin server called `user` reads as the wrong source here.
    pub fn classify(name: &str) -> ToolSource {
        if name.starts_with(constants::tools::USER_DEFINED_PREFIX) {
            ToolSource::UserDefined
        } else if name.contains(constants::tools::PLUGIN_SEPARATOR) {
            ToolSource::ExternalPlugin
        } else {
            ToolSource::Native
        }
    }
}

/// Catalog entry handed to agents and the generation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub source: ToolSource,
}

/// What a tool implementation returns
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub output: String,
    pub is_error: bool,
}

impl ToolOutput {
    /// Create a success result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    /// Success with a JSON payload
    pub fn success_data(data: Value) -> Self {
        Self::success(data.to_string())
    }

    /// Create an error result
    pub fn error(msg: impl std::fmt::Display) -> Self {
        Self {
            output: msg.to_string(),
            is_error: true,
        }
    }

    /// Create an invalid-parameters error.
    pub fn invalid_parameters(msg: impl std::fmt::Display) -> Self {
        Self::error(format!("Invalid parameters: {}", msg))
    }
}

/// Parse tool parameters, returning a ToolOutput error on failure
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ToolOutput> {
    serde_json::from_value(params).map_err(ToolOutput::invalid_parameters)
}

/// Context for tool execution
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Request id of the call being executed
    pub request_id: String,
    /// Agent that issued the call, if any
    pub agent_id: Option<String>,
    /// Optional per-call timeout override
    pub timeout: Option<Duration>,
}

impl ToolContext {
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Trait for tool implementations
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (id), unique within its source
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters_schema(&self) -> Value;

    /// Execute the tool
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutput;
}

/// Per-source tool maps
#[derive(Default)]
pub struct ToolRegistry {
    native: DashMap<String, Arc<dyn Tool>>,
    user_defined: DashMap<String, Arc<dyn Tool>>,
    plugin: DashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, source: ToolSource) -> &DashMap<String, Arc<dyn Tool>> {
        match source {
            ToolSource::Native => &self.native,
            ToolSource::UserDefined => &self.user_defined,
            ToolSource::ExternalPlugin => &self.plugin,
        }
    }

    /// Register a tool; an existing tool with the same name and source is
    /// replaced.
    pub fn register(&self, source: ToolSource, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.map(source).insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, %source, "Replaced existing tool");
        } else {
            tracing::debug!(tool = %name, %source, "Registered tool");
        }
    }

    /// Remove a tool. Returns whether it was registered.
    pub fn unregister(&self, source: ToolSource, name: &str) -> bool {
        self.map(source).remove(local_name(source, name)).is_some()
    }

    /// Get a tool by name. User-defined tools resolve with or without their
    /// catalog prefix.
    pub fn get(&self, source: ToolSource, name: &str) -> Option<Arc<dyn Tool>> {
        self.map(source)
            .get(local_name(source, name))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.native.len() + self.user_defined.len() + self.plugin.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Catalog entries for every registered tool, grouped by source and
    /// sorted by name within a source
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = Vec::with_capacity(self.len());
        for source in [
            ToolSource::Native,
            ToolSource::UserDefined,
            ToolSource::ExternalPlugin,
        ] {
            let mut batch: Vec<_> = self
                .map(source)
                .iter()
                .map(|entry| {
                    let tool = entry.value();
                    ToolDefinition {
                        name: source.qualify(tool.name()),
                        description: tool.description().to_string(),
                        input_schema: tool.parameters_schema(),
                        source,
                    }
                })
                .collect();
            batch.sort_by(|a, b| a.name.cmp(&b.name));
            definitions.extend(batch);
        }
        definitions
    }
}

fn local_name(source: ToolSource, name: &str) -> &str {
    match source {
        ToolSource::UserDefined => name
            .strip_prefix(constants::tools::USER_DEFINED_PREFIX)
            .unwrap_or(name),
        _ => name,
    }
}
