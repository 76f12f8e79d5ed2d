//! External plugin routing
//!
//! Plugin tools are advertised by an injected [`PluginClient`] under
//! `<server>__<tool>` names and invoked by splitting that name back apart.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::registry::ToolDefinition;
use crate::constants::tools::PLUGIN_SEPARATOR;

/// Raw result of a plugin invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginInvocation {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PluginInvocation {
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }

    /// Flatten into the engine's text outcome
    pub fn into_outcome(self) -> std::result::Result<String, String> {
        if self.success {
            Ok(match self.output {
                Some(Value::String(text)) => text,
                Some(other) => other.to_string(),
                None => String::new(),
            })
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "Plugin tool failed without an error message".to_string()))
        }
    }
}

/// Client for an external plugin host (e.g. a set of MCP servers)
#[async_trait]
pub trait PluginClient: Send + Sync {
    /// Tools currently advertised, already named `<server>__<tool>`
    async fn tools_for_call(&self) -> Vec<ToolDefinition>;

    async fn invoke_tool(
        &self,
        server_id: &str,
        tool_name: &str,
        input: Value,
    ) -> Result<PluginInvocation>;
}

/// `github` + `create_issue` -> `github__create_issue`
pub fn plugin_tool_name(server_id: &str, tool_name: &str) -> String {
    format!("{}{}{}", server_id, PLUGIN_SEPARATOR, tool_name)
}

/// Split on the first separator; both halves must be non-empty.
pub fn split_plugin_tool_name(name: &str) -> Option<(&str, &str)> {
    let (server, tool) = name.split_once(PLUGIN_SEPARATOR)?;
    if server.is_empty() || tool.is_empty() {
        return None;
    }
    Some((server, tool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plugin_name_round_trip() {
        let name = plugin_tool_name("github", "create_issue");
        assert_eq!(name, "github__create_issue");
        assert_eq!(
            split_plugin_tool_name(&name),
            Some(("github", "create_issue"))
        );
    }

    #[test]
    fn test_split_keeps_later_separators_in_tool_name() {
        assert_eq!(
            split_plugin_tool_name("fs__read__raw"),
            Some(("fs", "read__raw"))
        );
        assert_eq!(split_plugin_tool_name("__tool"), None);
        assert_eq!(split_plugin_tool_name("server__"), None);
        assert_eq!(split_plugin_tool_name("plain"), None);
    }

    #[test]
    fn test_invocation_outcome() {
        assert_eq!(
            PluginInvocation::ok(json!("done")).into_outcome(),
            Ok("done".to_string())
        );
        assert_eq!(
            PluginInvocation::ok(json!({"n": 1})).into_outcome(),
            Ok("{\"n\":1}".to_string())
        );
        assert_eq!(
            PluginInvocation::failed("rate limited").into_outcome(),
            Err("rate limited".to_string())
        );
    }
}
