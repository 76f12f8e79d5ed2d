//! Tool requests, results and execution units

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use super::registry::ToolSource;

/// One tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub tool_name: String,
    pub source: ToolSource,
    pub parameters: Value,
    /// Requests sharing a non-empty group id run concurrently as one unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl ToolRequest {
    /// Request with a generated id
    pub fn new(tool_name: impl Into<String>, source: ToolSource, parameters: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            source,
            parameters,
            group_id: None,
        }
    }

    /// Native tool request
    pub fn native(tool_name: impl Into<String>, parameters: Value) -> Self {
        Self::new(tool_name, ToolSource::Native, parameters)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn in_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    fn group_key(&self) -> Option<&str> {
        self.group_id.as_deref().filter(|g| !g.is_empty())
    }
}

/// Why a tool call failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Unknown {tool_source} tool: {name}")]
    NotFound {
        name: String,
        tool_source: ToolSource,
    },

    #[error("{0}")]
    Failed(String),

    #[error("Tool '{name}' timed out after {secs} seconds")]
    TimedOut { name: String, secs: u64 },

    #[error("Tool '{name}' panicked: {message}")]
    Panicked { name: String, message: String },

    #[error("Plugin tool name '{0}' is not of the form <server>__<tool>")]
    InvalidPluginName(String),

    #[error("No plugin client attached for tool '{0}'")]
    NoPluginClient(String),

    #[error("Tool '{name}' is not available to {agent_type} agents")]
    NotAllowed { name: String, agent_type: String },

    #[error("No tool engine attached")]
    NoEngine,
}

/// Outcome of one request, success or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub tool_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ToolResult {
    pub(crate) fn from_outcome(
        request: &ToolRequest,
        outcome: Result<String, ToolError>,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let finished_at = started_at
            + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        let (success, output, error) = match outcome {
            Ok(output) => (true, Some(output), None),
            Err(e) => (false, None, Some(e.to_string())),
        };

        Self {
            id: request.id.clone(),
            tool_name: request.tool_name.clone(),
            success,
            output,
            error,
            started_at,
            finished_at,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Output on success, error message otherwise
    pub fn text(&self) -> &str {
        self.output
            .as_deref()
            .or(self.error.as_deref())
            .unwrap_or_default()
    }
}

/// Split a batch into execution units (indices into `requests`).
///
/// Requests with the same non-empty group id form one unit placed where the
/// group first appears; every other request is its own unit.
pub fn partition_units(requests: &[ToolRequest]) -> Vec<Vec<usize>> {
    let mut units: Vec<Vec<usize>> = Vec::new();
    let mut unit_of_group: HashMap<&str, usize> = HashMap::new();

    for (index, request) in requests.iter().enumerate() {
        match request.group_key() {
            Some(group) => match unit_of_group.get(group) {
                Some(&unit) => units[unit].push(index),
                None => {
                    unit_of_group.insert(group, units.len());
                    units.push(vec![index]);
                }
            },
            None => units.push(vec![index]),
        }
    }

    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(id: &str, group: Option<&str>) -> ToolRequest {
        let request = ToolRequest::native("echo", json!({})).with_id(id);
        match group {
            Some(g) => request.in_group(g),
            None => request,
        }
    }

    #[test]
    fn test_partition_groups_and_singletons() {
        let requests = vec![
            request("1", Some("g")),
            request("2", Some("g")),
            request("3", None),
        ];
        assert_eq!(partition_units(&requests), vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_partition_scattered_group_members() {
        let requests = vec![
            request("1", Some("a")),
            request("2", None),
            request("3", Some("b")),
            request("4", Some("a")),
        ];
        assert_eq!(
            partition_units(&requests),
            vec![vec![0, 3], vec![1], vec![2]]
        );
    }

    #[test]
    fn test_empty_group_id_is_singleton() {
        let requests = vec![request("1", Some("")), request("2", Some(""))];
        assert_eq!(partition_units(&requests), vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_result_from_failure() {
        let req = request("9", None);
        let result = ToolResult::from_outcome(
            &req,
            Err(ToolError::NotFound {
                name: "echo".to_string(),
                tool_source: ToolSource::Native,
            }),
            Utc::now(),
            Duration::from_millis(5),
        );
        assert!(!result.success);
        assert_eq!(result.id, "9");
        assert_eq!(result.text(), "Unknown native tool: echo");
        assert_eq!(result.duration_ms, 5);
        assert!(result.finished_at >= result.started_at);
    }
}
