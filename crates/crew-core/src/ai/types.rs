//! Generation service types
//!
//! These are NOT provider wire formats - they are the narrow shape the agent
//! runtime needs from whatever text/tool-call service is plugged in.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolDefinition;

/// Message role in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Content blocks that can appear in a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        output: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// One conversation message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMessage {
    pub role: Role,
    pub content: Vec<Content>,
}

impl ModelMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![Content::Text { text: text.into() }],
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }
}

/// Tool call as produced by the generation service. `arguments` is the raw
/// JSON text; providers occasionally emit invalid JSON here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Why the model stopped generating
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Other(String),
}

/// Options forwarded to the generation service
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub tools: Vec<ToolDefinition>,
}

/// Result of one generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateResponse {
    pub content: String,
    pub tool_calls: Vec<AiToolCall>,
    pub stop_reason: StopReason,
}

impl GenerateResponse {
    /// Plain text answer with no tool use
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            stop_reason: StopReason::EndTurn,
        }
    }

    pub fn wants_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Parse raw tool-call arguments.
///
/// Invalid JSON or a non-object payload is replaced with `{}` and logged;
/// the call still proceeds.
pub fn parse_tool_arguments(call: &AiToolCall) -> Value {
    let trimmed = call.arguments.trim();
    if trimmed.is_empty() {
        return Value::Object(Default::default());
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => {
            tracing::warn!(
                tool = %call.name,
                tool_call_id = %call.id,
                kind = json_kind(&other),
                "Tool arguments are not an object, using empty parameters"
            );
            Value::Object(Default::default())
        }
        Err(e) => {
            tracing::warn!(
                tool = %call.name,
                tool_call_id = %call.id,
                error = %e,
                "Malformed tool arguments, using empty parameters"
            );
            Value::Object(Default::default())
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
