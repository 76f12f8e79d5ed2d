//! Collaborator ports
//!
//! Narrow traits for the pieces that live outside the core: output channels
//! (console, web socket, chat integrations), the memory service and the skill
//! catalog. Text generation lives in [`crate::ai`] and external plugins in
//! [`crate::tools::plugin`].

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Per-message delivery options
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SendOptions {
    /// Reply inside an existing thread/conversation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Render collapsed by default (long specialist output)
    pub collapse: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Who a message is from, for channels that can show it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentAttribution {
    pub agent_id: String,
    pub agent_name: String,
    pub agent_tag: String,
    pub options: SendOptions,
}

/// Somewhere agent output is delivered
#[async_trait]
pub trait Channel: Send + Sync {
    async fn send(&self, content: &str, options: &SendOptions) -> Result<()>;

    async fn send_error(&self, message: &str, details: Option<&Value>) -> Result<()>;

    /// Channels that can render per-agent attribution return themselves here.
    fn as_attributed(&self) -> Option<&dyn AttributedChannel> {
        None
    }
}

/// Optional channel capability: send on behalf of a named agent
#[async_trait]
pub trait AttributedChannel: Send + Sync {
    async fn send_as_agent(&self, content: &str, attribution: &AgentAttribution) -> Result<()>;
}

/// Long-term memory rendered into the system prompt
pub trait MemoryProvider: Send + Sync {
    fn format_for_prompt(&self) -> String;
}

/// Skill catalog rendered into the system prompt
pub trait SkillProvider: Send + Sync {
    fn usage_instructions(&self) -> String;
    fn catalog_for_prompt(&self) -> String;
}
