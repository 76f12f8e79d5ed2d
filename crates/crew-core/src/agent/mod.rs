//! Agent runtime
//!
//! - `Agent` - what the registry needs from any agent
//! - `BaseAgent` - shared runtime (state, tools, messaging, prompt, turns)
//! - `CommunicationHandler` - per-agent reaction to inbound messages

pub mod base;
pub mod communication;
pub mod handler;
pub mod prompt;
pub mod state;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Weak;

use crate::registry::{AgentCapabilities, AgentIdentity, AgentRegistry};

pub use base::{AgentConfig, AgentServices, BaseAgent, TurnOutcome};
pub use communication::{AgentCommunication, CommunicationKind};
pub use handler::{CommunicationHandler, Inbox};
pub use prompt::PromptBuilder;
pub use state::{AgentState, AgentStateError, AgentStatus, StateUpdate};

/// A live agent as seen by the registry
#[async_trait]
pub trait Agent: Send + Sync {
    fn identity(&self) -> &AgentIdentity;

    fn capabilities(&self) -> &AgentCapabilities;

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Inbound message routed by the registry
    async fn receive_from_agent(&self, comm: AgentCommunication) -> Result<()>;

    async fn shutdown(&self);

    /// Agents that want a registry reference on registration return
    /// themselves here.
    fn as_registry_aware(&self) -> Option<&dyn RegistryAware> {
        None
    }
}

/// Optional capability: receive a weak registry reference
pub trait RegistryAware: Send + Sync {
    fn attach_registry(&self, registry: Weak<AgentRegistry>);
}
