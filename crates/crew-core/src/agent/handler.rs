//! Per-agent handling of inbound communications

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use super::base::BaseAgent;
use super::communication::AgentCommunication;
use super::Agent;

/// What an agent does with a message routed to it. The agent is passed in so
/// handlers can reply or update state.
#[async_trait]
pub trait CommunicationHandler: Send + Sync {
    async fn handle(&self, agent: &BaseAgent, comm: AgentCommunication) -> Result<()>;
}

/// Default handler: queue messages for the agent's next turn
#[derive(Debug, Default)]
pub struct Inbox {
    messages: Mutex<Vec<AgentCommunication>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything queued so far
    pub fn drain(&self) -> Vec<AgentCommunication> {
        std::mem::take(&mut *self.messages.lock())
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CommunicationHandler for Inbox {
    async fn handle(&self, agent: &BaseAgent, comm: AgentCommunication) -> Result<()> {
        tracing::debug!(
            agent_id = %agent.identity().id,
            from = %comm.from_agent,
            kind = %comm.kind,
            "Queued communication"
        );
        self.messages.lock().push(comm);
        Ok(())
    }
}
