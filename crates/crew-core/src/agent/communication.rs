//! Messages exchanged between agents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationKind {
    TaskAssignment,
    TaskResult,
    StatusUpdate,
    RequestHelp,
    Terminate,
}

impl std::fmt::Display for CommunicationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CommunicationKind::TaskAssignment => "task_assignment",
            CommunicationKind::TaskResult => "task_result",
            CommunicationKind::StatusUpdate => "status_update",
            CommunicationKind::RequestHelp => "request_help",
            CommunicationKind::Terminate => "terminate",
        };
        f.write_str(s)
    }
}

/// Agent-to-agent message. Sender and timestamp are stamped on send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCommunication {
    pub kind: CommunicationKind,
    pub from_agent: String,
    pub to_agent: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl AgentCommunication {
    pub fn new(kind: CommunicationKind, payload: Value) -> Self {
        Self {
            kind,
            from_agent: String::new(),
            to_agent: String::new(),
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn task(description: impl Into<String>) -> Self {
        Self::new(
            CommunicationKind::TaskAssignment,
            serde_json::json!({ "task": description.into() }),
        )
    }

    pub fn to(mut self, agent_id: impl Into<String>) -> Self {
        self.to_agent = agent_id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_display_matches_wire_name() {
        for kind in [
            CommunicationKind::TaskAssignment,
            CommunicationKind::RequestHelp,
            CommunicationKind::Terminate,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.to_string()));
        }
    }

    #[test]
    fn test_task_payload() {
        let comm = AgentCommunication::task("summarize the report").to("worker-1");
        assert_eq!(comm.kind, CommunicationKind::TaskAssignment);
        assert_eq!(comm.payload["task"], "summarize the report");
        assert_eq!(comm.to_agent, "worker-1");
        assert!(comm.from_agent.is_empty());
    }
}
