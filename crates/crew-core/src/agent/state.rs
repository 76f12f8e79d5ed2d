//! Agent lifecycle state
//!
//! ```text
//!   idle ──► working ◄──► waiting
//!     │         │            │
//!     └─────────┴─────┬──────┘
//!                     ▼
//!            completed | error   (terminal)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Working,
    Waiting,
    Completed,
    Error,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Working => "working",
            AgentStatus::Waiting => "waiting",
            AgentStatus::Completed => "completed",
            AgentStatus::Error => "error",
        };
        f.write_str(s)
    }
}

impl AgentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Error)
    }

    pub fn can_transition_to(self, next: AgentStatus) -> bool {
        use AgentStatus::*;

        if self == next {
            return true;
        }
        match (self, next) {
            (Completed | Error, _) => false,
            (_, Completed | Error) => true,
            (Idle, Working) | (Working, Waiting) | (Waiting, Working) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentStateError {
    #[error("Illegal state transition {from} -> {to}")]
    IllegalTransition { from: AgentStatus, to: AgentStatus },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentState {
    pub status: AgentStatus,
    pub current_task: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub context: Map<String, Value>,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            status: AgentStatus::Idle,
            current_task: None,
            last_activity: Utc::now(),
            context: Map::new(),
        }
    }
}

/// Partial update merged into [`AgentState`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub status: Option<AgentStatus>,
    /// `Some(None)` clears the current task
    pub current_task: Option<Option<String>>,
    pub context: Map<String, Value>,
}

impl StateUpdate {
    pub fn status(status: AgentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.current_task = Some(Some(task.into()));
        self
    }

    pub fn clear_task(mut self) -> Self {
        self.current_task = Some(None);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

impl AgentState {
    /// Merge `update`. Illegal transitions leave the state untouched.
    pub fn apply(&mut self, update: StateUpdate) -> Result<(), AgentStateError> {
        if let Some(next) = update.status {
            if !self.status.can_transition_to(next) {
                return Err(AgentStateError::IllegalTransition {
                    from: self.status,
                    to: next,
                });
            }
            self.status = next;
        }
        if let Some(task) = update.current_task {
            self.current_task = task;
        }
        self.context.extend(update.context);
        self.last_activity = Utc::now();
        Ok(())
    }
}
