//! Crew core - multi-agent orchestration
//!
//! Shared by the CLI and any host application:
//! - `registry` - agent identities, specialist templates, delegation rules
//! - `agent` - base agent runtime
//! - `tools` - tool catalog and grouped execution
//! - `interaction` - human-in-the-loop requests with timeout and cancel

pub mod agent;
pub mod ai;
pub mod config;
pub mod constants;
pub mod interaction;
pub mod ports;
pub mod registry;
pub mod tools;

pub use agent::{Agent, AgentCommunication, AgentServices, BaseAgent, CommunicationKind};
pub use config::CrewConfig;
pub use interaction::InteractionBroker;
pub use registry::AgentRegistry;
pub use tools::ToolEngine;
