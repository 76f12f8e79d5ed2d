//! Tool system
//!
//! Tools come from three sources (native, user-defined, external plugins)
//! and are executed by the [`ToolEngine`] in ordered units.

pub mod engine;
pub mod events;
pub mod matching;
pub mod plugin;
pub mod registry;
pub mod request;

pub use engine::ToolEngine;
pub use events::{ListenerId, LoggingListener, ToolEvent, ToolEventListener};
pub use matching::ToolMatcher;
pub(crate) use matching::pattern_matches;
pub use plugin::{plugin_tool_name, split_plugin_tool_name, PluginClient, PluginInvocation};
pub use registry::{
    parse_params, Tool, ToolContext, ToolDefinition, ToolOutput, ToolRegistry, ToolSource,
};
pub use request::{partition_units, ToolError, ToolRequest, ToolResult};
