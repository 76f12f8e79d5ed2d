//! Shared constants
//!
//! Defaults in one place; every value here can be overridden through
//! [`crate::config::CrewConfig`].

pub mod tools {
    use std::time::Duration;

    /// Default tool execution timeout (2 minutes)
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Catalog prefix for user-defined tools (`user__my_script`)
    pub const USER_DEFINED_PREFIX: &str = "user__";

    /// Separator between plugin server id and tool name (`github__create_issue`)
    pub const PLUGIN_SEPARATOR: &str = "__";

    /// Patterns appended to every role's tool access unless the role
    /// explicitly includes the tool.
    pub const DEFAULT_EXCLUSIONS: &[&str] = &["!delegate_to_specialist", "!spawn_agent"];
}

pub mod interaction {
    use std::time::Duration;

    /// Timeout applied when a request does not specify one (5 minutes)
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    /// Buffered interaction events per observer before lagging
    pub const EVENT_CAPACITY: usize = 64;
}

pub mod agent {
    /// Generate/execute rounds allowed in a single turn
    pub const MAX_ITERATIONS: usize = 10;
}
