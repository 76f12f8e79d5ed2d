//! Identity & delegation registry
//!
//! The registry is constructed explicitly at startup and shared as an
//! `Arc<AgentRegistry>`; agents receive a weak reference when they are
//! registered. It owns:
//! - the agent map (by id) and a lower-cased name index
//! - the specialist templates, read-only after construction
//! - the default tool exclusions applied to every role
//!
//! Broadcast and shutdown walk agents in registration order.

mod delegation;
mod identity;
mod templates;

pub use delegation::{check_delegation, DelegationConfig, DelegationError};
pub use identity::{AgentCapabilities, AgentIdentity, AgentRole, IdentityTemplate};
pub use templates::{
    builtin_templates, effective_tool_access, unrestricted_tool_access, SpecialistTemplate,
};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentCommunication};
use crate::config::CrewConfig;
use crate::constants;

/// Registration failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("an agent with id '{0}' is already registered")]
    DuplicateId(String),
    #[error("an agent named '{0}' is already registered")]
    DuplicateName(String),
}

#[derive(Default)]
struct AgentTable {
    agents: HashMap<String, Arc<dyn Agent>>,
    /// Registration order, drives broadcast and shutdown
    order: Vec<String>,
    /// lower-cased name -> id
    names: HashMap<String, String>,
}

impl AgentTable {
    fn in_order(&self) -> Vec<Arc<dyn Agent>> {
        self.order
            .iter()
            .filter_map(|id| self.agents.get(id).cloned())
            .collect()
    }
}

/// Registry of live agents and specialist role templates
pub struct AgentRegistry {
    table: RwLock<AgentTable>,
    templates: HashMap<String, SpecialistTemplate>,
    template_order: Vec<String>,
    default_exclusions: Vec<String>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    /// Registry with the built-in templates and default exclusions
    pub fn new() -> Self {
        Self::with_templates(
            builtin_templates(),
            constants::tools::DEFAULT_EXCLUSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
        )
    }

    /// Registry with an explicit template set. Later templates replace
    /// earlier ones with the same type name.
    pub fn with_templates(
        templates: impl IntoIterator<Item = SpecialistTemplate>,
        default_exclusions: Vec<String>,
    ) -> Self {
        let mut by_type = HashMap::new();
        let mut template_order = Vec::new();
        for template in templates {
            if !by_type.contains_key(&template.type_name) {
                template_order.push(template.type_name.clone());
            }
            by_type.insert(template.type_name.clone(), template);
        }

        Self {
            table: RwLock::new(AgentTable::default()),
            templates: by_type,
            template_order,
            default_exclusions,
        }
    }

    /// Built-in templates overlaid with the ones declared in config
    pub fn from_config(config: &CrewConfig) -> Self {
        let templates = builtin_templates()
            .into_iter()
            .chain(config.specialists.iter().cloned());
        Self::with_templates(templates, config.tools.default_exclusions.clone())
    }

    // ── Agents ────────────────────────────────────────────────────────

    /// Register a live agent.
    ///
    /// Duplicate ids and case-insensitive duplicate names are rejected and
    /// leave the existing entry untouched. Agents exposing the
    /// registry-aware capability get a weak reference to this registry.
    pub fn register_agent(self: &Arc<Self>, agent: Arc<dyn Agent>) -> Result<(), RegistryError> {
        let identity = agent.identity().clone();
        let name_key = identity.name.to_lowercase();

        {
            let mut table = self.table.write();
            if table.agents.contains_key(&identity.id) {
                return Err(RegistryError::DuplicateId(identity.id));
            }
            if table.names.contains_key(&name_key) {
                return Err(RegistryError::DuplicateName(identity.name));
            }
            table.names.insert(name_key, identity.id.clone());
            table.order.push(identity.id.clone());
            table.agents.insert(identity.id.clone(), agent.clone());
        }

        if let Some(aware) = agent.as_registry_aware() {
            aware.attach_registry(Arc::downgrade(self));
        }

        info!(
            agent_id = %identity.id,
            name = %identity.name,
            role = %identity.role,
            agent_type = %agent.capabilities().agent_type,
            "Registered agent"
        );
        Ok(())
    }

    /// Remove an agent and its name entry. Unknown ids are ignored.
    pub fn unregister_agent(&self, id: &str) {
        let mut table = self.table.write();
        let Some(agent) = table.agents.remove(id) else {
            return;
        };
        table.names.remove(&agent.identity().name.to_lowercase());
        table.order.retain(|existing| existing != id);
        debug!(agent_id = id, "Unregistered agent");
    }

    pub fn get_agent(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.table.read().agents.get(id).cloned()
    }

    /// Case-insensitive lookup by display name
    pub fn get_agent_by_name(&self, name: &str) -> Option<Arc<dyn Agent>> {
        let table = self.table.read();
        let id = table.names.get(&name.to_lowercase())?;
        table.agents.get(id).cloned()
    }

    /// All agents in registration order
    pub fn get_agents(&self) -> Vec<Arc<dyn Agent>> {
        self.table.read().in_order()
    }

    pub fn agent_count(&self) -> usize {
        self.table.read().agents.len()
    }

    // ── Templates ─────────────────────────────────────────────────────

    pub fn get_specialist_template(&self, type_name: &str) -> Option<&SpecialistTemplate> {
        self.templates.get(type_name)
    }

    /// Templates in registration order
    pub fn get_specialist_templates(&self) -> Vec<&SpecialistTemplate> {
        self.template_order
            .iter()
            .filter_map(|type_name| self.templates.get(type_name))
            .collect()
    }

    /// Template type whose identity name matches, ignoring case
    pub fn find_type_by_identity_name(&self, name: &str) -> Option<&str> {
        self.get_specialist_templates()
            .into_iter()
            .find(|t| t.identity.name.eq_ignore_ascii_case(name))
            .map(|t| t.type_name.as_str())
    }

    pub fn default_exclusions(&self) -> &[String] {
        &self.default_exclusions
    }

    /// Effective tool-access patterns for a role.
    ///
    /// Unknown types get `*` plus every default exclusion. Known types get
    /// their own patterns plus the default exclusions that do not target a
    /// tool the template names explicitly.
    pub fn get_tool_access_for_type(&self, type_name: &str) -> Vec<String> {
        match self.templates.get(type_name) {
            Some(template) => effective_tool_access(&template.tools, &self.default_exclusions),
            None => unrestricted_tool_access(&self.default_exclusions),
        }
    }

    /// Template delegation config, or the restrictive default
    pub fn get_delegation_config(&self, type_name: &str) -> DelegationConfig {
        self.templates
            .get(type_name)
            .and_then(|t| t.delegation.clone())
            .unwrap_or_default()
    }

    /// Check whether `source_type` may delegate to `target_type` while
    /// `current_workflow` is running. Returns `Ok(true)` or the specific
    /// denial.
    pub fn can_delegate(
        &self,
        source_type: &str,
        target_type: &str,
        current_workflow: Option<&str>,
    ) -> Result<bool, DelegationError> {
        let source = self.get_delegation_config(source_type);
        let target = self.get_delegation_config(target_type);

        check_delegation(source_type, &source, target_type, &target, current_workflow)
            .inspect_err(|e| {
                debug!(
                    source_type,
                    target_type,
                    workflow = ?current_workflow,
                    reason = %e,
                    "Delegation denied"
                );
            })?;

        Ok(true)
    }

    pub fn can_supervisor_invoke(&self, type_name: &str) -> bool {
        self.get_delegation_config(type_name).supervisor_can_invoke
    }

    // ── Messaging ─────────────────────────────────────────────────────

    /// Deliver a communication to one agent and wait for its handler.
    ///
    /// A stale target id is logged and dropped; handler failures are logged.
    /// Neither surfaces to the sender.
    pub async fn route_communication(&self, comm: AgentCommunication, to_agent_id: &str) {
        let Some(target) = self.get_agent(to_agent_id) else {
            warn!(
                from = %comm.from_agent,
                to = to_agent_id,
                kind = %comm.kind,
                "Routing target not found, dropping communication"
            );
            return;
        };

        deliver(target, comm).await;
    }

    /// Deliver to every agent except the sender and `exclude_id`, one at a
    /// time in registration order.
    pub async fn broadcast_to_all(&self, comm: AgentCommunication, exclude_id: Option<&str>) {
        let recipients: Vec<_> = self
            .get_agents()
            .into_iter()
            .filter(|agent| {
                let id = agent.identity().id.as_str();
                id != comm.from_agent && Some(id) != exclude_id
            })
            .collect();

        debug!(
            from = %comm.from_agent,
            kind = %comm.kind,
            recipients = recipients.len(),
            "Broadcasting communication"
        );

        for agent in recipients {
            let mut addressed = comm.clone();
            addressed.to_agent = agent.identity().id.clone();
            deliver(agent, addressed).await;
        }
    }

    /// Run every agent's shutdown hook in registration order, then forget
    /// all agents.
    pub async fn shutdown(&self) {
        let agents = self.get_agents();
        info!(agents = agents.len(), "Shutting down agent registry");

        for agent in &agents {
            agent.shutdown().await;
        }

        let mut table = self.table.write();
        table.agents.clear();
        table.names.clear();
        table.order.clear();
    }
}

async fn deliver(target: Arc<dyn Agent>, comm: AgentCommunication) {
    let to = target.identity().id.clone();
    let from = comm.from_agent.clone();
    if let Err(e) = target.receive_from_agent(comm).await {
        warn!(from = %from, to = %to, error = %e, "Agent failed to handle communication");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{CommunicationKind, RegistryAware};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Weak;

    struct RecordingAgent {
        identity: AgentIdentity,
        capabilities: AgentCapabilities,
        received: Mutex<Vec<AgentCommunication>>,
        log: Arc<Mutex<Vec<String>>>,
        registry: Mutex<Option<Weak<AgentRegistry>>>,
        fail: bool,
    }

    impl RecordingAgent {
        fn build(identity: AgentIdentity, log: Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                identity,
                capabilities: AgentCapabilities::unrestricted("research-worker"),
                received: Mutex::new(Vec::new()),
                log,
                registry: Mutex::new(None),
                fail,
            })
        }

        fn new(name: &str, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Self::build(
                AgentIdentity::new(name, AgentRole::Worker).with_id(name),
                log,
                false,
            )
        }

        fn failing(name: &str, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Self::build(
                AgentIdentity::new(name, AgentRole::Worker).with_id(name),
                log,
                true,
            )
        }
    }

    #[async_trait]
    impl Agent for RecordingAgent {
        fn identity(&self) -> &AgentIdentity {
            &self.identity
        }

        fn capabilities(&self) -> &AgentCapabilities {
            &self.capabilities
        }

        async fn receive_from_agent(&self, comm: AgentCommunication) -> anyhow::Result<()> {
            self.log.lock().push(format!("recv:{}", self.identity.id));
            self.received.lock().push(comm);
            if self.fail {
                anyhow::bail!("handler exploded");
            }
            Ok(())
        }

        async fn shutdown(&self) {
            self.log.lock().push(format!("shutdown:{}", self.identity.id));
        }

        fn as_registry_aware(&self) -> Option<&dyn RegistryAware> {
            Some(self)
        }
    }

    impl RegistryAware for RecordingAgent {
        fn attach_registry(&self, registry: Weak<AgentRegistry>) {
            *self.registry.lock() = Some(registry);
        }
    }

    fn new_log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn comm_from(from: &str) -> AgentCommunication {
        let mut comm =
            AgentCommunication::new(CommunicationKind::StatusUpdate, json!({"progress": 50}));
        comm.from_agent = from.to_string();
        comm
    }

    #[test]
    fn test_register_and_lookup_round_trip() {
        let registry = Arc::new(AgentRegistry::new());
        let agent = RecordingAgent::new("alpha", new_log());
        registry.register_agent(agent.clone()).unwrap();

        let found = registry.get_agent("alpha").unwrap();
        assert_eq!(found.identity(), &agent.identity);
        assert!(registry.get_agent_by_name("ALPHA").is_some());

        registry.unregister_agent("alpha");
        assert!(registry.get_agent("alpha").is_none());
        assert!(registry.get_agent_by_name("alpha").is_none());

        // Unregistering twice is a no-op
        registry.unregister_agent("alpha");
        assert_eq!(registry.agent_count(), 0);
    }

    #[test]
    fn test_register_injects_registry_reference() {
        let registry = Arc::new(AgentRegistry::new());
        let agent = RecordingAgent::new("alpha", new_log());
        registry.register_agent(agent.clone()).unwrap();

        let weak = agent.registry.lock().clone().unwrap();
        assert!(Arc::ptr_eq(&weak.upgrade().unwrap(), &registry));
    }

    #[test]
    fn test_duplicate_id_and_name_rejected() {
        let registry = Arc::new(AgentRegistry::new());
        let log = new_log();
        registry
            .register_agent(RecordingAgent::new("alpha", log.clone()))
            .unwrap();

        let err = registry
            .register_agent(RecordingAgent::new("alpha", log.clone()))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateId("alpha".to_string()));

        let clash = RecordingAgent::build(
            AgentIdentity::new("Alpha", AgentRole::Worker).with_id("other"),
            log,
            false,
        );
        let err = registry.register_agent(clash).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("Alpha".to_string()));
        assert_eq!(registry.agent_count(), 1);
    }

    #[test]
    fn test_tool_access_keeps_explicit_includes() {
        let registry = AgentRegistry::new();

        // deep-research-lead lists delegate_to_specialist explicitly
        let lead = registry.get_tool_access_for_type("deep-research-lead");
        assert!(lead.contains(&"delegate_to_specialist".to_string()));
        assert!(!lead.contains(&"!delegate_to_specialist".to_string()));
        assert!(lead.contains(&"!spawn_agent".to_string()));

        let worker = registry.get_tool_access_for_type("research-worker");
        assert!(worker.contains(&"!delegate_to_specialist".to_string()));

        let custom = registry.get_tool_access_for_type("made-up-type");
        assert_eq!(custom[0], "*");
        assert!(custom.contains(&"!delegate_to_specialist".to_string()));
        assert!(custom.contains(&"!spawn_agent".to_string()));
    }

    #[test]
    fn test_research_worker_workflow_restriction() {
        let registry = AgentRegistry::new();

        assert_eq!(
            registry.can_delegate("deep-research-lead", "research-worker", Some("deep-research")),
            Ok(true)
        );

        let err = registry
            .can_delegate("deep-research-lead", "research-worker", None)
            .unwrap_err();
        assert!(matches!(err, DelegationError::WorkflowMismatch { .. }));
    }

    #[test]
    fn test_can_delegate_denials() {
        let registry = AgentRegistry::new();

        let err = registry
            .can_delegate("research-worker", "browser-specialist", None)
            .unwrap_err();
        assert!(matches!(err, DelegationError::NotPermitted { .. }));

        let err = registry
            .can_delegate("deep-research-lead", "browser-specialist", None)
            .unwrap_err();
        assert!(matches!(err, DelegationError::TargetNotAllowed { .. }));

        // Unknown source types fall back to the restrictive default
        assert!(registry.can_delegate("made-up", "supervisor", None).is_err());

        // The supervisor has an empty allow-list
        assert_eq!(
            registry.can_delegate("supervisor", "browser-specialist", None),
            Ok(true)
        );
    }

    #[test]
    fn test_supervisor_invoke_flags() {
        let registry = AgentRegistry::new();
        assert!(registry.can_supervisor_invoke("browser-specialist"));
        assert!(!registry.can_supervisor_invoke("research-worker"));
        assert!(!registry.can_supervisor_invoke("supervisor"));
    }

    #[test]
    fn test_find_type_by_identity_name() {
        let registry = AgentRegistry::new();
        assert_eq!(
            registry.find_type_by_identity_name("researcher"),
            Some("research-worker")
        );
        assert_eq!(registry.find_type_by_identity_name("nobody"), None);
    }

    #[test]
    fn test_config_templates_override_builtins() {
        let mut config = CrewConfig::default();
        config.specialists.push(
            SpecialistTemplate::new(
                "research-worker",
                IdentityTemplate {
                    name: "Field Researcher".to_string(),
                    tag: String::new(),
                    role: AgentRole::Worker,
                    description: String::new(),
                },
            )
            .with_tools(["web_search"]),
        );

        let registry = AgentRegistry::from_config(&config);
        let template = registry.get_specialist_template("research-worker").unwrap();
        assert_eq!(template.identity.name, "Field Researcher");
        assert!(template.delegation.is_none());
        assert_eq!(
            registry.get_specialist_templates().len(),
            builtin_templates().len()
        );
    }

    #[tokio::test]
    async fn test_route_to_missing_agent_is_dropped() {
        let registry = Arc::new(AgentRegistry::new());
        registry
            .route_communication(comm_from("ghost"), "nobody")
            .await;
    }

    #[tokio::test]
    async fn test_route_swallows_handler_errors() {
        let registry = Arc::new(AgentRegistry::new());
        let log = new_log();
        let agent = RecordingAgent::failing("bravo", log.clone());
        registry.register_agent(agent.clone()).unwrap();

        registry.route_communication(comm_from("alpha"), "bravo").await;
        assert_eq!(agent.received.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender_and_excluded_in_order() {
        let registry = Arc::new(AgentRegistry::new());
        let log = new_log();
        for name in ["a", "b", "c", "d"] {
            registry
                .register_agent(RecordingAgent::new(name, log.clone()))
                .unwrap();
        }

        registry.broadcast_to_all(comm_from("a"), Some("c")).await;

        assert_eq!(*log.lock(), vec!["recv:b", "recv:d"]);
    }

    #[tokio::test]
    async fn test_broadcast_addresses_each_recipient() {
        let registry = Arc::new(AgentRegistry::new());
        let log = new_log();
        let b = RecordingAgent::new("b", log.clone());
        registry.register_agent(b.clone()).unwrap();

        registry.broadcast_to_all(comm_from("a"), None).await;
        assert_eq!(b.received.lock()[0].to_agent, "b");
    }

    #[tokio::test]
    async fn test_shutdown_runs_hooks_then_clears() {
        let registry = Arc::new(AgentRegistry::new());
        let log = new_log();
        for name in ["a", "b"] {
            registry
                .register_agent(RecordingAgent::new(name, log.clone()))
                .unwrap();
        }

        registry.shutdown().await;

        assert_eq!(*log.lock(), vec!["shutdown:a", "shutdown:b"]);
        assert_eq!(registry.agent_count(), 0);
        assert!(registry.get_agent_by_name("a").is_none());
    }
}
