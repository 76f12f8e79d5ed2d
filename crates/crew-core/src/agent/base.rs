//! Base agent runtime
//!
//! `BaseAgent` carries what every agent shares: identity, capabilities,
//! lifecycle state, the injected registry reference and the services it runs
//! turns with. Agent-specific behavior plugs in through a
//! [`CommunicationHandler`].

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use super::communication::AgentCommunication;
use super::handler::{CommunicationHandler, Inbox};
use super::prompt::{tool_summary, PromptBuilder};
use super::state::{AgentState, AgentStateError, AgentStatus, StateUpdate};
use super::{Agent, RegistryAware};
use crate::ai::{
    parse_tool_arguments, AiToolCall, Content, GenerateOptions, GenerationService, ModelMessage,
    Role,
};
use crate::config::AgentRuntimeConfig;
use crate::constants;
use crate::interaction::{
    InteractionBroker, InteractionHandle, InteractionResponse, InteractionSpec,
};
use crate::ports::{AgentAttribution, Channel, MemoryProvider, SendOptions, SkillProvider};
use crate::registry::{
    AgentCapabilities, AgentIdentity, AgentRegistry, DelegationError, SpecialistTemplate,
};
use crate::tools::{
    ToolContext, ToolDefinition, ToolEngine, ToolError, ToolMatcher, ToolRequest, ToolResult,
    ToolSource,
};

/// Static description of one agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub identity: AgentIdentity,
    pub capabilities: AgentCapabilities,
    pub max_iterations: usize,
}

impl AgentConfig {
    pub fn new(identity: AgentIdentity, capabilities: AgentCapabilities) -> Self {
        Self {
            identity,
            capabilities,
            max_iterations: constants::agent::MAX_ITERATIONS,
        }
    }

    /// Instantiate a specialist of `type_name` with the registry's effective
    /// tool access for that type.
    pub fn for_type(registry: &AgentRegistry, type_name: &str) -> Option<Self> {
        let template: &SpecialistTemplate = registry.get_specialist_template(type_name)?;
        Some(Self::new(
            AgentIdentity::from_template(&template.identity),
            AgentCapabilities::new(type_name, registry.get_tool_access_for_type(type_name)),
        ))
    }

    pub fn with_runtime(mut self, runtime: &AgentRuntimeConfig) -> Self {
        self.max_iterations = runtime.max_iterations;
        self
    }
}

/// Collaborators an agent may run with. Every one is optional; features that
/// need a missing collaborator degrade instead of failing construction.
#[derive(Clone, Default)]
pub struct AgentServices {
    pub engine: Option<Arc<ToolEngine>>,
    pub generator: Option<Arc<dyn GenerationService>>,
    pub broker: Option<InteractionBroker>,
    pub memory: Option<Arc<dyn MemoryProvider>>,
    pub skills: Option<Arc<dyn SkillProvider>>,
}

impl AgentServices {
    pub fn with_engine(mut self, engine: Arc<ToolEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn GenerationService>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_broker(mut self, broker: InteractionBroker) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryProvider>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_skills(mut self, skills: Arc<dyn SkillProvider>) -> Self {
        self.skills = Some(skills);
        self
    }
}

/// What a turn produced
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Final assistant text
    pub text: String,
    pub iterations: usize,
    pub tool_results: Vec<ToolResult>,
    /// Stopped because the iteration cap was reached
    pub hit_limit: bool,
}

pub struct BaseAgent {
    config: AgentConfig,
    services: AgentServices,
    matcher: ToolMatcher,
    state: RwLock<AgentState>,
    registry: RwLock<Option<Weak<AgentRegistry>>>,
    handler: Arc<dyn CommunicationHandler>,
}

impl BaseAgent {
    pub fn new(config: AgentConfig, services: AgentServices) -> Self {
        let matcher = match &services.engine {
            Some(engine) => engine.matcher(&config.capabilities.tool_access),
            None => ToolMatcher::new(&config.capabilities.tool_access, true),
        };
        Self {
            config,
            services,
            matcher,
            state: RwLock::new(AgentState::default()),
            registry: RwLock::new(None),
            handler: Arc::new(Inbox::new()),
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn CommunicationHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn state(&self) -> AgentState {
        self.state.read().clone()
    }

    pub fn status(&self) -> AgentStatus {
        self.state.read().status
    }

    pub fn services(&self) -> &AgentServices {
        &self.services
    }

    /// Live registry, if one was injected and is still alive
    pub fn registry(&self) -> Option<Arc<AgentRegistry>> {
        self.registry.read().as_ref().and_then(Weak::upgrade)
    }

    pub fn update_state(&self, update: StateUpdate) -> Result<(), AgentStateError> {
        let mut state = self.state.write();
        let from = state.status;
        state.apply(update).inspect_err(|e| {
            tracing::warn!(agent_id = %self.config.identity.id, error = %e, "Rejected state update");
        })?;
        if state.status != from {
            tracing::debug!(
                agent_id = %self.config.identity.id,
                from = %from,
                to = %state.status,
                "Agent state changed"
            );
        }
        Ok(())
    }

    /// Move to working unless already there; idle and waiting agents wake up.
    fn ensure_working(&self) -> Result<(), AgentStateError> {
        self.update_state(StateUpdate::status(AgentStatus::Working))
    }

    // ── Tools ─────────────────────────────────────────────────────────

    pub fn can_use_tool(&self, name: &str) -> bool {
        self.matcher.allows(name)
    }

    /// Engine catalog narrowed to this agent's whitelist
    pub async fn get_tools_for_call(&self) -> Vec<ToolDefinition> {
        match &self.services.engine {
            Some(engine) => self.matcher.filter(engine.get_tools_for_call().await),
            None => Vec::new(),
        }
    }

    fn tool_context(&self) -> ToolContext {
        ToolContext::default().with_agent(self.config.identity.id.clone())
    }

    /// Execute model tool calls as one batch. Calls outside the whitelist
    /// fail without running; results keep call order.
    async fn execute_tool_calls(&self, calls: &[AiToolCall]) -> Vec<ToolResult> {
        let mut catalog: HashMap<String, ToolSource> = HashMap::new();
        for definition in self.get_tools_for_call().await {
            catalog.entry(definition.name).or_insert(definition.source);
        }

        let requests: Vec<ToolRequest> = calls
            .iter()
            .map(|call| {
                let source = catalog
                    .get(&call.name)
                    .copied()
                    .unwrap_or_else(|| ToolSource::classify(&call.name));
                ToolRequest::new(call.name.clone(), source, parse_tool_arguments(call))
                    .with_id(call.id.clone())
            })
            .collect();

        let (allowed, denied): (Vec<_>, Vec<_>) = requests
            .iter()
            .enumerate()
            .partition(|(_, request)| self.can_use_tool(&request.tool_name));

        let mut slots: Vec<Option<ToolResult>> = vec![None; requests.len()];
        for (index, request) in denied {
            let error = ToolError::NotAllowed {
                name: request.tool_name.clone(),
                agent_type: self.config.capabilities.agent_type.clone(),
            };
            tracing::warn!(agent_id = %self.config.identity.id, %error, "Blocked tool call");
            slots[index] = Some(refused(request, error));
        }

        let allowed_requests: Vec<ToolRequest> =
            allowed.iter().map(|(_, request)| (*request).clone()).collect();
        let results = match &self.services.engine {
            Some(engine) => {
                engine
                    .execute_tools_in(&allowed_requests, &self.tool_context())
                    .await
            }
            None => allowed_requests
                .iter()
                .map(|request| refused(request, ToolError::NoEngine))
                .collect(),
        };
        for ((index, _), result) in allowed.into_iter().zip(results) {
            slots[index] = Some(result);
        }

        slots.into_iter().flatten().collect()
    }

    // ── Output ────────────────────────────────────────────────────────

    /// Deliver `content` to a channel, attributed to this agent
    pub async fn send_to_channel(
        &self,
        channel: &dyn Channel,
        content: &str,
        options: SendOptions,
    ) -> Result<()> {
        let identity = &self.config.identity;
        match channel.as_attributed() {
            Some(attributed) => {
                let attribution = AgentAttribution {
                    agent_id: identity.id.clone(),
                    agent_name: identity.name.clone(),
                    agent_tag: identity.tag.clone(),
                    options,
                };
                attributed.send_as_agent(content, &attribution).await
            }
            None => {
                let prefixed = format!("[{}] {}", identity.display_label(), content);
                channel.send(&prefixed, &options).await
            }
        }
    }

    // ── Messaging ─────────────────────────────────────────────────────

    fn stamp(&self, mut comm: AgentCommunication) -> AgentCommunication {
        comm.from_agent = self.config.identity.id.clone();
        comm.timestamp = chrono::Utc::now();
        comm
    }

    /// Send a communication to another agent through the registry.
    /// Without a registry the message is logged and dropped.
    pub async fn send_to_agent(&self, target_id: &str, comm: AgentCommunication) {
        let mut comm = self.stamp(comm);
        comm.to_agent = target_id.to_string();

        match self.registry() {
            Some(registry) => registry.route_communication(comm, target_id).await,
            None => tracing::warn!(
                from = %comm.from_agent,
                to = target_id,
                kind = %comm.kind,
                "No registry attached, dropping communication"
            ),
        }
    }

    /// Send to every other registered agent except `exclude_id`
    pub async fn broadcast(&self, comm: AgentCommunication, exclude_id: Option<&str>) {
        let comm = self.stamp(comm);
        match self.registry() {
            Some(registry) => registry.broadcast_to_all(comm, exclude_id).await,
            None => tracing::warn!(
                from = %comm.from_agent,
                kind = %comm.kind,
                "No registry attached, dropping broadcast"
            ),
        }
    }

    /// Whether this agent may hand work to a `target_type` specialist
    pub fn delegation_allowed(
        &self,
        target_type: &str,
        current_workflow: Option<&str>,
    ) -> Result<bool, DelegationError> {
        let source_type = &self.config.capabilities.agent_type;
        match self.registry() {
            Some(registry) => registry.can_delegate(source_type, target_type, current_workflow),
            None => Err(DelegationError::NotPermitted {
                source_type: source_type.clone(),
            }),
        }
    }

    // ── Prompt ────────────────────────────────────────────────────────

    /// Assemble the system prompt. Sections whose collaborator is absent are
    /// left out.
    pub async fn build_prompt(
        &self,
        base: &str,
        mission: Option<&str>,
        context: Option<&str>,
    ) -> String {
        let memory = self.services.memory.as_ref().map(|m| m.format_for_prompt());
        let tools = match &self.services.engine {
            Some(_) => tool_summary(&self.get_tools_for_call().await),
            None => None,
        };
        let (skill_usage, skill_catalog) = match &self.services.skills {
            Some(skills) => (
                Some(skills.usage_instructions()),
                Some(skills.catalog_for_prompt()),
            ),
            None => (None, None),
        };

        PromptBuilder::new(base)
            .titled("Mission", mission)
            .titled("Context", context)
            .section_opt(memory)
            .section_opt(tools)
            .section_opt(skill_usage)
            .section_opt(skill_catalog)
            .build()
    }

    // ── Turns ─────────────────────────────────────────────────────────

    /// Run one agentic turn: generate, execute requested tools, feed the
    /// results back, until the model answers without tools or the iteration
    /// cap is hit.
    pub async fn run_turn(&self, system_prompt: &str, user_message: &str) -> Result<TurnOutcome> {
        let generator = self
            .services
            .generator
            .clone()
            .ok_or_else(|| anyhow!("No generation service attached"))?;

        self.update_state(
            StateUpdate::status(AgentStatus::Working).with_task(first_line(user_message)),
        )?;

        let options = GenerateOptions {
            tools: self.get_tools_for_call().await,
            ..Default::default()
        };
        let mut conversation = vec![
            ModelMessage::system(system_prompt),
            ModelMessage::user(user_message),
        ];
        let mut tool_results = Vec::new();
        let max_iterations = self.config.max_iterations.max(1);

        for iteration in 1..=max_iterations {
            let response = match generator.generate(&conversation, &options).await {
                Ok(response) => response,
                Err(e) => {
                    let _ = self.update_state(
                        StateUpdate::status(AgentStatus::Error)
                            .with_context("error", serde_json::json!(format!("{:#}", e))),
                    );
                    return Err(e).with_context(|| {
                        format!(
                            "Generation failed for agent {}",
                            self.config.identity.name
                        )
                    });
                }
            };

            if !response.wants_tools() {
                self.update_state(StateUpdate::default().clear_task())?;
                return Ok(TurnOutcome {
                    text: response.content,
                    iterations: iteration,
                    tool_results,
                    hit_limit: false,
                });
            }

            tracing::debug!(
                agent_id = %self.config.identity.id,
                iteration,
                tool_calls = response.tool_calls.len(),
                "Executing tool calls"
            );

            conversation.push(assistant_message(&response.content, &response.tool_calls));
            let results = self.execute_tool_calls(&response.tool_calls).await;
            conversation.push(ModelMessage {
                role: Role::Tool,
                content: results
                    .iter()
                    .map(|result| Content::ToolResult {
                        tool_use_id: result.id.clone(),
                        output: serde_json::Value::String(result.text().to_string()),
                        is_error: (!result.success).then_some(true),
                    })
                    .collect(),
            });
            tool_results.extend(results);
        }

        tracing::warn!(
            agent_id = %self.config.identity.id,
            max_iterations,
            "Turn stopped at iteration limit"
        );
        self.update_state(StateUpdate::default().clear_task())?;
        Ok(TurnOutcome {
            text: String::new(),
            iterations: max_iterations,
            tool_results,
            hit_limit: true,
        })
    }

    // ── Human interaction ─────────────────────────────────────────────

    /// Wait on a broker handle, marking the agent as waiting meanwhile
    pub async fn await_interaction(&self, handle: InteractionHandle) -> Result<InteractionResponse> {
        self.ensure_working()?;
        self.update_state(
            StateUpdate::default()
                .with_context("pending_interaction", serde_json::json!(handle.id())),
        )?;
        self.update_state(StateUpdate::status(AgentStatus::Waiting))?;

        let response = handle.wait().await;

        let mut resumed = StateUpdate::status(AgentStatus::Working);
        resumed
            .context
            .insert("pending_interaction".to_string(), serde_json::Value::Null);
        self.update_state(resumed)?;
        Ok(response)
    }

    /// Ask a human through the attached broker and wait for the answer
    pub async fn ask_human(&self, spec: InteractionSpec) -> Result<InteractionResponse> {
        let broker = self
            .services
            .broker
            .as_ref()
            .ok_or_else(|| anyhow!("No interaction broker attached"))?;
        let handle = broker.request(spec.from_agent(self.config.identity.id.clone()));
        self.await_interaction(handle).await
    }
}

#[async_trait]
impl Agent for BaseAgent {
    fn identity(&self) -> &AgentIdentity {
        &self.config.identity
    }

    fn capabilities(&self) -> &AgentCapabilities {
        &self.config.capabilities
    }

    async fn init(&self) -> Result<()> {
        tracing::info!(
            agent_id = %self.config.identity.id,
            name = %self.config.identity.name,
            agent_type = %self.config.capabilities.agent_type,
            "Agent initialized"
        );
        Ok(())
    }

    async fn receive_from_agent(&self, comm: AgentCommunication) -> Result<()> {
        let status = self.status();
        if status.is_terminal() {
            anyhow::bail!(
                "Agent {} is {} and no longer accepts communications",
                self.config.identity.name,
                status
            );
        }
        if status == AgentStatus::Idle {
            self.ensure_working()?;
        }
        self.handler.handle(self, comm).await
    }

    async fn shutdown(&self) {
        tracing::info!(agent_id = %self.config.identity.id, "Agent shutting down");
        if !self.status().is_terminal() {
            let _ = self.update_state(StateUpdate::status(AgentStatus::Completed).clear_task());
        }
    }

    fn as_registry_aware(&self) -> Option<&dyn RegistryAware> {
        Some(self)
    }
}

impl RegistryAware for BaseAgent {
    fn attach_registry(&self, registry: Weak<AgentRegistry>) {
        *self.registry.write() = Some(registry);
    }
}

fn refused(request: &ToolRequest, error: ToolError) -> ToolResult {
    ToolResult::from_outcome(
        request,
        Err(error),
        chrono::Utc::now(),
        std::time::Duration::ZERO,
    )
}

fn assistant_message(text: &str, calls: &[AiToolCall]) -> ModelMessage {
    let mut content = Vec::with_capacity(calls.len() + 1);
    if !text.is_empty() {
        content.push(Content::Text {
            text: text.to_string(),
        });
    }
    content.extend(calls.iter().map(|call| Content::ToolUse {
        id: call.id.clone(),
        name: call.name.clone(),
        input: parse_tool_arguments(call),
    }));
    ModelMessage {
        role: Role::Assistant,
        content,
    }
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim().to_string()
}
