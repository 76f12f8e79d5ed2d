//! `crew demo` - a supervisor and a research worker wired end to end

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use crew_core::agent::{
    AgentCommunication, AgentConfig, AgentServices, BaseAgent, CommunicationHandler,
    CommunicationKind, Inbox,
};
use crew_core::interaction::{InteractionEvent, InteractionResponse};
use crew_core::ports::{Channel, SendOptions};
use crew_core::tools::{
    parse_params, LoggingListener, Tool, ToolContext, ToolOutput, ToolRequest, ToolSource,
};
use crew_core::{Agent, AgentRegistry, CrewConfig, InteractionBroker, ToolEngine};

/// Prints to stdout
struct ConsoleChannel;

#[async_trait]
impl Channel for ConsoleChannel {
    async fn send(&self, content: &str, _options: &SendOptions) -> Result<()> {
        println!("{}", content);
        Ok(())
    }

    async fn send_error(&self, message: &str, details: Option<&Value>) -> Result<()> {
        match details {
            Some(details) => println!("error: {} ({})", message, details),
            None => println!("error: {}", message),
        }
        Ok(())
    }
}

struct WordCountTool;

#[derive(serde::Deserialize)]
struct WordCountParams {
    text: String,
}

#[async_trait]
impl Tool for WordCountTool {
    fn name(&self) -> &str {
        "word_count"
    }

    fn description(&self) -> &str {
        "Count the words in a piece of text"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> ToolOutput {
        let params: WordCountParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        // Slow enough that grouped calls visibly overlap in the logs
        tokio::time::sleep(Duration::from_millis(200)).await;
        ToolOutput::success_data(json!({ "words": params.text.split_whitespace().count() }))
    }
}

struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "clock"
    }

    fn description(&self) -> &str {
        "Echo the request id and calling agent"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> ToolOutput {
        ToolOutput::success(format!(
            "request {} from {}",
            ctx.request_id,
            ctx.agent_id.as_deref().unwrap_or("cli")
        ))
    }
}

/// Worker behavior: answer task assignments with a task result
struct Responder;

#[async_trait]
impl CommunicationHandler for Responder {
    async fn handle(&self, agent: &BaseAgent, comm: AgentCommunication) -> Result<()> {
        if comm.kind != CommunicationKind::TaskAssignment {
            return Ok(());
        }
        let task = comm.payload["task"].as_str().unwrap_or_default();
        let reply = AgentCommunication::new(
            CommunicationKind::TaskResult,
            json!({ "task": task, "summary": format!("{} handled '{}'", agent.identity().name, task) }),
        );
        agent.send_to_agent(&comm.from_agent, reply).await;
        Ok(())
    }
}

pub async fn run(config: CrewConfig, registry: AgentRegistry, confirm_timeout: Duration) -> Result<()> {
    let registry = Arc::new(registry);

    let engine = Arc::new(ToolEngine::from_config(&config.tools));
    engine.on_event(Arc::new(LoggingListener::new()));
    engine.register_tool(ToolSource::Native, Arc::new(WordCountTool));
    engine.register_tool(ToolSource::Native, Arc::new(ClockTool));

    let broker = InteractionBroker::from_config(&config.interaction);
    let services = AgentServices::default()
        .with_engine(engine.clone())
        .with_broker(broker.clone());

    let inbox = Arc::new(Inbox::new());
    let supervisor = Arc::new(
        BaseAgent::new(
            AgentConfig::for_type(&registry, "supervisor")
                .ok_or_else(|| anyhow::anyhow!("No supervisor template"))?
                .with_runtime(&config.agent),
            services.clone(),
        )
        .with_handler(inbox.clone()),
    );
    let worker = Arc::new(
        BaseAgent::new(
            AgentConfig::for_type(&registry, "research-worker")
                .ok_or_else(|| anyhow::anyhow!("No research-worker template"))?
                .with_runtime(&config.agent),
            services,
        )
        .with_handler(Arc::new(Responder)),
    );

    for agent in [supervisor.clone(), worker.clone()] {
        agent.init().await?;
        registry.register_agent(agent)?;
    }

    let channel = ConsoleChannel;
    let tools: Vec<_> = supervisor
        .get_tools_for_call()
        .await
        .into_iter()
        .map(|t| t.name)
        .collect();
    supervisor
        .send_to_channel(
            &channel,
            &format!("tools available to me: {}", tools.join(", ")),
            SendOptions::default(),
        )
        .await?;

    // Two grouped counts run together, then the clock
    let batch = vec![
        ToolRequest::native("word_count", json!({"text": "the quick brown fox"})).in_group("count"),
        ToolRequest::native("word_count", json!({"text": "jumps over the lazy dog"})).in_group("count"),
        ToolRequest::native("clock", json!({})),
    ];
    for result in engine.execute_tools(&batch).await {
        println!(
            "{:<10} {:>4}ms  {}",
            result.tool_name,
            result.duration_ms,
            result.text()
        );
    }

    // The worker answers task assignments straight back into the supervisor's inbox
    match supervisor.delegation_allowed(&worker.capabilities().agent_type, Some("deep-research")) {
        Ok(_) => {
            supervisor
                .send_to_agent(
                    &worker.identity().id,
                    AgentCommunication::task("collect three sources on tokio"),
                )
                .await;
        }
        Err(e) => println!("delegation denied: {}", e),
    }
    if let Err(e) = supervisor.delegation_allowed(&worker.capabilities().agent_type, None) {
        println!("outside the workflow: {}", e);
    }
    for comm in inbox.drain() {
        println!("supervisor received {} from {}: {}", comm.kind, comm.from_agent, comm.payload);
    }

    let confirmed = ask_on_stdin(&broker, confirm_timeout).await;
    println!("confirmed: {}", confirmed);

    registry.shutdown().await;
    Ok(())
}

/// Ask a yes/no question and answer it from a stdin line
async fn ask_on_stdin(broker: &InteractionBroker, timeout: Duration) -> bool {
    let mut events = broker.subscribe();
    let asking = broker.clone();
    let question = tokio::spawn(async move {
        asking
            .confirm("Finish demo", "Mark the demo as done?", Some(timeout))
            .await
    });

    let request = loop {
        match events.recv().await {
            Ok(InteractionEvent::Requested { request }) => break Some(request),
            Ok(_) => continue,
            Err(_) => break None,
        }
    };

    if let Some(request) = request {
        println!("{} [yes/no] ({}s)", request.message, timeout.as_secs());
        let (tx, rx) = tokio::sync::oneshot::channel();
        // Dedicated thread: a blocking stdin read must not hold the runtime
        std::thread::spawn(move || {
            let mut line = String::new();
            if std::io::stdin().lock().read_line(&mut line).is_ok() {
                let _ = tx.send(line);
            }
        });
        let id = request.id.clone();
        let answering = broker.clone();
        tokio::spawn(async move {
            if let Ok(line) = rx.await {
                let option = if line.trim().eq_ignore_ascii_case("yes") || line.trim() == "y" {
                    "yes"
                } else {
                    "no"
                };
                answering.handle_response(InteractionResponse::with_option(&id, option));
            }
        });
    }

    question.await.unwrap_or(false)
}
