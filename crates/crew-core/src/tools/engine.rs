//! Tool execution engine
//!
//! Owns the tool maps, the optional plugin client and the event listeners.
//! Execution never fails outward: every request yields a `ToolResult`.

use futures::future::join_all;
use futures::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::events::{ListenerId, ListenerSet, ToolEvent, ToolEventListener};
use super::matching::ToolMatcher;
use super::plugin::{split_plugin_tool_name, PluginClient};
use super::registry::{Tool, ToolContext, ToolDefinition, ToolRegistry, ToolSource};
use super::request::{partition_units, ToolError, ToolRequest, ToolResult};
use crate::config::ToolsConfig;
use crate::constants;

pub struct ToolEngine {
    tools: ToolRegistry,
    plugin: RwLock<Option<Arc<dyn PluginClient>>>,
    listeners: ListenerSet,
    default_timeout: Duration,
    substring_fallback: bool,
}

impl Default for ToolEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolEngine {
    pub fn new() -> Self {
        Self {
            tools: ToolRegistry::new(),
            plugin: RwLock::new(None),
            listeners: ListenerSet::default(),
            default_timeout: constants::tools::DEFAULT_TIMEOUT,
            substring_fallback: true,
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self {
            default_timeout: config.timeout(),
            substring_fallback: config.substring_fallback,
            ..Self::new()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    // ── Registration ──────────────────────────────────────────────────

    pub fn register_tool(&self, source: ToolSource, tool: Arc<dyn Tool>) {
        self.tools.register(source, tool);
    }

    pub fn unregister_tool(&self, source: ToolSource, name: &str) -> bool {
        self.tools.unregister(source, name)
    }

    /// Route `server__tool` requests to this client, replacing any previous one.
    pub fn attach_plugin_client(&self, client: Arc<dyn PluginClient>) {
        *self.plugin.write() = Some(client);
    }

    fn plugin_client(&self) -> Option<Arc<dyn PluginClient>> {
        self.plugin.read().clone()
    }

    // ── Catalog ───────────────────────────────────────────────────────

    /// Registered tools followed by plugin-advertised tools
    pub async fn get_tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = self.tools.definitions();
        if let Some(client) = self.plugin_client() {
            definitions.extend(client.tools_for_call().await.into_iter().map(|mut def| {
                def.source = ToolSource::ExternalPlugin;
                def
            }));
        }
        definitions
    }

    /// Catalog handed to the generation service
    pub async fn get_tools_for_call(&self) -> Vec<ToolDefinition> {
        self.get_tool_definitions().await
    }

    /// Whitelist matcher using this engine's substring-fallback setting
    pub fn matcher<I, S>(&self, patterns: I) -> ToolMatcher
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ToolMatcher::new(patterns, self.substring_fallback)
    }

    // ── Listeners ─────────────────────────────────────────────────────

    pub fn on_event(&self, listener: Arc<dyn ToolEventListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    // ── Execution ─────────────────────────────────────────────────────

    pub async fn execute_tool(&self, request: &ToolRequest) -> ToolResult {
        self.execute_tool_in(request, &ToolContext::default()).await
    }

    /// Execute one request under `ctx`. Emits `Requested`, then `Finished`
    /// regardless of outcome.
    pub async fn execute_tool_in(&self, request: &ToolRequest, ctx: &ToolContext) -> ToolResult {
        self.listeners.emit(&ToolEvent::Requested {
            request: request.clone(),
        });

        let mut ctx = ctx.clone();
        ctx.request_id = request.id.clone();
        let timeout = ctx.timeout.unwrap_or(self.default_timeout);

        let started_at = chrono::Utc::now();
        let start = Instant::now();

        let guarded = AssertUnwindSafe(self.invoke(request, &ctx)).catch_unwind();
        let outcome = match tokio::time::timeout(timeout, guarded).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(tool = %request.tool_name, %message, "Tool panicked");
                Err(ToolError::Panicked {
                    name: request.tool_name.clone(),
                    message,
                })
            }
            Err(_) => {
                tracing::warn!(
                    tool = %request.tool_name,
                    timeout_secs = timeout.as_secs(),
                    "Tool execution timed out"
                );
                Err(ToolError::TimedOut {
                    name: request.tool_name.clone(),
                    secs: timeout.as_secs(),
                })
            }
        };

        let result = ToolResult::from_outcome(request, outcome, started_at, start.elapsed());
        self.listeners.emit(&ToolEvent::Finished {
            result: result.clone(),
        });
        result
    }

    pub async fn execute_tools(&self, requests: &[ToolRequest]) -> Vec<ToolResult> {
        self.execute_tools_in(requests, &ToolContext::default())
            .await
    }

    /// Execute a batch unit by unit. Members of a unit run concurrently; a
    /// unit finishes before the next starts. Results come back in request
    /// order.
    pub async fn execute_tools_in(
        &self,
        requests: &[ToolRequest],
        ctx: &ToolContext,
    ) -> Vec<ToolResult> {
        let mut slots: Vec<Option<ToolResult>> = vec![None; requests.len()];

        for unit in partition_units(requests) {
            if unit.len() > 1 {
                tracing::debug!(size = unit.len(), "Running concurrent tool unit");
            }
            let results = join_all(
                unit.iter()
                    .map(|&index| self.execute_tool_in(&requests[index], ctx)),
            )
            .await;
            for (index, result) in unit.into_iter().zip(results) {
                slots[index] = Some(result);
            }
        }

        slots.into_iter().flatten().collect()
    }

    /// Registered tools run in-process. Plugin names the engine does not hold
    /// go to the plugin client.
    async fn invoke(&self, request: &ToolRequest, ctx: &ToolContext) -> Result<String, ToolError> {
        if let Some(tool) = self.tools.get(request.source, &request.tool_name) {
            let output = tool.execute(request.parameters.clone(), ctx).await;
            return if output.is_error {
                Err(ToolError::Failed(output.output))
            } else {
                Ok(output.output)
            };
        }

        match request.source {
            ToolSource::Native | ToolSource::UserDefined => Err(ToolError::NotFound {
                name: request.tool_name.clone(),
                tool_source: request.source,
            }),
            ToolSource::ExternalPlugin => {
                let (server, tool) = split_plugin_tool_name(&request.tool_name)
                    .ok_or_else(|| ToolError::InvalidPluginName(request.tool_name.clone()))?;
                let client = self
                    .plugin_client()
                    .ok_or_else(|| ToolError::NoPluginClient(request.tool_name.clone()))?;
                let invocation = client
                    .invoke_tool(server, tool, request.parameters.clone())
                    .await
                    .map_err(|e| ToolError::Failed(format!("{:#}", e)))?;
                invocation.into_outcome().map_err(ToolError::Failed)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::plugin::PluginInvocation;
    use crate::tools::registry::ToolOutput;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    type Log = Arc<Mutex<Vec<String>>>;

    struct SleepTool {
        name: &'static str,
        delay: Duration,
        log: Log,
    }

    #[async_trait]
    impl Tool for SleepTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "Sleeps, then echoes its input"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, params: Value, _ctx: &ToolContext) -> ToolOutput {
            let label = params["label"].as_str().unwrap_or(self.name).to_string();
            self.log.lock().push(format!("start:{}", label));
            tokio::time::sleep(self.delay).await;
            self.log.lock().push(format!("end:{}", label));
            ToolOutput::success(label)
        }
    }

    struct FailTool;

    #[async_trait]
    impl Tool for FailTool {
        fn name(&self) -> &str {
            "fail"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> ToolOutput {
            ToolOutput::error("disk full")
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &str {
            "explode"
        }

        fn description(&self) -> &str {
            "Panics"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> ToolOutput {
            panic!("kaboom");
        }
    }

    struct FakePlugin {
        calls: Mutex<Vec<(String, String, Value)>>,
    }

    #[async_trait]
    impl PluginClient for FakePlugin {
        async fn tools_for_call(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "github__create_issue".to_string(),
                description: "Create an issue".to_string(),
                input_schema: json!({"type": "object"}),
                source: ToolSource::ExternalPlugin,
            }]
        }

        async fn invoke_tool(
            &self,
            server_id: &str,
            tool_name: &str,
            input: Value,
        ) -> anyhow::Result<PluginInvocation> {
            self.calls
                .lock()
                .push((server_id.to_string(), tool_name.to_string(), input));
            Ok(PluginInvocation::ok(json!({"number": 42})))
        }
    }

    fn sleeper(name: &'static str, millis: u64, log: &Log) -> Arc<dyn Tool> {
        Arc::new(SleepTool {
            name,
            delay: Duration::from_millis(millis),
            log: log.clone(),
        })
    }

    fn labelled(label: &str) -> ToolRequest {
        ToolRequest::native("sleep", json!({"label": label})).with_id(label)
    }

    #[tokio::test]
    async fn test_grouped_requests_overlap_and_units_run_in_order() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let engine = ToolEngine::new();
        engine.register_tool(ToolSource::Native, sleeper("sleep", 50, &log));

        let requests = vec![
            labelled("a").in_group("g"),
            labelled("b").in_group("g"),
            labelled("c"),
        ];
        let results = engine.execute_tools(&requests).await;

        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(results.iter().all(|r| r.success));

        let log = log.lock().clone();
        let pos = |entry: &str| log.iter().position(|e| e == entry).unwrap();
        // Both group members start before either finishes
        assert!(pos("start:a") < pos("end:b"));
        assert!(pos("start:b") < pos("end:a"));
        // Singleton unit starts only after the group is done
        assert!(pos("end:a") < pos("start:c"));
        assert!(pos("end:b") < pos("start:c"));
    }

    #[tokio::test]
    async fn test_results_follow_request_order_for_scattered_groups() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let engine = ToolEngine::new();
        engine.register_tool(ToolSource::Native, sleeper("sleep", 5, &log));

        let requests = vec![
            labelled("1").in_group("x"),
            labelled("2"),
            labelled("3").in_group("x"),
        ];
        let results = engine.execute_tools(&requests).await;
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);

        let log = log.lock().clone();
        let pos = |entry: &str| log.iter().position(|e| e == entry).unwrap();
        assert!(pos("end:3") < pos("start:2"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_failed_result_with_events() {
        let engine = ToolEngine::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        engine.on_event(Arc::new(move |event: &ToolEvent| -> anyhow::Result<()> {
            let kind = match event {
                ToolEvent::Requested { .. } => "requested",
                ToolEvent::Finished { .. } => "finished",
            };
            sink.lock().push(kind);
            Ok(())
        }));

        let result = engine
            .execute_tool(&ToolRequest::native("missing", json!({})))
            .await;
        assert!(!result.success);
        assert_eq!(result.text(), "Unknown native tool: missing");
        assert_eq!(*events.lock(), vec!["requested", "finished"]);
    }

    #[tokio::test]
    async fn test_tool_reported_error() {
        let engine = ToolEngine::new();
        engine.register_tool(ToolSource::Native, Arc::new(FailTool));

        let result = engine
            .execute_tool(&ToolRequest::native("fail", json!({})))
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("disk full"));
        assert!(result.output.is_none());
    }

    #[tokio::test]
    async fn test_timeout_becomes_failed_result() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let engine = ToolEngine::new().with_timeout(Duration::from_millis(20));
        engine.register_tool(ToolSource::Native, sleeper("slow", 5_000, &log));

        let result = engine
            .execute_tool(&ToolRequest::native("slow", json!({})))
            .await;
        assert!(!result.success);
        assert!(result.text().contains("timed out"));
        assert!(result.duration_ms < 5_000);
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_result_and_batch_continues() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let engine = ToolEngine::new();
        engine.register_tool(ToolSource::Native, Arc::new(PanicTool));
        engine.register_tool(ToolSource::Native, sleeper("sleep", 1, &log));

        let results = engine
            .execute_tools(&[
                ToolRequest::native("explode", json!({})),
                labelled("after"),
            ])
            .await;
        assert!(!results[0].success);
        assert!(results[0].text().contains("kaboom"));
        assert!(results[1].success);
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_affect_execution() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let engine = ToolEngine::new();
        engine.register_tool(ToolSource::Native, sleeper("sleep", 1, &log));
        engine.on_event(Arc::new(|_: &ToolEvent| -> anyhow::Result<()> {
            panic!("listener bug")
        }));
        let id = engine.on_event(Arc::new(|_: &ToolEvent| -> anyhow::Result<()> {
            anyhow::bail!("listener error")
        }));

        assert!(engine.execute_tool(&labelled("ok")).await.success);
        assert!(engine.remove_listener(id));
    }

    #[tokio::test]
    async fn test_user_defined_tools_resolve_by_catalog_name() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let engine = ToolEngine::new();
        engine.register_tool(ToolSource::UserDefined, sleeper("deploy", 1, &log));

        let result = engine
            .execute_tool(&ToolRequest::new(
                "user__deploy",
                ToolSource::UserDefined,
                json!({}),
            ))
            .await;
        assert!(result.success);
        assert_eq!(result.output.as_deref(), Some("deploy"));
    }

    #[tokio::test]
    async fn test_plugin_tools_listed_and_routed() {
        let engine = ToolEngine::new();
        let plugin = Arc::new(FakePlugin {
            calls: Mutex::new(Vec::new()),
        });
        engine.attach_plugin_client(plugin.clone());

        let names: Vec<_> = engine
            .get_tools_for_call()
            .await
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["github__create_issue"]);

        let result = engine
            .execute_tool(&ToolRequest::new(
                "github__create_issue",
                ToolSource::ExternalPlugin,
                json!({"title": "bug"}),
            ))
            .await;
        assert!(result.success);
        assert_eq!(result.output.as_deref(), Some("{\"number\":42}"));

        let calls = plugin.calls.lock();
        assert_eq!(calls[0].0, "github");
        assert_eq!(calls[0].1, "create_issue");
        assert_eq!(calls[0].2["title"], "bug");
    }

    #[tokio::test]
    async fn test_plugin_request_without_client_or_bad_name() {
        let engine = ToolEngine::new();
        let no_client = engine
            .execute_tool(&ToolRequest::new(
                "github__create_issue",
                ToolSource::ExternalPlugin,
                json!({}),
            ))
            .await;
        assert!(no_client.text().contains("No plugin client"));

        let bad_name = engine
            .execute_tool(&ToolRequest::new(
                "create_issue",
                ToolSource::ExternalPlugin,
                json!({}),
            ))
            .await;
        assert!(bad_name.text().contains("<server>__<tool>"));
    }

    #[tokio::test]
    async fn test_registered_plugin_tool_runs_locally_before_client() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let engine = ToolEngine::new();
        engine.register_tool(ToolSource::ExternalPlugin, sleeper("lint", 1, &log));

        let catalog: Vec<_> = engine
            .get_tools_for_call()
            .await
            .into_iter()
            .map(|d| (d.name, d.source))
            .collect();
        assert_eq!(catalog, vec![("lint".to_string(), ToolSource::ExternalPlugin)]);

        let local = engine
            .execute_tool(&ToolRequest::new("lint", ToolSource::ExternalPlugin, json!({})))
            .await;
        assert!(local.success);
        assert_eq!(local.output.as_deref(), Some("lint"));

        let plugin = Arc::new(FakePlugin {
            calls: Mutex::new(Vec::new()),
        });
        engine.attach_plugin_client(plugin.clone());
        let routed = engine
            .execute_tool(&ToolRequest::new(
                "github__create_issue",
                ToolSource::ExternalPlugin,
                json!({}),
            ))
            .await;
        assert!(routed.success);
        assert_eq!(plugin.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_context_timeout_overrides_engine_default() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let engine = ToolEngine::new();
        engine.register_tool(ToolSource::Native, sleeper("slow", 200, &log));

        let ctx = ToolContext::default().with_timeout(Duration::from_millis(20));
        let result = engine
            .execute_tool_in(&ToolRequest::native("slow", json!({})), &ctx)
            .await;
        assert!(!result.success);
        assert!(result.text().contains("timed out"));
    }

    #[test]
    fn test_from_config() {
        let config = ToolsConfig {
            timeout_secs: 7,
            substring_fallback: false,
            ..Default::default()
        };
        let engine = ToolEngine::from_config(&config);
        assert_eq!(engine.default_timeout(), Duration::from_secs(7));
        assert!(!engine.matcher(["memory"]).allows("memory_search"));
    }
}
