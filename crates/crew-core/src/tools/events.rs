//! Tool lifecycle events
//!
//! Every execution emits `Requested` before the tool runs and `Finished`
//! after, whatever the outcome. Listeners are untrusted: an error or panic in
//! one is logged and the remaining listeners still run.
//!
//! ## Built-in Listeners
//! - `LoggingListener` - Logs all tool executions with timing

use parking_lot::RwLock;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::request::{ToolRequest, ToolResult};

/// Lifecycle event for a single tool request
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolEvent {
    Requested { request: ToolRequest },
    Finished { result: ToolResult },
}

impl ToolEvent {
    pub fn request_id(&self) -> &str {
        match self {
            ToolEvent::Requested { request } => &request.id,
            ToolEvent::Finished { result } => &result.id,
        }
    }
}

/// Receives tool lifecycle events
pub trait ToolEventListener: Send + Sync {
    fn on_event(&self, event: &ToolEvent) -> anyhow::Result<()>;
}

impl<F> ToolEventListener for F
where
    F: Fn(&ToolEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &ToolEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Handle returned by `on_event`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct ListenerSet {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ToolEventListener>)>>,
}

impl ListenerSet {
    pub(crate) fn add(&self, listener: Arc<dyn ToolEventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver to every listener. Runs on a snapshot so listeners may
    /// (un)subscribe from inside a callback.
    pub(crate) fn emit(&self, event: &ToolEvent) {
        let snapshot: Vec<_> = self
            .listeners
            .read()
            .iter()
            .map(|(id, listener)| (*id, listener.clone()))
            .collect();

        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        listener = id.0,
                        request_id = event.request_id(),
                        error = %e,
                        "Tool event listener failed"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        listener = id.0,
                        request_id = event.request_id(),
                        "Tool event listener panicked"
                    );
                }
            }
        }
    }
}

/// Logging listener that logs all tool executions
#[derive(Debug, Default)]
pub struct LoggingListener;

impl LoggingListener {
    pub fn new() -> Self {
        Self
    }
}

impl ToolEventListener for LoggingListener {
    fn on_event(&self, event: &ToolEvent) -> anyhow::Result<()> {
        match event {
            ToolEvent::Requested { request } => {
                tracing::debug!(
                    tool = %request.tool_name,
                    source = %request.source,
                    request_id = %request.id,
                    group = ?request.group_id,
                    "Tool execution requested"
                );
            }
            ToolEvent::Finished { result } => {
                tracing::info!(
                    tool = %result.tool_name,
                    request_id = %result.id,
                    duration_ms = result.duration_ms,
                    success = result.success,
                    output_len = result.text().len(),
                    "Tool execution completed"
                );
            }
        }
        Ok(())
    }
}
