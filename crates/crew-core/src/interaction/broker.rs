//! Human-in-the-loop broker
//!
//! Each request owns a slot whose state moves `Pending -> Resolved` exactly
//! once under its lock. An explicit response, a cancel and the expiry timer
//! all race for that transition; whoever wins removes the slot, stops the
//! timer and wakes the waiting handle.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::types::{
    ApprovalDecision, FieldKind, FormField, InteractionEvent, InteractionKind, InteractionOption,
    InteractionRequest, InteractionResponse, InteractionSpec, Priority, ResponseStatus,
};
use crate::config::InteractionConfig;
use crate::constants;

const YES: &str = "yes";
const NO: &str = "no";
const APPROVE: &str = "approve";
const REJECT: &str = "reject";
const COMMENT_FIELD: &str = "comment";
const VALUE_FIELD: &str = "value";

enum SlotState {
    Pending {
        responder: oneshot::Sender<InteractionResponse>,
        timer: CancellationToken,
    },
    Resolved(ResponseStatus),
}

struct Slot {
    request: InteractionRequest,
    state: Mutex<SlotState>,
}

struct BrokerInner {
    pending: DashMap<String, Arc<Slot>>,
    events: broadcast::Sender<InteractionEvent>,
    default_timeout: Duration,
}

impl BrokerInner {
    /// First caller for a pending id wins; everyone else gets `false`.
    fn resolve(&self, response: InteractionResponse) -> bool {
        let id = response.request_id.clone();
        let Some(slot) = self.pending.get(&id).map(|entry| entry.value().clone()) else {
            debug!(request_id = %id, status = ?response.status, "No pending interaction");
            return false;
        };

        let won = {
            let mut state = slot.state.lock();
            match std::mem::replace(&mut *state, SlotState::Resolved(response.status)) {
                SlotState::Pending { responder, timer } => Some((responder, timer)),
                already @ SlotState::Resolved(_) => {
                    *state = already;
                    None
                }
            }
        };
        let Some((responder, timer)) = won else {
            return false;
        };

        self.pending.remove(&id);
        timer.cancel();

        info!(
            request_id = %id,
            kind = ?slot.request.kind,
            status = ?response.status,
            "Interaction resolved"
        );

        let event = match response.status {
            ResponseStatus::Timeout => InteractionEvent::TimedOut {
                request_id: id.clone(),
            },
            _ => InteractionEvent::Resolved {
                response: response.clone(),
            },
        };
        // Waiter may have given up (e.g. `notify`)
        let _ = responder.send(response);
        let _ = self.events.send(event);
        true
    }
}

/// Awaitable side of a pending request
pub struct InteractionHandle {
    request: InteractionRequest,
    receiver: oneshot::Receiver<InteractionResponse>,
}

impl InteractionHandle {
    pub fn id(&self) -> &str {
        &self.request.id
    }

    pub fn request(&self) -> &InteractionRequest {
        &self.request
    }

    /// Wait for the terminal response. A broker dropped mid-wait reads as
    /// cancelled.
    pub async fn wait(self) -> InteractionResponse {
        let id = self.request.id;
        self.receiver
            .await
            .unwrap_or_else(|_| InteractionResponse::cancelled(&id))
    }
}

/// Cheap to clone; clones share the same pending set.
#[derive(Clone)]
pub struct InteractionBroker {
    inner: Arc<BrokerInner>,
}

impl Default for InteractionBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionBroker {
    pub fn new() -> Self {
        Self::with_default_timeout(constants::interaction::DEFAULT_TIMEOUT)
    }

    pub fn with_default_timeout(default_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(constants::interaction::EVENT_CAPACITY);
        Self {
            inner: Arc::new(BrokerInner {
                pending: DashMap::new(),
                events,
                default_timeout,
            }),
        }
    }

    pub fn from_config(config: &InteractionConfig) -> Self {
        Self::with_default_timeout(config.default_timeout())
    }

    /// Observe requests and their resolutions
    pub fn subscribe(&self) -> broadcast::Receiver<InteractionEvent> {
        self.inner.events.subscribe()
    }

    /// Register a pending request and start its timer. Must be called from
    /// within a tokio runtime.
    pub fn request(&self, spec: InteractionSpec) -> InteractionHandle {
        let timeout = spec.timeout.unwrap_or(self.inner.default_timeout);
        let created_at = chrono::Utc::now();
        let expires_at = (!timeout.is_zero())
            .then(|| chrono::Duration::from_std(timeout).ok())
            .flatten()
            .map(|ttl| created_at + ttl);

        let request = InteractionRequest {
            id: uuid::Uuid::new_v4().to_string(),
            kind: spec.kind,
            title: spec.title,
            message: spec.message,
            options: spec.options,
            fields: spec.fields,
            timeout_ms: millis(timeout),
            priority: spec.priority,
            context: spec.context,
            agent_id: spec.agent_id,
            created_at,
            expires_at,
        };

        let (responder, receiver) = oneshot::channel();
        let timer = CancellationToken::new();
        let slot = Arc::new(Slot {
            request: request.clone(),
            state: Mutex::new(SlotState::Pending {
                responder,
                timer: timer.clone(),
            }),
        });
        self.inner.pending.insert(request.id.clone(), slot);

        if !timeout.is_zero() {
            let inner = Arc::downgrade(&self.inner);
            let id = request.id.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        if let Some(inner) = inner.upgrade() {
                            if inner.resolve(InteractionResponse::timed_out(&id)) {
                                debug!(request_id = %id, "Interaction timed out");
                            }
                        }
                    }
                    _ = timer.cancelled() => {}
                }
            });
        }

        info!(
            request_id = %request.id,
            kind = ?request.kind,
            priority = ?request.priority,
            timeout_ms = request.timeout_ms,
            "Interaction requested"
        );
        let _ = self.inner.events.send(InteractionEvent::Requested {
            request: request.clone(),
        });

        InteractionHandle { request, receiver }
    }

    /// Resolve a pending request with a human response. Returns `false` when
    /// the id is not pending (unknown, already resolved, timed out).
    pub fn handle_response(&self, response: InteractionResponse) -> bool {
        self.inner.resolve(response)
    }

    /// Resolve a pending request as cancelled
    pub fn cancel(&self, request_id: &str) -> bool {
        self.inner
            .resolve(InteractionResponse::cancelled(request_id))
    }

    /// Unresolved requests, oldest first
    pub fn get_pending(&self) -> Vec<InteractionRequest> {
        let mut pending: Vec<_> = self
            .inner
            .pending
            .iter()
            .map(|entry| entry.value().request.clone())
            .collect();
        pending.sort_by_key(|r| r.created_at);
        pending
    }

    pub fn is_pending(&self, request_id: &str) -> bool {
        self.inner.pending.contains_key(request_id)
    }

    // ── Typed helpers ─────────────────────────────────────────────────

    /// Request and wait
    pub async fn ask(&self, spec: InteractionSpec) -> InteractionResponse {
        self.request(spec).wait().await
    }

    /// Yes/no question. Anything but an explicit "yes" is `false`.
    pub async fn confirm(&self, title: &str, message: &str, timeout: Option<Duration>) -> bool {
        let spec = with_timeout(
            InteractionSpec::new(InteractionKind::Confirmation, title, message).with_options(vec![
                InteractionOption::new(YES, "Yes"),
                InteractionOption::new(NO, "No"),
            ]),
            timeout,
        );
        let response = self.ask(spec).await;
        response.is_completed() && response.selected_option.as_deref() == Some(YES)
    }

    /// Pick one of `choices`; option ids are the choice strings themselves.
    pub async fn choose(
        &self,
        title: &str,
        message: &str,
        choices: &[&str],
        timeout: Option<Duration>,
    ) -> Option<String> {
        let options = choices
            .iter()
            .map(|choice| InteractionOption::new(*choice, *choice))
            .collect();
        let spec = with_timeout(
            InteractionSpec::new(InteractionKind::Choice, title, message).with_options(options),
            timeout,
        );
        let response = self.ask(spec).await;
        if response.is_completed() {
            response.selected_option
        } else {
            None
        }
    }

    /// Free-text answer (field `value`)
    pub async fn prompt(
        &self,
        title: &str,
        message: &str,
        timeout: Option<Duration>,
    ) -> Option<String> {
        let spec = with_timeout(
            InteractionSpec::new(InteractionKind::TextInput, title, message)
                .with_fields(vec![FormField::text(VALUE_FIELD, title).required()]),
            timeout,
        );
        let response = self.ask(spec).await;
        if !response.is_completed() {
            return None;
        }
        response.field_str(VALUE_FIELD).map(ToString::to_string)
    }

    /// Structured form; returns the submitted data
    pub async fn form(
        &self,
        title: &str,
        message: &str,
        fields: Vec<FormField>,
        timeout: Option<Duration>,
    ) -> Option<Map<String, Value>> {
        let spec = with_timeout(
            InteractionSpec::new(InteractionKind::Form, title, message).with_fields(fields),
            timeout,
        );
        let response = self.ask(spec).await;
        if response.is_completed() {
            response.form_data
        } else {
            None
        }
    }

    /// Approve/reject with an optional comment
    pub async fn approve(
        &self,
        title: &str,
        message: &str,
        timeout: Option<Duration>,
    ) -> ApprovalDecision {
        let spec = with_timeout(
            InteractionSpec::new(InteractionKind::Approval, title, message)
                .with_options(vec![
                    InteractionOption::new(APPROVE, "Approve"),
                    InteractionOption::new(REJECT, "Reject"),
                ])
                .with_fields(vec![FormField::text(COMMENT_FIELD, "Comment")
                    .of_kind(FieldKind::Multiline)]),
            timeout,
        );
        let response = self.ask(spec).await;
        if !response.is_completed() {
            return ApprovalDecision::default();
        }
        ApprovalDecision {
            approved: response.selected_option.as_deref() == Some(APPROVE),
            comment: response
                .field_str(COMMENT_FIELD)
                .filter(|c| !c.trim().is_empty())
                .map(ToString::to_string),
        }
    }

    /// Fire-and-forget notice. Never expires; it stays pending until a UI
    /// acknowledges or cancels it. Returns the request id.
    pub fn notify(&self, title: &str, message: &str, priority: Priority) -> String {
        let handle = self.request(
            InteractionSpec::new(InteractionKind::Notification, title, message)
                .with_timeout(Duration::ZERO)
                .with_priority(priority),
        );
        handle.id().to_string()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn with_timeout(spec: InteractionSpec, timeout: Option<Duration>) -> InteractionSpec {
    match timeout {
        Some(timeout) => spec.with_timeout(timeout),
        None => spec,
    }
}
