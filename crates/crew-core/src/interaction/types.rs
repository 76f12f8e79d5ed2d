//! Interaction request/response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionKind {
    Confirmation,
    Choice,
    TextInput,
    Form,
    Approval,
    Notification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionOption {
    pub id: String,
    pub label: String,
}

impl InteractionOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Multiline,
    Number,
    Boolean,
}

/// One input in a form-like request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

impl FormField {
    pub fn text(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind: FieldKind::Text,
            required: false,
        }
    }

    pub fn of_kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// What a caller asks for; the broker turns it into an [`InteractionRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionSpec {
    pub kind: InteractionKind,
    pub title: String,
    pub message: String,
    pub options: Vec<InteractionOption>,
    pub fields: Vec<FormField>,
    /// `None` uses the broker default; `Some(Duration::ZERO)` never expires.
    pub timeout: Option<Duration>,
    pub priority: Priority,
    pub context: Option<Value>,
    pub agent_id: Option<String>,
}

impl InteractionSpec {
    pub fn new(kind: InteractionKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            options: Vec::new(),
            fields: Vec::new(),
            timeout: None,
            priority: Priority::default(),
            context: None,
            agent_id: None,
        }
    }

    pub fn with_options(mut self, options: Vec<InteractionOption>) -> Self {
        self.options = options;
        self
    }

    pub fn with_fields(mut self, fields: Vec<FormField>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn from_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }
}

/// A request as seen by observers and `get_pending`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRequest {
    pub id: String,
    pub kind: InteractionKind,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<InteractionOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FormField>,
    /// 0 = no timeout
    pub timeout_ms: u64,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Completed,
    Cancelled,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionResponse {
    pub request_id: String,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_data: Option<Map<String, Value>>,
    #[serde(default = "Utc::now")]
    pub responded_at: DateTime<Utc>,
}

impl InteractionResponse {
    fn terminal(request_id: &str, status: ResponseStatus) -> Self {
        Self {
            request_id: request_id.to_string(),
            status,
            selected_option: None,
            form_data: None,
            responded_at: Utc::now(),
        }
    }

    /// Completed with a chosen option
    pub fn with_option(request_id: &str, option: impl Into<String>) -> Self {
        Self {
            selected_option: Some(option.into()),
            ..Self::terminal(request_id, ResponseStatus::Completed)
        }
    }

    /// Completed with submitted form data
    pub fn with_form(request_id: &str, data: Map<String, Value>) -> Self {
        Self {
            form_data: Some(data),
            ..Self::terminal(request_id, ResponseStatus::Completed)
        }
    }

    /// Completed without payload (acknowledged)
    pub fn completed(request_id: &str) -> Self {
        Self::terminal(request_id, ResponseStatus::Completed)
    }

    pub fn cancelled(request_id: &str) -> Self {
        Self::terminal(request_id, ResponseStatus::Cancelled)
    }

    pub fn timed_out(request_id: &str) -> Self {
        Self::terminal(request_id, ResponseStatus::Timeout)
    }

    pub fn is_completed(&self) -> bool {
        self.status == ResponseStatus::Completed
    }

    /// String value of a form field
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.form_data.as_ref()?.get(name)?.as_str()
    }
}

/// Outcome of `approve`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub comment: Option<String>,
}

/// Broker lifecycle notifications
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionEvent {
    Requested { request: InteractionRequest },
    Resolved { response: InteractionResponse },
    TimedOut { request_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(
            serde_json::to_value(InteractionKind::TextInput).unwrap(),
            json!("text-input")
        );
        assert_eq!(
            serde_json::to_value(ResponseStatus::Timeout).unwrap(),
            json!("timeout")
        );
    }

    #[test]
    fn test_response_parses_from_ui_payload() {
        let response: InteractionResponse = serde_json::from_value(json!({
            "request_id": "abc",
            "status": "completed",
            "form_data": {"comment": "ship it"},
            "responded_at": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(response.is_completed());
        assert_eq!(response.field_str("comment"), Some("ship it"));
        assert_eq!(response.selected_option, None);
    }

    #[test]
    fn test_response_without_timestamp_is_stamped_now() {
        let before = Utc::now();
        let response: InteractionResponse = serde_json::from_value(json!({
            "request_id": "abc",
            "status": "completed",
            "selected_option": "yes"
        }))
        .unwrap();
        assert_eq!(response.selected_option.as_deref(), Some("yes"));
        assert!(response.responded_at >= before);
    }

    #[test]
    fn test_priority_order() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::Low < Priority::Normal);
        assert_eq!(Priority::default(), Priority::Normal);
    }
}
