//! Human-in-the-loop interactions
//!
//! Agents ask a human something through the [`InteractionBroker`] and await
//! a handle; a UI answers with `handle_response` or `cancel`, or the request
//! times out.

pub mod broker;
pub mod types;

pub use broker::{InteractionBroker, InteractionHandle};
pub use types::{
    ApprovalDecision, FieldKind, FormField, InteractionEvent, InteractionKind, InteractionOption,
    InteractionRequest, InteractionResponse, InteractionSpec, Priority, ResponseStatus,
};
