//! Text/tool-call generation boundary
//!
//! The core never talks to an LLM provider directly; agents receive an
//! implementation of [`GenerationService`] at construction.

pub mod types;

use anyhow::Result;
use async_trait::async_trait;

pub use types::{
    parse_tool_arguments, AiToolCall, Content, GenerateOptions, GenerateResponse, ModelMessage,
    Role, StopReason,
};

/// Produces assistant responses and tool-call decisions
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(
        &self,
        messages: &[ModelMessage],
        options: &GenerateOptions,
    ) -> Result<GenerateResponse>;
}
