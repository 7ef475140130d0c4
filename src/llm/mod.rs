//! Decision interface - the boundary to LLM providers
//!
//! This module provides:
//! - Transcript and completion types
//! - LlmClient trait and the scripted MockLlmClient
//! - ProviderRegistry for resolving model ids to clients

pub mod client;
pub mod registry;
pub mod types;

pub use client::{LlmClient, LlmError, MockLlmClient};
pub use registry::ProviderRegistry;
pub use types::{
    CompletionRequest, CompletionResponse, Message, Role, StopReason, ToolCall, ToolDefinition, Usage,
};
