//! Execution-loop events for observability

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::panic_message;
use crate::id::truncate_chars;

/// Event type constants
pub mod event_types {
    pub const START: &str = "start";
    pub const THINKING: &str = "thinking";
    pub const TOOL_CALL: &str = "tool_call";
    pub const TOOL_RESULT: &str = "tool_result";
    pub const COMPLETE: &str = "complete";
    pub const ERROR: &str = "error";
}

/// Longest output excerpt carried in an event payload
const EVENT_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    pub agent_id: String,
    /// One of `event_types`
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl AgentEvent {
    pub fn new(agent_id: &str, event_type: &str, data: Value) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            event_type: event_type.to_string(),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn start(agent_id: &str, task: &str) -> Self {
        Self::new(agent_id, event_types::START, json!({ "task": task }))
    }

    pub fn thinking(agent_id: &str, iteration: u32) -> Self {
        Self::new(agent_id, event_types::THINKING, json!({ "iteration": iteration }))
    }

    pub fn tool_call(agent_id: &str, name: &str, arguments: &serde_json::Map<String, Value>) -> Self {
        Self::new(
            agent_id,
            event_types::TOOL_CALL,
            json!({ "name": name, "arguments": arguments }),
        )
    }

    pub fn tool_result(agent_id: &str, name: &str, success: bool, output: &str) -> Self {
        Self::new(
            agent_id,
            event_types::TOOL_RESULT,
            json!({
                "name": name,
                "success": success,
                "output": truncate_chars(output, EVENT_EXCERPT_CHARS)
            }),
        )
    }

    pub fn complete(agent_id: &str, content: &str) -> Self {
        Self::new(
            agent_id,
            event_types::COMPLETE,
            json!({ "response": truncate_chars(content, EVENT_EXCERPT_CHARS) }),
        )
    }

    pub fn error(agent_id: &str, error: &str) -> Self {
        Self::new(agent_id, event_types::ERROR, json!({ "error": error }))
    }
}

/// Observer notified on every loop transition.
///
/// Errors and panics are logged and never abort the run.
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(&self, event: &AgentEvent) -> eyre::Result<()>;
}

/// Adapter for plain closures
pub struct FnListener<F>(F);

#[async_trait]
impl<F> EventListener for FnListener<F>
where
    F: Fn(&AgentEvent) + Send + Sync,
{
    async fn on_event(&self, event: &AgentEvent) -> eyre::Result<()> {
        (self.0)(event);
        Ok(())
    }
}

pub fn listener_fn<F>(f: F) -> Arc<dyn EventListener>
where
    F: Fn(&AgentEvent) + Send + Sync + 'static,
{
    Arc::new(FnListener(f))
}

pub(crate) async fn notify(listeners: &[Arc<dyn EventListener>], event: &AgentEvent) {
    for listener in listeners {
        match AssertUnwindSafe(listener.on_event(event)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Event listener error: {:#}", e),
            Err(payload) => log::warn!("Event listener panicked: {}", panic_message(payload.as_ref())),
        }
    }
}
