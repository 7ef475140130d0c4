//! Terminal result of one execution-loop run

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Why a run ended unsuccessfully
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The decision interface returned an error
    Provider,
    /// The decision interface reported `StopReason::Error`
    StopError,
    /// `max_iterations` exhausted without an end of turn
    IterationLimit,
    /// Skipped because a dependency did not complete
    DependencyFailed,
    /// Stopped by the pool deadline
    Cancelled,
    /// The worker panicked
    Panicked,
}

/// One tool call made during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
    pub iteration: u32,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Id of the agent that produced this result
    pub id: String,
    pub agent_type: String,
    pub content: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub success: bool,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub iterations: u32,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn succeeded(id: impl Into<String>, agent_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent_type: agent_type.into(),
            content: content.into(),
            tool_calls: Vec::new(),
            success: true,
            error: None,
            failure: None,
            input_tokens: 0,
            output_tokens: 0,
            iterations: 0,
            duration_ms: 0,
        }
    }

    pub fn failed(
        id: impl Into<String>,
        agent_type: impl Into<String>,
        failure: FailureKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            failure: Some(failure),
            ..Self::succeeded(id, agent_type, "")
        }
    }

    /// Result recorded for an item whose dependency failed; nothing was executed
    pub fn dependency_skipped(id: impl Into<String>, agent_type: impl Into<String>, dependency: &str) -> Self {
        Self::failed(
            id,
            agent_type,
            FailureKind::DependencyFailed,
            format!("Skipped: dependency {} failed", dependency),
        )
    }

    pub fn cancelled(id: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self::failed(id, agent_type, FailureKind::Cancelled, "Cancelled: pool deadline reached")
    }

    pub fn is_dependency_skip(&self) -> bool {
        self.failure == Some(FailureKind::DependencyFailed)
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}
