//! Execution loop - tool-using agents driven by the decision interface
//!
//! This module provides:
//! - `Worker`, the trait the pool schedules
//! - `Agent` and `AgentBuilder`, the think/act/observe loop
//! - `AgentEvent` and `EventListener` for observing transitions
//! - `StreamingRun` for consuming events while a run is in flight

mod events;
mod execution;
mod result;
mod streaming;
mod worker;

pub use events::{AgentEvent, EventListener, FnListener, event_types, listener_fn};
pub use execution::{Agent, AgentBuilder, MAX_ITERATIONS_ERROR};
pub use result::{ExecutionResult, FailureKind, ToolCallRecord};
pub use streaming::StreamingRun;
pub use worker::Worker;
