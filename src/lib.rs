//! agentmesh - tool-using agents coordinated over a shared bus
//!
//! Agents run a bounded think/act/observe loop against a pluggable decision
//! interface, invoking tools from a registry. A message bus connects them
//! with direct messages, broadcasts, request/response and shared artifacts,
//! and a pool runs many of them concurrently in dependency order.

pub mod agent;
pub mod bus;
pub mod config;
pub mod error;
pub mod id;
pub mod llm;
pub mod pool;
pub mod tools;

pub use agent::{Agent, AgentBuilder, ExecutionResult, Worker};
pub use bus::AgentBus;
pub use config::Config;
pub use error::{MeshError, Result};
pub use pool::{AgentPool, PoolResult, WorkStatus};
pub use tools::{ToolRegistry, ToolSpec};
