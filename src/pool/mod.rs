//! Agent pool - concurrent work items ordered by dependencies
//!
//! This module provides:
//! - `AgentPool`, the coordinator with a concurrency bound and deadline
//! - `WorkItem` and `WorkStatus` for per-item state
//! - `DependencyGraph`, the pre-flight check and topological layering

mod agent_pool;
mod graph;
mod work_item;

pub use agent_pool::{AgentPool, CompletionHook, PoolResult};
pub use graph::DependencyGraph;
pub use work_item::{WorkItem, WorkItemStatus, WorkStatus};
