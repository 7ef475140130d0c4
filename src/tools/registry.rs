//! Tool registry
//!
//! Holds the named tools an agent may call and runs them behind a total
//! `execute` boundary: unknown names, denied approvals, handler errors, panics,
//! and timeouts all come back as failed `ToolResult`s.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::task::AbortHandle;

use super::definition::ToolSpec;
use super::handler::ApprovalGate;
use super::result::ToolResult;
use crate::config::{DuplicatePolicy, ToolsConfig};
use crate::error::{MeshError, Result, panic_message};
use crate::llm::{ToolCall, ToolDefinition};

#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<ToolSpec>>,
    // Registration order, for stable definitions and listings
    order: Vec<String>,
    approval: Option<Arc<dyn ApprovalGate>>,
    default_timeout: Duration,
    duplicate_policy: DuplicatePolicy,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_config(&ToolsConfig::default())
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &ToolsConfig) -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
            approval: None,
            default_timeout: config.default_timeout(),
            duplicate_policy: config.duplicate_policy,
        }
    }

    /// Register a tool.
    ///
    /// Under `DuplicatePolicy::Override` a name collision replaces the existing
    /// tool; under `Reject` it fails with `MeshError::DuplicateTool`.
    pub fn register(&mut self, spec: ToolSpec) -> Result<()> {
        let name = spec.name.clone();
        if self.tools.contains_key(&name) {
            match self.duplicate_policy {
                DuplicatePolicy::Reject => return Err(MeshError::DuplicateTool(name)),
                DuplicatePolicy::Override => {
                    log::warn!("Tool '{}' re-registered, overriding previous handler", name);
                }
            }
        } else {
            self.order.push(name.clone());
        }

        log::debug!("Registered tool: {} (approval={})", name, spec.requires_approval);
        self.tools.insert(name, Arc::new(spec));
        Ok(())
    }

    pub fn set_approval_gate(&mut self, gate: Arc<dyn ApprovalGate>) {
        self.approval = Some(gate);
    }

    /// Execute a registered tool. Never fails; every outcome is a `ToolResult`.
    pub async fn execute(&self, name: &str, args: Map<String, Value>) -> ToolResult {
        let Some(spec) = self.tools.get(name) else {
            return ToolResult::failure(format!("Unknown tool: {}. Available: {:?}", name, self.order));
        };

        if spec.requires_approval
            && let Some(gate) = &self.approval
            && !gate.approve(name, &args).await
        {
            log::info!("Tool '{}' denied by approval gate", name);
            return ToolResult::failure(format!("Tool '{}' execution was not approved", name));
        }

        let timeout = spec.timeout.unwrap_or(self.default_timeout);
        let handler = Arc::clone(&spec.handler);
        let task = tokio::spawn(async move { handler.call(args).await });
        // Aborts the handler on timeout, and when this future is dropped mid-call
        let _on_drop = AbortOnDrop(task.abort_handle());

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(output))) => output.into_result(),
            Ok(Ok(Err(e))) => {
                log::error!("Tool '{}' failed: {:#}", name, e);
                ToolResult::failure(format!("{:#}", e))
            }
            Ok(Err(join_err)) => {
                let message = if join_err.is_panic() {
                    format!("Tool '{}' panicked: {}", name, panic_message(join_err.into_panic().as_ref()))
                } else {
                    format!("Tool '{}' was cancelled", name)
                };
                log::error!("{}", message);
                ToolResult::failure(message)
            }
            Err(_) => {
                log::warn!("Tool '{}' timed out after {}ms", name, timeout.as_millis());
                ToolResult::failure(format!("Tool '{}' timed out after {}ms", name, timeout.as_millis()))
            }
        }
    }

    /// Execute a decision-interface tool call
    pub async fn execute_call(&self, call: &ToolCall) -> ToolResult {
        self.execute(&call.name, call.arguments.clone()).await
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|spec| spec.as_ref())
    }

    /// Definitions for the decision interface.
    ///
    /// An empty `names` or `tags` slice means no filter on that axis.
    pub fn get_definitions(&self, names: &[&str], tags: &[&str]) -> Vec<ToolDefinition> {
        self.specs()
            .filter(|spec| names.is_empty() || names.contains(&spec.name.as_str()))
            .filter(|spec| tags.is_empty() || spec.has_any_tag(tags))
            .map(ToolSpec::to_definition)
            .collect()
    }

    /// Add every tool from `other` that is not registered here; existing entries win
    pub fn merge(&mut self, other: &ToolRegistry) {
        for name in &other.order {
            if self.tools.contains_key(name) {
                continue;
            }
            if let Some(spec) = other.tools.get(name) {
                self.order.push(name.clone());
                self.tools.insert(name.clone(), Arc::clone(spec));
            }
        }
    }

    /// Tool names in registration order
    pub fn available(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|spec| spec.as_ref())
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .field("default_timeout", &self.default_timeout)
            .field("duplicate_policy", &self.duplicate_policy)
            .finish()
    }
}
