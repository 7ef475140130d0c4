//! Tool specifications
//!
//! A `ToolSpec` bundles the schema shown to the decision interface with the
//! handler that runs the call and its execution policy.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};

use super::handler::{ToolHandler, handler_fn};
use super::result::ToolOutput;
use crate::llm::ToolDefinition;

#[derive(Clone)]
pub struct ToolSpec {
    /// Tool name (unique per registry)
    pub name: String,
    /// Human-readable description for the decision interface
    pub description: String,
    /// JSON schema for input parameters
    pub parameters: Value,
    pub requires_approval: bool,
    /// Tags for filtering (e.g. "collaboration", "file_system")
    pub tags: Vec<String>,
    /// Per-tool timeout; the registry default applies when unset
    pub timeout: Option<Duration>,
    pub(crate) handler: Arc<dyn ToolHandler>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: json!({"type": "object", "properties": {}}),
            requires_approval: false,
            tags: Vec::new(),
            timeout: None,
            handler,
        }
    }

    /// Build from an async closure over the argument map
    pub fn from_fn<F, Fut>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<ToolOutput>> + Send + 'static,
    {
        Self::new(name, description, handler_fn(f))
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn has_any_tag(&self, tags: &[&str]) -> bool {
        tags.iter().any(|t| self.tags.iter().any(|own| own == t))
    }

    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(&self.name, &self.description, self.parameters.clone())
    }
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("requires_approval", &self.requires_approval)
            .field("tags", &self.tags)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
