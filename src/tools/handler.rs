//! Handler and approval seams

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::result::ToolOutput;

/// Named-argument tool implementation.
///
/// An `Err` is normalized to a failed `ToolResult` by the registry, the same as
/// returning `ToolOutput::Failure`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Map<String, Value>) -> eyre::Result<ToolOutput>;
}

/// Adapter turning an async closure into a `ToolHandler`
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = eyre::Result<ToolOutput>> + Send,
{
    async fn call(&self, args: Map<String, Value>) -> eyre::Result<ToolOutput> {
        (self.0)(args).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = eyre::Result<ToolOutput>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Decides whether a tool marked `requires_approval` may run
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn approve(&self, tool: &str, args: &Map<String, Value>) -> bool;
}

#[async_trait]
impl<F> ApprovalGate for F
where
    F: Fn(&str, &Map<String, Value>) -> bool + Send + Sync,
{
    async fn approve(&self, tool: &str, args: &Map<String, Value>) -> bool {
        self(tool, args)
    }
}
