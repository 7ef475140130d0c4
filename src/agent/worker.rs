use async_trait::async_trait;

use super::result::ExecutionResult;

/// Anything the pool can schedule.
///
/// `run` must not fail: every outcome, including provider errors, is folded
/// into the returned `ExecutionResult`.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Unique id, used as the work item id
    fn id(&self) -> &str;

    /// Worker type, used in logs and dependency context headers
    fn kind(&self) -> &str;

    async fn run(&self, task: &str, context: Option<&str>) -> ExecutionResult;
}
