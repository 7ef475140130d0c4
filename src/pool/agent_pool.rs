//! Agent pool - runs work items concurrently under a dependency graph
//!
//! Every item is spawned at once. An item waits on its dependencies' status
//! channels, then takes a semaphore permit before running its worker, so the
//! permit count is the bound on simultaneously running items. A deadline
//! cancels whatever has not finished.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::graph::DependencyGraph;
use super::work_item::{Slot, WorkItem, WorkItemStatus, WorkStatus};
use crate::agent::{ExecutionResult, FailureKind, Worker};
use crate::bus::{AgentBus, SendOptions};
use crate::config::PoolConfig;
use crate::error::{MeshError, Result, panic_message};
use crate::id::truncate_chars;

/// How long cancelled items get to finish before their tasks are aborted
const CANCEL_GRACE: Duration = Duration::from_secs(1);

/// Called once per finished item, including skipped and cancelled ones
pub type CompletionHook = Arc<dyn Fn(&str, &ExecutionResult) + Send + Sync>;

/// Outcome of one `AgentPool::run`
#[derive(Debug, Clone, Default)]
pub struct PoolResult {
    /// Every item's result, keyed by item id
    pub results: HashMap<String, ExecutionResult>,
    pub all_success: bool,
    /// Failed, skipped and cancelled items in insertion order
    pub failed_agents: Vec<String>,
    pub total_duration_ms: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
}

impl PoolResult {
    pub fn get(&self, id: &str) -> Option<&ExecutionResult> {
        self.results.get(id)
    }
}

pub struct AgentPool {
    items: Vec<WorkItem>,
    bus: Option<Arc<AgentBus>>,
    config: PoolConfig,
    on_complete: Option<CompletionHook>,
    running: AtomicBool,
}

/// Clears the running flag however `run` exits
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What a spawned item task needs; owned so it can move into the task
struct ItemRun {
    id: String,
    worker: Arc<dyn Worker>,
    task: String,
    context: Option<String>,
    slot: Arc<Slot>,
    deps: Vec<Dependency>,
    bus: Option<Arc<AgentBus>>,
    on_complete: Option<CompletionHook>,
    excerpt_chars: usize,
    preview_chars: usize,
}

struct Dependency {
    id: String,
    kind: String,
    slot: Arc<Slot>,
}

impl AgentPool {
    pub fn new() -> Self {
        Self::with_config(&PoolConfig::default())
    }

    pub fn with_config(config: &PoolConfig) -> Self {
        let mut config = config.clone();
        if config.max_concurrent == 0 {
            log::warn!("pool.max_concurrent is 0, running one item at a time");
            config.max_concurrent = 1;
        }
        Self {
            items: Vec::new(),
            bus: None,
            config,
            on_complete: None,
            running: AtomicBool::new(false),
        }
    }

    /// Publish lifecycle notifications on this bus
    pub fn with_bus(mut self, bus: Arc<AgentBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_completion_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &ExecutionResult) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(hook));
        self
    }

    /// Register a pending item; the worker's id becomes the item id.
    ///
    /// Dependencies are checked when the pool runs, so items may be added in
    /// any order.
    pub fn add(
        &mut self,
        worker: Arc<dyn Worker>,
        task: impl Into<String>,
        context: Option<String>,
        depends_on: Vec<String>,
    ) -> Result<String> {
        let id = worker.id().to_string();
        if self.items.iter().any(|item| item.id() == id) {
            return Err(MeshError::DuplicateWorkItem(id));
        }
        log::debug!("Added work item {} ({}) depending on {:?}", id, worker.kind(), depends_on);
        self.items.push(WorkItem::new(worker, task.into(), context, depends_on));
        Ok(id)
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    /// Dependency graph of the current items
    pub fn graph(&self) -> Result<DependencyGraph> {
        DependencyGraph::new(
            self.items
                .iter()
                .map(|item| (item.id().to_string(), item.depends_on.clone())),
        )
    }

    /// Topological layers of the current items
    pub fn execution_layers(&self) -> Result<Vec<Vec<String>>> {
        self.graph()?.execution_layers()
    }

    /// Run every item and wait for all of them, or until `timeout` (the
    /// configured pool timeout when `None`) cancels the rest.
    pub async fn run(&self, timeout: Option<Duration>) -> Result<PoolResult> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(MeshError::InvalidState("pool is already running".to_string()));
        }
        let _guard = RunGuard(&self.running);

        self.graph()?.validate()?;

        let timeout = timeout.unwrap_or_else(|| self.config.timeout());
        let started = Instant::now();
        for item in &self.items {
            item.slot.reset();
        }

        tracing::info!(
            items = self.items.len(),
            max_concurrent = self.config.max_concurrent,
            timeout_ms = timeout.as_millis() as u64,
            "Starting pool run"
        );

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent));
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        for item in &self.items {
            let run = self.item_run(item);
            let permits = Arc::clone(&permits);
            let cancel = cancel.clone();
            tasks.spawn(run.execute(permits, cancel));
        }

        if tokio::time::timeout(timeout, drain(&mut tasks)).await.is_err() {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Pool deadline reached, cancelling remaining items"
            );
            cancel.cancel();
            if tokio::time::timeout(CANCEL_GRACE, drain(&mut tasks)).await.is_err() {
                tracing::warn!(remaining = tasks.len(), "Aborting work items that ignored cancellation");
                tasks.abort_all();
                drain(&mut tasks).await;
            }
        }

        // Anything an item task failed to finalize
        for item in &self.items {
            if !item.status().is_terminal() {
                tracing::warn!(item_id = %item.id(), "Work item left unfinished, marking cancelled");
                item.slot
                    .finish(WorkStatus::Cancelled, ExecutionResult::cancelled(item.id(), item.kind()));
            }
        }

        let result = self.collect(started.elapsed());
        tracing::info!(
            all_success = result.all_success,
            failed = result.failed_agents.len(),
            duration_ms = result.total_duration_ms,
            "Pool run finished"
        );
        Ok(result)
    }

    fn item_run(&self, item: &WorkItem) -> ItemRun {
        let deps = item
            .depends_on
            .iter()
            .filter_map(|dep_id| self.items.iter().find(|other| other.id() == dep_id.as_str()))
            .map(|dep| Dependency {
                id: dep.id().to_string(),
                kind: dep.kind().to_string(),
                slot: Arc::clone(&dep.slot),
            })
            .collect();

        ItemRun {
            id: item.id().to_string(),
            worker: Arc::clone(&item.worker),
            task: item.task.clone(),
            context: item.context.clone(),
            slot: Arc::clone(&item.slot),
            deps,
            bus: self.bus.clone(),
            on_complete: self.on_complete.clone(),
            excerpt_chars: self.config.dependency_excerpt_chars,
            preview_chars: self.config.task_preview_chars,
        }
    }

    fn collect(&self, elapsed: Duration) -> PoolResult {
        let mut result = PoolResult {
            total_duration_ms: elapsed.as_millis() as u64,
            ..Default::default()
        };

        for item in &self.items {
            if item.status() != WorkStatus::Completed {
                result.failed_agents.push(item.id().to_string());
            }
            if let Some(execution) = item.result() {
                result.total_input_tokens += execution.input_tokens;
                result.total_output_tokens += execution.output_tokens;
                result.results.insert(item.id().to_string(), execution);
            }
        }
        result.all_success = result.failed_agents.is_empty();
        result
    }

    pub fn get_status(&self) -> Vec<WorkItemStatus> {
        self.items
            .iter()
            .map(|item| item.snapshot(self.config.task_preview_chars))
            .collect()
    }

    pub fn status(&self, id: &str) -> Option<WorkStatus> {
        self.find(id).map(WorkItem::status)
    }

    pub fn result(&self, id: &str) -> Option<ExecutionResult> {
        self.find(id).and_then(WorkItem::result)
    }

    pub fn running_count(&self) -> usize {
        self.count(WorkStatus::Running)
    }

    pub fn completed_count(&self) -> usize {
        self.count(WorkStatus::Completed)
    }

    pub fn total_count(&self) -> usize {
        self.items.len()
    }

    /// Remove every item so the pool can be reused
    pub fn clear(&mut self) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            return Err(MeshError::InvalidState("cannot clear a running pool".to_string()));
        }
        self.items.clear();
        Ok(())
    }

    fn find(&self, id: &str) -> Option<&WorkItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    fn count(&self, status: WorkStatus) -> usize {
        self.items.iter().filter(|item| item.status() == status).count()
    }
}

impl Default for AgentPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AgentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPool")
            .field("items", &self.items)
            .field("config", &self.config)
            .field("has_bus", &self.bus.is_some())
            .finish()
    }
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Err(e) if e.is_cancelled() => tracing::debug!("Work item task aborted"),
            Err(e) => tracing::error!(error = ?e, "Work item task failed to join"),
            Ok(()) => {}
        }
    }
}

impl ItemRun {
    async fn execute(self, permits: Arc<Semaphore>, cancel: CancellationToken) {
        // Dependencies first; a failed one means this item never runs
        for dep in &self.deps {
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(),
                status = dep.slot.terminal() => status,
            };
            if status.is_failure() {
                tracing::warn!(item_id = %self.id, dependency = %dep.id, "Skipping work item, dependency failed");
                let result = ExecutionResult::dependency_skipped(&self.id, self.worker.kind(), &dep.id);
                self.complete(result, &cancel).await;
                return;
            }
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.cancelled(),
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return self.cancelled(),
            },
        };

        self.slot.mark_running();
        tracing::info!(item_id = %self.id, kind = %self.worker.kind(), "Work item started");
        if let Some(bus) = &self.bus {
            let content = format!(
                "Agent {} started: {}",
                self.worker.kind(),
                truncate_chars(&self.task, self.preview_chars)
            );
            let notify = bus.broadcast(
                &self.id,
                content,
                SendOptions::default().with_metadata("event", json!("agent_started")),
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(),
                _ = notify => {}
            }
        }

        let context = self.build_context();
        let run = AssertUnwindSafe(self.worker.run(&self.task, context.as_deref())).catch_unwind();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.cancelled(),
            outcome = run => match outcome {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(item_id = %self.id, error = %message, "Worker panicked");
                    ExecutionResult::failed(&self.id, self.worker.kind(), FailureKind::Panicked, message)
                }
            },
        };

        self.complete(result, &cancel).await;
        // Released only after the terminal status is visible
        drop(permit);
    }

    /// Caller context plus excerpts of every dependency's result
    fn build_context(&self) -> Option<String> {
        let parts: Vec<String> = self
            .deps
            .iter()
            .filter_map(|dep| {
                dep.slot.result().map(|result| {
                    format!(
                        "## Result from {}:\n{}",
                        dep.kind,
                        truncate_chars(&result.content, self.excerpt_chars)
                    )
                })
            })
            .collect();

        let base = self.context.clone().unwrap_or_default();
        if parts.is_empty() {
            return if base.is_empty() { None } else { Some(base) };
        }

        let section = format!("## Previous Agent Results\n\n{}", parts.join("\n\n"));
        if base.is_empty() {
            Some(section)
        } else {
            Some(format!("{}\n\n{}", base, section))
        }
    }

    /// Record a finished result. The bus notification is dropped if the pool
    /// is cancelled while it is being delivered; the result is kept either way.
    async fn complete(&self, result: ExecutionResult, cancel: &CancellationToken) {
        let status = if result.success {
            WorkStatus::Completed
        } else {
            WorkStatus::Failed
        };

        if result.success {
            tracing::info!(item_id = %self.id, duration_ms = result.duration_ms, "Work item completed");
        } else {
            tracing::warn!(
                item_id = %self.id,
                error = result.error.as_deref().unwrap_or(""),
                "Work item failed"
            );
        }

        if let Some(hook) = &self.on_complete {
            hook(&self.id, &result);
        }

        if let Some(bus) = &self.bus {
            let (event, content) = if result.success {
                ("agent_completed", format!("Agent {} completed", self.worker.kind()))
            } else {
                (
                    "agent_failed",
                    format!(
                        "Agent {} failed: {}",
                        self.worker.kind(),
                        result.error.as_deref().unwrap_or("unknown error")
                    ),
                )
            };
            let notify = bus.broadcast(&self.id, content, SendOptions::default().with_metadata("event", json!(event)));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(item_id = %self.id, event, "Completion notification abandoned");
                }
                _ = notify => {}
            }
        }

        self.slot.finish(status, result);
    }

    fn cancelled(&self) {
        tracing::warn!(item_id = %self.id, "Work item cancelled");
        let result = ExecutionResult::cancelled(&self.id, self.worker.kind());
        if let Some(hook) = &self.on_complete {
            hook(&self.id, &result);
        }
        self.slot.finish(WorkStatus::Cancelled, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ChannelSubscriber;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Scripted worker that records what it saw
    struct StubWorker {
        id: String,
        kind: String,
        succeed: bool,
        delay: Duration,
        calls: AtomicUsize,
        contexts: Mutex<Vec<Option<String>>>,
    }

    impl StubWorker {
        fn new(id: &str, succeed: bool) -> Arc<Self> {
            Self::with_delay(id, succeed, Duration::ZERO)
        }

        fn with_delay(id: &str, succeed: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                kind: format!("{}-kind", id),
                succeed,
                delay,
                calls: AtomicUsize::new(0),
                contexts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Worker for StubWorker {
        fn id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> &str {
            &self.kind
        }

        async fn run(&self, task: &str, context: Option<&str>) -> ExecutionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.contexts.lock().unwrap().push(context.map(str::to_string));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.succeed {
                let mut result = ExecutionResult::succeeded(&self.id, &self.kind, format!("{} done", task));
                result.input_tokens = 10;
                result.output_tokens = 5;
                result
            } else {
                ExecutionResult::failed(&self.id, &self.kind, FailureKind::StopError, "boom")
            }
        }
    }

    struct PanickingWorker;

    #[async_trait]
    impl Worker for PanickingWorker {
        fn id(&self) -> &str {
            "panics"
        }

        fn kind(&self) -> &str {
            "chaos"
        }

        async fn run(&self, _task: &str, _context: Option<&str>) -> ExecutionResult {
            panic!("worker exploded");
        }
    }

    #[tokio::test]
    async fn test_run_all_success() {
        let mut pool = AgentPool::new();
        pool.add(StubWorker::new("a", true), "task a", None, vec![]).unwrap();
        pool.add(StubWorker::new("b", true), "task b", None, vec![]).unwrap();

        let result = pool.run(None).await.unwrap();
        assert!(result.all_success);
        assert!(result.failed_agents.is_empty());
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.total_input_tokens, 20);
        assert_eq!(result.total_output_tokens, 10);
        assert_eq!(pool.completed_count(), 2);
        assert_eq!(pool.running_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_item_rejected() {
        let mut pool = AgentPool::new();
        pool.add(StubWorker::new("a", true), "t", None, vec![]).unwrap();
        let err = pool.add(StubWorker::new("a", true), "t", None, vec![]).unwrap_err();
        assert!(matches!(err, MeshError::DuplicateWorkItem(_)));
    }

    #[tokio::test]
    async fn test_dependency_result_in_context() {
        let a = StubWorker::new("a", true);
        let b = StubWorker::new("b", true);
        let mut pool = AgentPool::new();
        pool.add(a, "research", None, vec![]).unwrap();
        pool.add(b.clone(), "write", Some("Base".to_string()), vec!["a".to_string()])
            .unwrap();

        pool.run(None).await.unwrap();

        let contexts = b.contexts.lock().unwrap().clone();
        assert_eq!(
            contexts,
            vec![Some(
                "Base\n\n## Previous Agent Results\n\n## Result from a-kind:\nresearch done".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_dependency_excerpt_truncated() {
        let config = PoolConfig {
            dependency_excerpt_chars: 4,
            ..Default::default()
        };
        let b = StubWorker::new("b", true);
        let mut pool = AgentPool::with_config(&config);
        pool.add(StubWorker::new("a", true), "abcdefgh", None, vec![]).unwrap();
        pool.add(b.clone(), "t", None, vec!["a".to_string()]).unwrap();

        pool.run(None).await.unwrap();

        let context = b.contexts.lock().unwrap()[0].clone().unwrap();
        assert_eq!(context, "## Previous Agent Results\n\n## Result from a-kind:\nabcd");
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_dependent() {
        let b = StubWorker::new("b", true);
        let mut pool = AgentPool::new();
        pool.add(StubWorker::new("a", false), "t", None, vec![]).unwrap();
        pool.add(b.clone(), "t", None, vec!["a".to_string()]).unwrap();

        let result = pool.run(None).await.unwrap();
        assert!(!result.all_success);
        assert_eq!(result.failed_agents, vec!["a", "b"]);
        assert_eq!(b.calls(), 0);
        assert!(result.get("b").unwrap().is_dependency_skip());
        assert_eq!(pool.status("b"), Some(WorkStatus::Failed));
    }

    #[tokio::test]
    async fn test_unknown_dependency_fails_fast() {
        let a = StubWorker::new("a", true);
        let mut pool = AgentPool::new();
        pool.add(a.clone(), "t", None, vec!["ghost".to_string()]).unwrap();

        let err = pool.run(None).await.unwrap_err();
        assert!(matches!(err, MeshError::UnknownWorkItem(_)));
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn test_cycle_fails_fast() {
        let mut pool = AgentPool::new();
        pool.add(StubWorker::new("a", true), "t", None, vec!["b".to_string()]).unwrap();
        pool.add(StubWorker::new("b", true), "t", None, vec!["a".to_string()]).unwrap();

        let err = pool.run(None).await.unwrap_err();
        assert!(matches!(err, MeshError::CyclicDependency(_)));
        // The running flag is released on the error path
        assert!(matches!(pool.run(None).await, Err(MeshError::CyclicDependency(_))));
    }

    #[tokio::test]
    async fn test_panicking_worker_is_failed() {
        let mut pool = AgentPool::new();
        pool.add(Arc::new(PanickingWorker), "t", None, vec![]).unwrap();

        let result = pool.run(None).await.unwrap();
        let failed = result.get("panics").unwrap();
        assert_eq!(failed.failure, Some(FailureKind::Panicked));
        assert_eq!(failed.error.as_deref(), Some("worker exploded"));
        assert_eq!(result.failed_agents, vec!["panics"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_unfinished_items() {
        let mut pool = AgentPool::new();
        pool.add(StubWorker::new("fast", true), "t", None, vec![]).unwrap();
        pool.add(
            StubWorker::with_delay("slow", true, Duration::from_secs(60)),
            "t",
            None,
            vec![],
        )
        .unwrap();
        pool.add(StubWorker::new("after", true), "t", None, vec!["slow".to_string()])
            .unwrap();

        let result = pool.run(Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(pool.status("fast"), Some(WorkStatus::Completed));
        assert_eq!(pool.status("slow"), Some(WorkStatus::Cancelled));
        assert_eq!(pool.status("after"), Some(WorkStatus::Cancelled));
        assert_eq!(result.failed_agents, vec!["slow", "after"]);
        assert_eq!(result.get("slow").unwrap().failure, Some(FailureKind::Cancelled));
        assert!(result.get("fast").unwrap().success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_holds_with_unread_bus_subscriber() {
        let bus = Arc::new(AgentBus::new());
        // Never drained: every delivery after the first one blocks
        let (observer, _rx) = ChannelSubscriber::new(1);
        bus.subscribe_global(observer);

        let mut pool = AgentPool::new().with_bus(bus);
        pool.add(StubWorker::new("a", true), "t", None, vec![]).unwrap();
        pool.add(StubWorker::new("b", true), "t", None, vec![]).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), pool.run(Some(Duration::from_millis(200))))
            .await
            .expect("run must return once the deadline passes")
            .unwrap();

        assert_eq!(result.results.len(), 2);
        assert!(!result.all_success);
        for status in pool.get_status() {
            assert!(status.status.is_terminal(), "{} left {}", status.id, status.status);
        }
        assert_eq!(pool.running_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_max_concurrent_runs_one_at_a_time() {
        let config = PoolConfig {
            max_concurrent: 0,
            ..Default::default()
        };
        let mut pool = AgentPool::with_config(&config);
        pool.add(StubWorker::new("a", true), "t", None, vec![]).unwrap();
        pool.add(StubWorker::new("b", true), "t", None, vec![]).unwrap();

        let result = pool.run(Some(Duration::from_secs(5))).await.unwrap();
        assert!(result.all_success);
        assert_eq!(pool.completed_count(), 2);
    }

    #[tokio::test]
    async fn test_completion_hook_and_bus_notifications() {
        let bus = Arc::new(AgentBus::new());
        let (observer, mut rx) = ChannelSubscriber::new(16);
        bus.subscribe_global(observer);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook_seen = Arc::clone(&seen);
        let mut pool = AgentPool::new()
            .with_bus(Arc::clone(&bus))
            .with_completion_hook(move |id, result| {
                hook_seen.lock().unwrap().push((id.to_string(), result.success));
            });
        pool.add(StubWorker::new("a", false), "t", None, vec![]).unwrap();
        pool.add(StubWorker::new("b", true), "t", None, vec!["a".to_string()]).unwrap();

        pool.run(None).await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![("a".to_string(), false), ("b".to_string(), false)]);

        let mut events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            events.push((message.from, message.metadata["event"].clone()));
        }
        assert_eq!(
            events,
            vec![
                ("a".to_string(), json!("agent_started")),
                ("a".to_string(), json!("agent_failed")),
                ("b".to_string(), json!("agent_failed")),
            ]
        );
    }

    #[tokio::test]
    async fn test_status_snapshot_and_clear() {
        let config = PoolConfig {
            task_preview_chars: 5,
            ..Default::default()
        };
        let mut pool = AgentPool::with_config(&config);
        pool.add(StubWorker::new("a", true), "a long task", None, vec![]).unwrap();

        let status = pool.get_status();
        assert_eq!(status[0].status, WorkStatus::Pending);
        assert_eq!(status[0].task, "a lon");
        assert!(status[0].started_at.is_none());

        pool.run(None).await.unwrap();
        let status = pool.get_status();
        assert_eq!(status[0].status, WorkStatus::Completed);
        assert!(status[0].completed_at.is_some());

        pool.clear().unwrap();
        assert_eq!(pool.total_count(), 0);
    }

    #[tokio::test]
    async fn test_rerun_resets_items() {
        let a = StubWorker::new("a", true);
        let mut pool = AgentPool::new();
        pool.add(a.clone(), "t", None, vec![]).unwrap();

        pool.run(None).await.unwrap();
        let second = pool.run(None).await.unwrap();
        assert!(second.all_success);
        assert_eq!(a.calls(), 2);
    }
}
