//! Work items and their per-run state

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::agent::{ExecutionResult, Worker};
use crate::id::truncate_chars;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Terminal and not successful; dependents of such an item are skipped
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Default)]
struct SlotRecord {
    result: Option<ExecutionResult>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

/// Shared run state of one item.
///
/// Written only by the task running the item; dependents observe the status
/// channel and read the result once it is terminal.
#[derive(Debug)]
pub(crate) struct Slot {
    status: watch::Sender<WorkStatus>,
    record: Mutex<SlotRecord>,
}

impl Slot {
    fn new() -> Self {
        let (status, _) = watch::channel(WorkStatus::Pending);
        Self {
            status,
            record: Mutex::new(SlotRecord::default()),
        }
    }

    fn record(&self) -> MutexGuard<'_, SlotRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn status(&self) -> WorkStatus {
        *self.status.borrow()
    }

    /// Wait until the item reaches a terminal status
    pub(crate) async fn terminal(&self) -> WorkStatus {
        let mut rx = self.status.subscribe();
        match rx.wait_for(|s| s.is_terminal()).await {
            Ok(status) => *status,
            // The sender lives as long as the slot, so this is unreachable in practice
            Err(_) => WorkStatus::Cancelled,
        }
    }

    pub(crate) fn mark_running(&self) {
        self.record().started_at = Some(Utc::now());
        self.status.send_replace(WorkStatus::Running);
    }

    /// Store the result, then publish the terminal status to waiters
    pub(crate) fn finish(&self, status: WorkStatus, result: ExecutionResult) {
        {
            let mut record = self.record();
            record.result = Some(result);
            record.completed_at = Some(Utc::now());
        }
        self.status.send_replace(status);
    }

    pub(crate) fn result(&self) -> Option<ExecutionResult> {
        self.record().result.clone()
    }

    pub(crate) fn times(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let record = self.record();
        (record.started_at, record.completed_at)
    }

    pub(crate) fn reset(&self) {
        *self.record() = SlotRecord::default();
        self.status.send_replace(WorkStatus::Pending);
    }
}

/// One scheduled unit: a worker bound to a task and its dependencies
pub struct WorkItem {
    pub(crate) worker: Arc<dyn Worker>,
    pub(crate) task: String,
    pub(crate) context: Option<String>,
    pub(crate) depends_on: Vec<String>,
    pub(crate) slot: Arc<Slot>,
}

impl WorkItem {
    pub(crate) fn new(worker: Arc<dyn Worker>, task: String, context: Option<String>, depends_on: Vec<String>) -> Self {
        Self {
            worker,
            task,
            context,
            depends_on,
            slot: Arc::new(Slot::new()),
        }
    }

    pub fn id(&self) -> &str {
        self.worker.id()
    }

    pub fn kind(&self) -> &str {
        self.worker.kind()
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn status(&self) -> WorkStatus {
        self.slot.status()
    }

    pub fn result(&self) -> Option<ExecutionResult> {
        self.slot.result()
    }

    pub(crate) fn snapshot(&self, preview_chars: usize) -> WorkItemStatus {
        let (started_at, completed_at) = self.slot.times();
        WorkItemStatus {
            id: self.id().to_string(),
            kind: self.kind().to_string(),
            status: self.status(),
            task: truncate_chars(&self.task, preview_chars).to_string(),
            depends_on: self.depends_on.clone(),
            started_at,
            completed_at,
        }
    }
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("status", &self.status())
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

/// Point-in-time view of an item returned by `AgentPool::get_status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemStatus {
    pub id: String,
    pub kind: String,
    pub status: WorkStatus,
    /// Task preview
    pub task: String,
    pub depends_on: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
