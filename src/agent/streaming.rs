//! Streaming runs
//!
//! The run task pushes events into a bounded channel while a separate reader
//! drains them. The channel closes when the run ends, so `next_event`
//! returning `None` is the termination signal.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::events::AgentEvent;
use super::execution::Agent;
use super::result::ExecutionResult;
use crate::error::{MeshError, Result};

/// Handle to a run executing in the background
pub struct StreamingRun {
    events: mpsc::Receiver<AgentEvent>,
    handle: JoinHandle<ExecutionResult>,
}

impl StreamingRun {
    /// Next event, or `None` once the run has finished and every event was read
    pub async fn next_event(&mut self) -> Option<AgentEvent> {
        self.events.recv().await
    }

    /// Wait for the run to end, discarding unread events
    pub async fn finish(self) -> Result<ExecutionResult> {
        // Dropping the receiver unblocks a run waiting on a full channel
        drop(self.events);
        self.handle
            .await
            .map_err(|e| MeshError::InvalidState(format!("streaming run aborted: {}", e)))
    }

    /// Split into the raw receiver and join handle
    pub fn into_parts(self) -> (mpsc::Receiver<AgentEvent>, JoinHandle<ExecutionResult>) {
        (self.events, self.handle)
    }
}

impl Agent {
    /// Run on a background task, streaming events through a channel of
    /// `event_buffer` capacity. A slow reader applies backpressure to the run.
    pub fn run_streaming(self: Arc<Self>, task: impl Into<String>, context: Option<String>) -> StreamingRun {
        let (tx, events) = mpsc::channel(self.event_buffer);
        let task = task.into();
        let handle = tokio::spawn(async move {
            // `tx` drops when this task ends, closing the channel
            self.execute(&task, context.as_deref(), Some(&tx)).await
        });
        StreamingRun { events, handle }
    }
}
