//! Communication bus
//!
//! All mutable bus state (subscriptions, artifacts, pending requests, history)
//! lives behind one mutex. The lock is never held across an await: each
//! operation mutates state, snapshots its delivery targets, releases the lock,
//! and only then calls subscribers, so a subscriber may re-enter the bus.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde_json::{Map, Value, json};
use tokio::sync::oneshot;

use super::artifact::{Artifact, ArtifactSummary, DEFAULT_ARTIFACT_TYPE};
use super::message::{BusMessage, MessageType, SendOptions};
use super::subscriber::BusSubscriber;
use crate::config::BusConfig;
use crate::error::{MeshError, Result, panic_message};

struct PendingRequest {
    requester: String,
    tx: oneshot::Sender<String>,
}

#[derive(Default)]
struct BusState {
    // Insertion order is kept so `active_agents` is stable
    subscribers: Vec<(String, Vec<Arc<dyn BusSubscriber>>)>,
    global: Vec<Arc<dyn BusSubscriber>>,
    artifacts: BTreeMap<String, Artifact>,
    pending: HashMap<String, PendingRequest>,
    history: VecDeque<BusMessage>,
}

/// Subscribers to call for one message, captured under the lock
struct Delivery {
    targets: Vec<(String, Arc<dyn BusSubscriber>)>,
    global: Vec<Arc<dyn BusSubscriber>>,
}

impl BusState {
    fn record(&mut self, message: BusMessage, limit: usize) {
        self.history.push_back(message);
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }

    fn direct(&self, to: &str) -> Delivery {
        let targets = self
            .subscribers
            .iter()
            .filter(|(id, _)| id == to)
            .flat_map(|(id, subs)| subs.iter().map(move |s| (id.clone(), Arc::clone(s))))
            .collect();
        Delivery {
            targets,
            global: self.global.clone(),
        }
    }

    fn broadcast(&self, from: &str) -> Delivery {
        let targets = self
            .subscribers
            .iter()
            .filter(|(id, _)| id != from)
            .flat_map(|(id, subs)| subs.iter().map(move |s| (id.clone(), Arc::clone(s))))
            .collect();
        Delivery {
            targets,
            global: self.global.clone(),
        }
    }

    fn global_only(&self) -> Delivery {
        Delivery {
            targets: Vec::new(),
            global: self.global.clone(),
        }
    }
}

/// In-process exchange connecting agents and external observers
pub struct AgentBus {
    state: Mutex<BusState>,
    history_limit: usize,
    request_timeout: Duration,
}

impl Default for AgentBus {
    fn default() -> Self {
        Self::with_config(&BusConfig::default())
    }
}

impl AgentBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &BusConfig) -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            history_limit: config.history_limit.max(1),
            request_timeout: config.request_timeout(),
        }
    }

    /// Default timeout for `request` callers that have no bound of their own
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    pub fn subscribe(&self, agent_id: &str, subscriber: Arc<dyn BusSubscriber>) {
        let mut state = self.lock();
        match state.subscribers.iter_mut().find(|(id, _)| id == agent_id) {
            Some((_, subs)) => subs.push(subscriber),
            None => state.subscribers.push((agent_id.to_string(), vec![subscriber])),
        }
        log::debug!("Agent {} subscribed to bus", agent_id);
    }

    /// Subscribe to every message on the bus
    pub fn subscribe_global(&self, subscriber: Arc<dyn BusSubscriber>) {
        self.lock().global.push(subscriber);
    }

    /// Remove all subscriptions for an agent
    pub fn unsubscribe(&self, agent_id: &str) {
        self.lock().subscribers.retain(|(id, _)| id != agent_id);
    }

    /// Agents with at least one subscription, in subscription order
    pub fn active_agents(&self) -> Vec<String> {
        self.lock().subscribers.iter().map(|(id, _)| id.clone()).collect()
    }

    // ------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------

    /// Send a direct message. Returns the message id.
    pub async fn send(&self, from: &str, to: &str, content: impl Into<String>, options: SendOptions) -> String {
        let message = BusMessage::new(from, to, content, MessageType::Message).with_options(options);
        let delivery = {
            let mut state = self.lock();
            state.record(message.clone(), self.history_limit);
            state.direct(to)
        };
        let id = message.id.clone();
        self.deliver(message, delivery).await;
        id
    }

    /// Deliver to every subscribed agent except the sender. Returns the message id.
    pub async fn broadcast(&self, from: &str, content: impl Into<String>, options: SendOptions) -> String {
        let message = BusMessage::new(from, "", content, MessageType::Broadcast).with_options(options);
        let delivery = {
            let mut state = self.lock();
            state.record(message.clone(), self.history_limit);
            state.broadcast(from)
        };
        let id = message.id.clone();
        self.deliver(message, delivery).await;
        id
    }

    /// Ask `to` a question and wait for the correlated `respond`.
    ///
    /// The bound covers delivery as well as the wait. On expiry the pending
    /// entry is cleared and `MeshError::Timeout` is returned.
    pub async fn request(&self, from: &str, to: &str, question: impl Into<String>, timeout: Duration) -> Result<String> {
        let message = BusMessage::new(from, to, question, MessageType::Request);
        let id = message.id.clone();
        let (tx, rx) = oneshot::channel();

        let delivery = {
            let mut state = self.lock();
            state.pending.insert(
                id.clone(),
                PendingRequest {
                    requester: from.to_string(),
                    tx,
                },
            );
            state.record(message.clone(), self.history_limit);
            state.direct(to)
        };
        // Clears the pending entry on every exit path, including drop of this future
        let _guard = PendingGuard { bus: self, id: &id };

        let outcome = tokio::time::timeout(timeout, async {
            self.deliver(message, delivery).await;
            rx.await
        })
        .await;

        match outcome {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(_)) => Err(MeshError::InvalidState(format!("request {} abandoned", id))),
            Err(_) => {
                log::warn!("Request {} from {} to {} timed out", id, from, to);
                Err(MeshError::timeout(format!("request {} from {} to {}", id, from, to), timeout))
            }
        }
    }

    /// Answer a pending request.
    ///
    /// Resolves the waiter if `reply_to` is still pending; late or duplicate
    /// responses are recorded but otherwise ignored. Returns the response id.
    pub async fn respond(&self, from: &str, reply_to: &str, content: impl Into<String>) -> String {
        let content = content.into();
        let mut message = BusMessage::new(from, "", content.clone(), MessageType::Response);
        message.reply_to = Some(reply_to.to_string());

        let (waiter, delivery) = {
            let mut state = self.lock();
            let pending = state.pending.remove(reply_to);
            if let Some(p) = &pending {
                message.to = p.requester.clone();
            }
            state.record(message.clone(), self.history_limit);
            (pending.map(|p| p.tx), state.global_only())
        };

        match waiter {
            Some(tx) => {
                if tx.send(content).is_err() {
                    log::debug!("Requester for {} gone before response arrived", reply_to);
                }
            }
            None => log::debug!("No pending request {}; response ignored", reply_to),
        }

        let id = message.id.clone();
        self.deliver(message, delivery).await;
        id
    }

    async fn deliver(&self, message: BusMessage, delivery: Delivery) {
        for (target, subscriber) in delivery.targets {
            if let Err(e) = deliver_one(subscriber, message.clone()).await {
                log::error!("Bus delivery error to {}: {:#}", target, e);
            }
        }
        for subscriber in delivery.global {
            if let Err(e) = deliver_one(subscriber, message.clone()).await {
                log::debug!("Global subscriber error: {:#}", e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Artifacts
    // ------------------------------------------------------------------

    /// Share a generic artifact
    pub async fn set_artifact(&self, key: &str, value: Value, owner: &str) {
        self.set_artifact_with(key, value, owner, DEFAULT_ARTIFACT_TYPE, Map::new())
            .await
    }

    /// Upsert an artifact (last write wins) and broadcast a notification from its owner
    pub async fn set_artifact_with(
        &self,
        key: &str,
        value: Value,
        owner: &str,
        artifact_type: &str,
        metadata: Map<String, Value>,
    ) {
        let now = Utc::now();
        {
            let mut state = self.lock();
            let created_at = state.artifacts.get(key).map(|a| a.created_at).unwrap_or(now);
            state.artifacts.insert(
                key.to_string(),
                Artifact {
                    key: key.to_string(),
                    value,
                    owner: owner.to_string(),
                    artifact_type: artifact_type.to_string(),
                    metadata,
                    created_at,
                    updated_at: now,
                },
            );
        }

        let options = SendOptions::default()
            .with_metadata("artifact_key", json!(key))
            .with_metadata("artifact_type", json!(artifact_type));
        self.broadcast(
            owner,
            format!("Artifact '{}' ({}) posted by {}", key, artifact_type, owner),
            options,
        )
        .await;
    }

    pub fn get_artifact(&self, key: &str) -> Option<Value> {
        self.lock().artifacts.get(key).map(|a| a.value.clone())
    }

    pub fn get_artifact_full(&self, key: &str) -> Option<Artifact> {
        self.lock().artifacts.get(key).cloned()
    }

    /// Artifact summaries ordered by key, optionally restricted to one type
    pub fn list_artifacts(&self, artifact_type: Option<&str>) -> Vec<ArtifactSummary> {
        self.lock()
            .artifacts
            .values()
            .filter(|a| artifact_type.is_none_or(|t| a.artifact_type == t))
            .map(ArtifactSummary::from)
            .collect()
    }

    pub fn all_artifacts(&self) -> BTreeMap<String, Artifact> {
        self.lock().artifacts.clone()
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// The most recent `limit` messages, oldest first.
    ///
    /// With an agent filter, keeps messages from or to that agent plus broadcasts.
    pub fn get_history(&self, agent_id: Option<&str>, limit: usize) -> Vec<BusMessage> {
        let state = self.lock();
        let mut recent: Vec<BusMessage> = state
            .history
            .iter()
            .rev()
            .filter(|m| agent_id.is_none_or(|id| m.involves(id)))
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        recent
    }

    pub fn pending_requests(&self) -> usize {
        self.lock().pending.len()
    }
}

struct PendingGuard<'a> {
    bus: &'a AgentBus,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.bus.lock().pending.remove(self.id);
    }
}

async fn deliver_one(subscriber: Arc<dyn BusSubscriber>, message: BusMessage) -> eyre::Result<()> {
    match AssertUnwindSafe(subscriber.deliver(message)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(eyre::eyre!("subscriber panicked: {}", panic_message(payload.as_ref()))),
    }
}

impl std::fmt::Debug for AgentBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("AgentBus")
            .field("agents", &state.subscribers.len())
            .field("artifacts", &state.artifacts.len())
            .field("pending", &state.pending.len())
            .field("history", &state.history.len())
            .finish()
    }
}
