//! Bus message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::generate_message_id;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Message,
    Broadcast,
    Request,
    Response,
}

/// One entry in the bus history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    pub id: String,
    pub from: String,
    /// Empty for broadcasts
    pub to: String,
    pub content: String,
    pub message_type: MessageType,
    pub priority: Priority,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Id of the request this message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl BusMessage {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> Self {
        Self {
            id: generate_message_id(),
            from: from.into(),
            to: to.into(),
            content: content.into(),
            message_type,
            priority: Priority::Normal,
            metadata: Map::new(),
            reply_to: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_options(mut self, options: SendOptions) -> Self {
        self.priority = options.priority;
        self.metadata = options.metadata;
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.to.is_empty()
    }

    /// True when the message was sent by, addressed to, or broadcast to `agent_id`
    pub fn involves(&self, agent_id: &str) -> bool {
        self.from == agent_id || self.to == agent_id || self.is_broadcast()
    }
}

/// Optional fields for `send` and `broadcast`
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub priority: Priority,
    pub metadata: Map<String, Value>,
}

impl SendOptions {
    pub fn priority(priority: Priority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
