//! Bus-backed tools
//!
//! Lets an agent talk to its peers and share artifacts from inside its
//! execution loop. Every tool is tagged `collaboration`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};

use super::definition::ToolSpec;
use super::registry::ToolRegistry;
use super::result::ToolOutput;
use crate::bus::{AgentBus, DEFAULT_ARTIFACT_TYPE, Priority, SendOptions};
use crate::error::Result;

pub const COLLABORATION_TAG: &str = "collaboration";

/// Build a registry of collaboration tools acting as `agent_id` on `bus`
pub fn collaboration_tools(bus: Arc<AgentBus>, agent_id: &str) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(send_message(Arc::clone(&bus), agent_id))?;
    registry.register(broadcast_message(Arc::clone(&bus), agent_id))?;
    registry.register(ask_agent(Arc::clone(&bus), agent_id))?;
    registry.register(share_artifact(Arc::clone(&bus), agent_id))?;
    registry.register(read_artifact(Arc::clone(&bus)))?;
    registry.register(list_artifacts(bus))?;
    Ok(registry)
}

fn required_str(args: &Map<String, Value>, key: &str) -> eyre::Result<String> {
    match args.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => eyre::bail!("Argument '{}' must be a string, got {}", key, other),
        None => eyre::bail!("Missing required argument '{}'", key),
    }
}

fn optional_str(args: &Map<String, Value>, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn parse_priority(value: Option<String>) -> Priority {
    match value.as_deref() {
        Some("low") => Priority::Low,
        Some("high") => Priority::High,
        Some("urgent") => Priority::Urgent,
        _ => Priority::Normal,
    }
}

fn send_message(bus: Arc<AgentBus>, agent_id: &str) -> ToolSpec {
    let me = agent_id.to_string();
    ToolSpec::from_fn(
        "send_message",
        "Send a direct message to another agent.",
        move |args| {
            let bus = Arc::clone(&bus);
            let me = me.clone();
            async move {
                let to = required_str(&args, "to")?;
                let content = required_str(&args, "content")?;
                let priority = parse_priority(optional_str(&args, "priority"));
                let id = bus.send(&me, &to, content, SendOptions::priority(priority)).await;
                Ok(ToolOutput::text(format!("Message {} sent to {}", id, to)))
            }
        },
    )
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "to": {"type": "string", "description": "Recipient agent id"},
            "content": {"type": "string", "description": "Message body"},
            "priority": {"type": "string", "enum": ["low", "normal", "high", "urgent"]}
        },
        "required": ["to", "content"]
    }))
    .with_tags([COLLABORATION_TAG])
}

fn broadcast_message(bus: Arc<AgentBus>, agent_id: &str) -> ToolSpec {
    let me = agent_id.to_string();
    ToolSpec::from_fn(
        "broadcast_message",
        "Broadcast a message to every other agent on the bus.",
        move |args| {
            let bus = Arc::clone(&bus);
            let me = me.clone();
            async move {
                let content = required_str(&args, "content")?;
                let id = bus.broadcast(&me, content, SendOptions::default()).await;
                Ok(ToolOutput::text(format!("Broadcast {} sent", id)))
            }
        },
    )
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "content": {"type": "string", "description": "Message body"}
        },
        "required": ["content"]
    }))
    .with_tags([COLLABORATION_TAG])
}

/// Positive, representable number of seconds; anything else is ignored
fn timeout_arg(args: &Map<String, Value>, key: &str) -> Option<Duration> {
    args.get(key)
        .and_then(Value::as_f64)
        .filter(|s| *s > 0.0)
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
}

fn ask_agent(bus: Arc<AgentBus>, agent_id: &str) -> ToolSpec {
    let me = agent_id.to_string();
    ToolSpec::from_fn(
        "ask_agent",
        "Ask another agent a question and wait for its answer.",
        move |args| {
            let bus = Arc::clone(&bus);
            let me = me.clone();
            async move {
                let agent = required_str(&args, "agent")?;
                let question = required_str(&args, "question")?;
                let timeout = timeout_arg(&args, "timeout_seconds").unwrap_or_else(|| bus.request_timeout());

                match bus.request(&me, &agent, question, timeout).await {
                    Ok(answer) => Ok(ToolOutput::text(answer)),
                    Err(e) => {
                        log::info!("{} could not reach {}: {}", me, agent, e);
                        Ok(ToolOutput::text(format!(
                            "Agent '{}' not available ({}). Proceed with your own judgment.",
                            agent, e
                        )))
                    }
                }
            }
        },
    )
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "agent": {"type": "string", "description": "Agent id to ask"},
            "question": {"type": "string", "description": "The question"},
            "timeout_seconds": {"type": "number", "description": "How long to wait for an answer"}
        },
        "required": ["agent", "question"]
    }))
    .with_tags([COLLABORATION_TAG])
}

fn share_artifact(bus: Arc<AgentBus>, agent_id: &str) -> ToolSpec {
    let me = agent_id.to_string();
    ToolSpec::from_fn(
        "share_artifact",
        "Share a work product (code, spec, research) with other agents.",
        move |args| {
            let bus = Arc::clone(&bus);
            let me = me.clone();
            async move {
                let key = required_str(&args, "key")?;
                let content = args
                    .get("content")
                    .cloned()
                    .ok_or_else(|| eyre::eyre!("Missing required argument 'content'"))?;
                let artifact_type =
                    optional_str(&args, "artifact_type").unwrap_or_else(|| DEFAULT_ARTIFACT_TYPE.to_string());

                bus.set_artifact_with(&key, content, &me, &artifact_type, Map::new())
                    .await;

                let mut artifacts = Map::new();
                artifacts.insert("artifact_key".into(), json!(key));
                Ok(ToolOutput::Structured {
                    output: json!(format!("Artifact '{}' posted to bus.", key)),
                    success: true,
                    artifacts,
                })
            }
        },
    )
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "key": {"type": "string", "description": "Artifact key (e.g. 'api_routes')"},
            "content": {"description": "The artifact content"},
            "artifact_type": {"type": "string", "description": "Type: code, spec, config, etc."}
        },
        "required": ["key", "content"]
    }))
    .with_tags([COLLABORATION_TAG])
}

fn read_artifact(bus: Arc<AgentBus>) -> ToolSpec {
    ToolSpec::from_fn("read_artifact", "Read a shared artifact by key.", move |args| {
        let bus = Arc::clone(&bus);
        async move {
            let key = required_str(&args, "key")?;
            Ok(match bus.get_artifact(&key) {
                Some(Value::String(s)) => ToolOutput::text(s),
                Some(value) => ToolOutput::text(serde_json::to_string_pretty(&value)?),
                None => ToolOutput::Failure(format!("No artifact named '{}'", key)),
            })
        }
    })
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "key": {"type": "string", "description": "Artifact key"}
        },
        "required": ["key"]
    }))
    .with_tags([COLLABORATION_TAG])
}

fn list_artifacts(bus: Arc<AgentBus>) -> ToolSpec {
    ToolSpec::from_fn("list_artifacts", "List shared artifacts.", move |args| {
        let bus = Arc::clone(&bus);
        async move {
            let filter = optional_str(&args, "artifact_type");
            let artifacts = bus.list_artifacts(filter.as_deref());
            if artifacts.is_empty() {
                return Ok(ToolOutput::text("No artifacts found."));
            }
            let lines: Vec<String> = artifacts
                .iter()
                .map(|a| format!("- {} ({}) by {}", a.key, a.artifact_type, a.owner))
                .collect();
            Ok(ToolOutput::text(lines.join("\n")))
        }
    })
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "artifact_type": {"type": "string", "description": "Only list artifacts of this type"}
        }
    }))
    .with_tags([COLLABORATION_TAG])
}
