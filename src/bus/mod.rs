//! Communication bus - pub/sub, correlated request/response, shared artifacts
//!
//! Agents and external observers exchange `BusMessage`s through an `AgentBus`
//! shared by `Arc`. Artifacts are named values any participant can read.

mod agent_bus;
mod artifact;
mod message;
mod subscriber;

pub use agent_bus::AgentBus;
pub use artifact::{Artifact, ArtifactSummary, DEFAULT_ARTIFACT_TYPE};
pub use message::{BusMessage, MessageType, Priority, SendOptions};
pub use subscriber::{BusSubscriber, ChannelSubscriber, FnSubscriber, subscriber_fn};
