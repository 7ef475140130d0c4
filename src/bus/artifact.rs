//! Shared work products

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_ARTIFACT_TYPE: &str = "generic";

/// A named value shared on the bus; last write wins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub key: String,
    pub value: Value,
    pub owner: String,
    /// Classification such as code, spec, research
    pub artifact_type: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing entry returned by `AgentBus::list_artifacts`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub key: String,
    pub artifact_type: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Artifact> for ArtifactSummary {
    fn from(artifact: &Artifact) -> Self {
        Self {
            key: artifact.key.clone(),
            artifact_type: artifact.artifact_type.clone(),
            owner: artifact.owner.clone(),
            created_at: artifact.created_at,
        }
    }
}
