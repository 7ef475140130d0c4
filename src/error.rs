//! Error types for agentmesh
//!
//! Centralized error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

/// All error types that can occur in agentmesh
#[derive(Debug, Error)]
pub enum MeshError {
    /// Tool name is not registered
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool name is already registered and the registry rejects duplicates
    #[error("Duplicate tool: {0}")]
    DuplicateTool(String),

    /// Work item id is not part of the pool
    #[error("Unknown work item: {0}")]
    UnknownWorkItem(String),

    /// Work item id was added twice
    #[error("Duplicate work item: {0}")]
    DuplicateWorkItem(String),

    /// Dependency graph contains a cycle
    #[error("Cyclic dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    /// No provider could be resolved for a model id
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// A bounded wait expired
    #[error("Timed out after {}ms: {what}", .after.as_millis())]
    Timeout { what: String, after: Duration },

    /// Decision interface failure
    #[error("Provider error: {0}")]
    Provider(#[from] crate::llm::LlmError),

    /// Tool execution error
    #[error("Tool error: {0}")]
    Tool(String),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MeshError {
    /// Build a timeout error
    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            after,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, MeshError::Timeout { .. })
    }
}

/// Result type alias for agentmesh operations
pub type Result<T> = std::result::Result<T, MeshError>;

/// Best-effort text of a caught panic payload
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    #[test]
    fn test_unknown_tool_error() {
        let err = MeshError::UnknownTool("frobnicate".to_string());
        assert_eq!(err.to_string(), "Unknown tool: frobnicate");
    }

    #[test]
    fn test_unknown_work_item_error() {
        let err = MeshError::UnknownWorkItem("qa_1234".to_string());
        assert_eq!(err.to_string(), "Unknown work item: qa_1234");
    }

    #[test]
    fn test_cyclic_dependency_error() {
        let err = MeshError::CyclicDependency(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "Cyclic dependency: a -> b -> a");
    }

    #[test]
    fn test_timeout_error() {
        let err = MeshError::timeout("request to y", Duration::from_millis(10));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Timed out after 10ms: request to y");
    }

    #[test]
    fn test_provider_error_conversion() {
        let err: MeshError = LlmError::InvalidResponse("empty body".into()).into();
        assert!(matches!(err, MeshError::Provider(_)));
        assert!(err.to_string().contains("empty body"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MeshError = io_err.into();
        assert!(matches!(err, MeshError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: MeshError = json_err.into();
        assert!(matches!(err, MeshError::Json(_)));
    }

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("static str")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static str");

        let payload = std::panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 7");
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(MeshError::InvalidState("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
