//! Tool outputs and their normalized result

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of one tool call, as seen by the execution loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub output: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub artifacts: Map<String, Value>,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
            error: None,
            artifacts: Map::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            success: false,
            error: Some(error.into()),
            artifacts: Map::new(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Map<String, Value>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Text appended to the transcript as the tool-role observation
    pub fn observation(&self) -> String {
        if self.success {
            return self.output.clone();
        }
        match &self.error {
            Some(error) => format!("Error: {}", error),
            None => self.output.clone(),
        }
    }
}

/// What a tool handler hands back before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Any JSON value; strings are taken verbatim, everything else is rendered as JSON
    Plain(Value),
    /// Output with an explicit success flag and side artifacts
    Structured {
        output: Value,
        success: bool,
        artifacts: Map<String, Value>,
    },
    /// Already normalized
    Result(ToolResult),
    /// Handler-reported failure
    Failure(String),
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Plain(Value::String(text.into()))
    }

    /// Interpret a loosely-shaped JSON object.
    ///
    /// Objects carrying `output`, `success`, or `artifacts` keys are treated as
    /// structured; anything else is plain.
    pub fn from_json(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self::Plain(value);
        };
        if !["output", "success", "artifacts"].iter().any(|k| map.contains_key(*k)) {
            return Self::Plain(Value::Object(map));
        }

        let success = map.get("success").and_then(Value::as_bool).unwrap_or(true);
        let artifacts = match map.remove("artifacts") {
            Some(Value::Object(artifacts)) => artifacts,
            _ => Map::new(),
        };
        let output = match map.remove("output") {
            Some(output) => output,
            None => {
                map.remove("success");
                Value::Object(map)
            }
        };
        Self::Structured {
            output,
            success,
            artifacts,
        }
    }

    /// Collapse into a `ToolResult`
    pub fn into_result(self) -> ToolResult {
        match self {
            ToolOutput::Plain(value) => ToolResult::success(render(value)),
            ToolOutput::Structured {
                output,
                success,
                artifacts,
            } => ToolResult {
                output: render(output),
                success,
                error: None,
                artifacts,
            },
            ToolOutput::Result(result) => result,
            ToolOutput::Failure(error) => ToolResult::failure(error),
        }
    }
}

fn render(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl From<String> for ToolOutput {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

impl From<&str> for ToolOutput {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        Self::Plain(value)
    }
}

impl From<ToolResult> for ToolOutput {
    fn from(result: ToolResult) -> Self {
        Self::Result(result)
    }
}
