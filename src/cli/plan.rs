//! Work plan files for `agentmesh plan`
//!
//! ```yaml
//! items:
//!   - id: research
//!     kind: researcher
//!     task: Survey existing crates
//!   - id: write
//!     task: Draft the report
//!     depends_on: [research]
//! ```

use std::fs;
use std::path::Path;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use agentmesh::pool::DependencyGraph;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanFile {
    #[serde(default)]
    pub items: Vec<PlanItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanItem {
    pub id: String,
    /// Agent type; defaults to the id
    pub kind: Option<String>,
    pub task: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl PlanItem {
    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.id)
    }
}

impl PlanFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).context(format!("Failed to read plan file: {}", path.display()))?;
        serde_yaml::from_str(&content).context(format!("Failed to parse plan file: {}", path.display()))
    }

    pub fn graph(&self) -> agentmesh::Result<DependencyGraph> {
        DependencyGraph::new(
            self.items
                .iter()
                .map(|item| (item.id.clone(), item.depends_on.clone())),
        )
    }

    pub fn get(&self, id: &str) -> Option<&PlanItem> {
        self.items.iter().find(|item| item.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh::MeshError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_plan(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_plan() {
        let file = write_plan(
            r#"
items:
  - id: research
    kind: researcher
    task: Survey
  - id: write
    task: Draft
    depends_on: [research]
"#,
        );

        let plan = PlanFile::load(file.path()).unwrap();
        assert_eq!(plan.items.len(), 2);
        assert_eq!(plan.get("research").unwrap().kind(), "researcher");
        assert_eq!(plan.get("write").unwrap().kind(), "write");

        let layers = plan.graph().unwrap().execution_layers().unwrap();
        assert_eq!(layers, vec![vec!["research".to_string()], vec!["write".to_string()]]);
    }

    #[test]
    fn test_plan_cycle_reported() {
        let file = write_plan(
            r#"
items:
  - id: a
    task: x
    depends_on: [b]
  - id: b
    task: y
    depends_on: [a]
"#,
        );

        let plan = PlanFile::load(file.path()).unwrap();
        let err = plan.graph().unwrap().execution_layers().unwrap_err();
        assert!(matches!(err, MeshError::CyclicDependency(_)));
    }

    #[test]
    fn test_missing_plan_file() {
        assert!(PlanFile::load("/nonexistent/plan.yml").is_err());
    }
}
