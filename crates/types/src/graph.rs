//! Graph diagnostics produced by the resolver, plus the on-disk task graph document.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::task::TaskMetadata;

/// Result of validating a task set.
///
/// `execution_order` and `depth_map` are only populated when `is_valid` is true.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphValidationResult {
    /// True when no errors were recorded.
    pub is_valid: bool,
    /// Duplicate ids, missing dependencies, and cycle traces.
    pub errors: Vec<String>,
    /// Non-fatal findings such as blank descriptions.
    pub warnings: Vec<String>,
    /// Topologically sorted task ids.
    pub execution_order: Vec<String>,
    /// Longest-path depth from a root, keyed by task id in execution order.
    pub depth_map: IndexMap<String, usize>,
}

/// Identifiers sharing the maximum fan-in or fan-out.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FanStatistic {
    pub task_ids: Vec<String>,
    pub count: usize,
}

/// Shape of a task graph. Diagnostics only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphStatistics {
    pub total_tasks: usize,
    pub total_edges: usize,
    /// Tasks without dependencies.
    pub root_tasks: Vec<String>,
    /// Tasks nothing depends on.
    pub leaf_tasks: Vec<String>,
    pub average_dependencies: f64,
    pub max_depth: usize,
    /// Most depended-upon task(s); `None` when the graph has no edges.
    pub max_fan_in: Option<FanStatistic>,
    /// Task(s) declaring the most dependencies; `None` when the graph has no edges.
    pub max_fan_out: Option<FanStatistic>,
}

/// Task graph loaded from a YAML or JSON file for offline diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphDocument {
    /// Optional name of the workflow the graph belongs to.
    #[serde(default)]
    pub name: Option<String>,
    /// Task metadata in declaration order.
    #[serde(default)]
    pub tasks: Vec<TaskMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_document_parses_from_yaml() {
        let yaml = r#"
name: release
tasks:
  - id: bump
    description: Bump the version
  - id: commit
    description: Commit changes
    dependencies: [bump]
"#;
        let document: GraphDocument = serde_yaml::from_str(yaml).expect("parse document");
        assert_eq!(document.name.as_deref(), Some("release"));
        assert_eq!(document.tasks.len(), 2);
        assert_eq!(document.tasks[1].dependencies, vec!["bump".to_string()]);
    }
}
