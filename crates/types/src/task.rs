//! Task metadata and skip decisions.

use serde::{Deserialize, Serialize};

/// Static description of a single unit of work.
///
/// Dependencies are declared up front and never change during a run. The graph
/// resolver checks that every id is unique and every dependency exists in the
/// same task set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskMetadata {
    /// Identifier, unique within a run.
    pub id: String,
    /// Human-readable summary. Blank descriptions are validation warnings and stop a run.
    #[serde(default)]
    pub description: String,
    /// Ids of tasks that must complete before this one, in declaration order.
    #[serde(default, alias = "depends_on")]
    pub dependencies: Vec<String>,
}

impl TaskMetadata {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            dependencies: Vec::new(),
        }
    }

    /// Replaces the dependency list.
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Returns `true` when the task has no dependencies.
    pub fn is_root(&self) -> bool {
        self.dependencies.is_empty()
    }
}

/// Outcome of evaluating a task's skip condition.
///
/// `skip_to_tasks` is advisory: the executor resumes at the first remaining task
/// whose id appears in the list, or simply continues with the next task when
/// none of them is found.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkipDecision {
    /// Whether the task should be skipped.
    pub should_skip: bool,
    /// Explanation surfaced in logs and the execution result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Non-empty list of later task ids to resume execution from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_to_tasks: Option<Vec<String>>,
}

impl SkipDecision {
    /// Decision that lets the task run.
    pub fn run() -> Self {
        Self::default()
    }

    /// Decision that skips the task with the given reason.
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            should_skip: true,
            reason: Some(reason.into()),
            skip_to_tasks: None,
        }
    }

    /// Attaches jump targets. An empty list clears them, since an empty jump is
    /// the same as no jump.
    pub fn jump_to<I, S>(mut self, task_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let targets: Vec<String> = task_ids.into_iter().map(Into::into).collect();
        self.skip_to_tasks = if targets.is_empty() { None } else { Some(targets) };
        self
    }

    /// Jump targets, or an empty slice when none were requested.
    pub fn jump_targets(&self) -> &[String] {
        self.skip_to_tasks.as_deref().unwrap_or_default()
    }

    /// Reason text, falling back to a generic message.
    pub fn reason_or_default(&self) -> &str {
        self.reason.as_deref().unwrap_or("skip condition matched")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_accepts_depends_on_alias() {
        let yaml = r#"
id: "publish"
description: "Publish the release"
depends_on: ["tag", "push"]
"#;
        let meta: TaskMetadata = serde_yaml::from_str(yaml).expect("parse metadata");
        assert_eq!(meta.id, "publish");
        assert_eq!(meta.dependencies, vec!["tag".to_string(), "push".to_string()]);
        assert!(!meta.is_root());
    }

    #[test]
    fn empty_jump_list_is_normalized_away() {
        let decision = SkipDecision::skip("nothing to do").jump_to(Vec::<String>::new());
        assert!(decision.should_skip);
        assert!(decision.skip_to_tasks.is_none());
        assert!(decision.jump_targets().is_empty());
    }

    #[test]
    fn run_decision_serializes_without_optional_fields() {
        let json = serde_json::to_value(SkipDecision::run()).expect("serialize");
        assert_eq!(json, serde_json::json!({ "should_skip": false }));
    }
}
