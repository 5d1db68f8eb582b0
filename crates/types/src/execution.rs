//! Execution audit trail and lifecycle events.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A compensation that failed while rolling back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RollbackFailure {
    pub task_id: String,
    pub message: String,
}

/// Final record of a run. Produced exactly once per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    /// True when every task either executed or was skipped.
    pub success: bool,
    /// Ids of tasks that executed successfully, in execution order.
    pub executed_tasks: Vec<String>,
    /// Ids of tasks skipped by their skip condition, in evaluation order.
    pub skipped_tasks: Vec<String>,
    /// Skip reason per skipped task.
    #[serde(default)]
    pub skip_reasons: IndexMap<String, String>,
    /// Id of the task that was running when the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_task: Option<String>,
    /// Message of the triggering failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True only when a rollback ran and every compensation succeeded.
    pub rollback_executed: bool,
    /// Compensations that failed during rollback.
    #[serde(default)]
    pub rollback_errors: Vec<RollbackFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Whether a rollback was attempted, successful or not.
    pub fn rollback_attempted(&self) -> bool {
        self.rollback_executed || !self.rollback_errors.is_empty()
    }

    /// Skip reason recorded for `task_id`.
    pub fn skip_reason(&self, task_id: &str) -> Option<&str> {
        self.skip_reasons.get(task_id).map(String::as_str)
    }
}

/// Lifecycle events emitted by the executor while a run progresses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    RunStarted {
        at: DateTime<Utc>,
        total_tasks: usize,
    },
    TaskStarted {
        index: usize,
        task_id: String,
        description: String,
    },
    TaskSkipped {
        task_id: String,
        reason: Option<String>,
        /// Task the executor jumped to, when a skip-to target was found.
        jumped_to: Option<String>,
    },
    TaskSucceeded {
        task_id: String,
        duration_ms: u64,
    },
    TaskFailed {
        task_id: String,
        message: String,
    },
    RollbackStarted {
        /// Tasks to compensate, in reverse execution order.
        tasks: Vec<String>,
    },
    TaskCompensated {
        task_id: String,
    },
    CompensationMissing {
        task_id: String,
    },
    CompensationFailed {
        task_id: String,
        message: String,
    },
    RunCompleted {
        success: bool,
        finished_at: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    /// Task id the event refers to, if any.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            ExecutionEvent::TaskStarted { task_id, .. }
            | ExecutionEvent::TaskSkipped { task_id, .. }
            | ExecutionEvent::TaskSucceeded { task_id, .. }
            | ExecutionEvent::TaskFailed { task_id, .. }
            | ExecutionEvent::TaskCompensated { task_id }
            | ExecutionEvent::CompensationMissing { task_id }
            | ExecutionEvent::CompensationFailed { task_id, .. } => Some(task_id.as_str()),
            ExecutionEvent::RunStarted { .. } | ExecutionEvent::RollbackStarted { .. } | ExecutionEvent::RunCompleted { .. } => None,
        }
    }
}
