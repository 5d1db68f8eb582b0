//! Error types for graph resolution, execution, and orchestration.

use relay_types::ExecutionResult;
use thiserror::Error;

/// Circular dependency found while ordering tasks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("circular dependency detected: {path}")]
pub struct CycleError {
    /// Human-readable trace such as `a → b → a`, or the ids left unordered.
    pub path: String,
}

impl CycleError {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Main error type for workflow runs.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("task graph validation failed: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    #[error("circular dependency detected: {path}")]
    Cycle { path: String },

    #[error("task '{task_id}' failed: {message}")]
    TaskFailed {
        task_id: String,
        message: String,
        /// Partial audit trail up to the failure, including rollback outcome.
        result: Box<ExecutionResult>,
    },

    #[error("context key not found: {key}")]
    NotFound { key: String },

    #[error("context key '{key}' has an unexpected shape: {message}")]
    DataType { key: String, message: String },

    #[error("service not registered: {key}")]
    UnknownService { key: String },

    #[error("service '{key}' does not have the requested type")]
    ServiceType { key: String },

    #[error("command not registered: {name}")]
    UnknownCommand { name: String },

    #[error("command '{command}' could not build its tasks: {message}")]
    BuildTasks { command: String, message: String },

    #[error("{hook} hook failed: {message}")]
    Hook {
        hook: &'static str,
        message: String,
        /// Result of the run when the hook fired after execution.
        result: Option<Box<ExecutionResult>>,
    },
}

impl WorkflowError {
    /// Create a validation error from collected messages.
    pub fn validation(errors: Vec<String>) -> Self {
        Self::Validation { errors }
    }

    /// Create a context not-found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create an unknown service error.
    pub fn unknown_service(key: impl Into<String>) -> Self {
        Self::UnknownService { key: key.into() }
    }

    /// Create a task failure error carrying the partial result.
    pub fn task_failed(task_id: impl Into<String>, message: impl Into<String>, result: ExecutionResult) -> Self {
        Self::TaskFailed {
            task_id: task_id.into(),
            message: message.into(),
            result: Box::new(result),
        }
    }

    /// Execution result carried by the error: the partial trail of a failing task,
    /// or the finished run whose after-execute hook failed.
    pub fn execution_result(&self) -> Option<&ExecutionResult> {
        match self {
            Self::TaskFailed { result, .. } => Some(result.as_ref()),
            Self::Hook { result, .. } => result.as_deref(),
            _ => None,
        }
    }

    /// Id of the task that was running when the run failed.
    pub fn failed_task(&self) -> Option<&str> {
        match self {
            Self::TaskFailed { task_id, .. } => Some(task_id.as_str()),
            _ => None,
        }
    }

    /// True for errors detected before any task ran.
    pub fn is_graph_error(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Cycle { .. })
    }
}

impl From<CycleError> for WorkflowError {
    fn from(error: CycleError) -> Self {
        Self::Cycle { path: error.path }
    }
}
