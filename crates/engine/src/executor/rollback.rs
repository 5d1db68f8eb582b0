//! Reverse-order compensation of completed tasks.

use relay_types::{ExecutionEvent, RollbackFailure};
use tracing::{error, info, warn};

use super::Executor;
use crate::{context::WorkflowContext, task::Task};

impl Executor {
    /// Compensates `completed` (already in reverse completion order).
    ///
    /// Every compensation is attempted even when an earlier one fails; the
    /// failures are returned. Tasks without a compensation are logged and skipped.
    pub(super) async fn rollback<C>(&self, completed: &[&Task<C>], context: &WorkflowContext<C>) -> Vec<RollbackFailure>
    where
        C: Send + Sync + 'static,
    {
        let task_ids: Vec<String> = completed.iter().map(|task| task.id().to_string()).collect();
        info!(tasks = ?task_ids, "rolling back completed tasks");
        self.emit(ExecutionEvent::RollbackStarted { tasks: task_ids });

        let mut failures = Vec::new();
        for task in completed {
            match task.undo(context).await {
                None => {
                    warn!(task = %task.id(), "no compensation registered; skipping");
                    self.emit(ExecutionEvent::CompensationMissing {
                        task_id: task.id().to_string(),
                    });
                }
                Some(Ok(())) => {
                    info!(task = %task.id(), "compensated");
                    self.emit(ExecutionEvent::TaskCompensated {
                        task_id: task.id().to_string(),
                    });
                }
                Some(Err(failure)) => {
                    let message = format!("{failure:#}");
                    error!(task = %task.id(), error = %message, "compensation failed");
                    self.emit(ExecutionEvent::CompensationFailed {
                        task_id: task.id().to_string(),
                        message: message.clone(),
                    });
                    failures.push(RollbackFailure {
                        task_id: task.id().to_string(),
                        message,
                    });
                }
            }
        }
        failures
    }
}
