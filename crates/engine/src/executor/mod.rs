//! Sequential executor: runs ordered tasks against a context, records an audit
//! trail, and compensates completed tasks when one fails.
//!
//! - Each task's skip condition is evaluated against the current context right
//!   before it would run. A skipped task may ask to resume at a later task; the
//!   jump only looks at the tasks that remain.
//! - A successful task replaces the working context with the one it returns.
//! - The first failure stops the run. When rollback is enabled and at least one
//!   task completed, compensations run in reverse completion order.
//! - Lifecycle events are streamed to an optional Tokio channel.

use std::time::Instant;

use chrono::Utc;
use indexmap::IndexMap;
use relay_types::{ExecutionEvent, ExecutionResult};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::{config::ExecutorOptions, context::WorkflowContext, error::WorkflowError, task::Task};

mod rollback;

/// Outcome of a successful run: the audit trail and the final context.
#[derive(Debug, Clone)]
pub struct ExecutionReport<C> {
    pub result: ExecutionResult,
    pub context: WorkflowContext<C>,
}

/// Runs tasks one at a time, in the order given.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    options: ExecutorOptions,
    events: Option<UnboundedSender<ExecutionEvent>>,
}

impl Executor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self { options, events: None }
    }

    /// Streams lifecycle events to `sender`. A dropped receiver never fails a run.
    pub fn with_event_sink(mut self, sender: UnboundedSender<ExecutionEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Executes `tasks` (already in execution order) starting from `initial`.
    ///
    /// On failure the returned [`WorkflowError::TaskFailed`] names the task that was
    /// running and carries the partial result, including the rollback outcome.
    pub async fn execute<C>(&self, tasks: &[Task<C>], initial: WorkflowContext<C>) -> Result<ExecutionReport<C>, WorkflowError>
    where
        C: Send + Sync + 'static,
    {
        let started_at = Utc::now();
        let clock = Instant::now();
        self.emit(ExecutionEvent::RunStarted {
            at: started_at,
            total_tasks: tasks.len(),
        });

        let mut context = initial;
        let mut completed: Vec<usize> = Vec::new();
        let mut skipped_tasks = Vec::new();
        let mut skip_reasons = IndexMap::new();
        let mut failure: Option<(String, anyhow::Error)> = None;

        let mut index = 0;
        while index < tasks.len() {
            let task = &tasks[index];

            if let Some(decision) = task.should_skip(&context)
                && decision.should_skip
            {
                let reason = decision.reason_or_default().to_string();
                let jump = find_jump_target(&tasks[index + 1..], decision.jump_targets());
                let jumped_to = jump.map(|offset| tasks[index + 1 + offset].id().to_string());
                debug!(task = %task.id(), reason = %reason, jumped_to = ?jumped_to, "task skipped");

                skipped_tasks.push(task.id().to_string());
                skip_reasons.insert(task.id().to_string(), reason.clone());
                self.emit(ExecutionEvent::TaskSkipped {
                    task_id: task.id().to_string(),
                    reason: Some(reason),
                    jumped_to,
                });

                index = match jump {
                    Some(offset) => index + 1 + offset,
                    None => index + 1,
                };
                continue;
            }

            info!(task = %task.id(), "running task: {}", task.meta().description);
            self.emit(ExecutionEvent::TaskStarted {
                index,
                task_id: task.id().to_string(),
                description: task.meta().description.clone(),
            });

            let task_clock = Instant::now();
            match task.execute(&context).await {
                Ok(next) => {
                    context = next;
                    completed.push(index);
                    self.emit(ExecutionEvent::TaskSucceeded {
                        task_id: task.id().to_string(),
                        duration_ms: elapsed_ms(task_clock),
                    });
                }
                Err(error) => {
                    let message = format!("{error:#}");
                    warn!(task = %task.id(), error = %message, "task failed");
                    self.emit(ExecutionEvent::TaskFailed {
                        task_id: task.id().to_string(),
                        message,
                    });
                    failure = Some((task.id().to_string(), error));
                    break;
                }
            }
            index += 1;
        }

        let executed_tasks: Vec<String> = completed.iter().map(|&position| tasks[position].id().to_string()).collect();

        let Some((failed_task, error)) = failure else {
            let finished_at = Utc::now();
            info!(executed = executed_tasks.len(), skipped = skipped_tasks.len(), "workflow completed");
            self.emit(ExecutionEvent::RunCompleted {
                success: true,
                finished_at,
            });
            let result = ExecutionResult {
                success: true,
                executed_tasks,
                skipped_tasks,
                skip_reasons,
                failed_task: None,
                error: None,
                rollback_executed: false,
                rollback_errors: Vec::new(),
                started_at,
                finished_at,
                duration_ms: elapsed_ms(clock),
            };
            return Ok(ExecutionReport { result, context });
        };

        let mut rollback_errors = Vec::new();
        let mut rollback_executed = false;
        if !self.options.rollback_enabled {
            debug!(task = %failed_task, "rollback disabled; leaving completed tasks in place");
        } else if completed.is_empty() {
            debug!(task = %failed_task, "no completed tasks to roll back");
        } else {
            let completed_tasks: Vec<&Task<C>> = completed.iter().rev().map(|&position| &tasks[position]).collect();
            rollback_errors = self.rollback(&completed_tasks, &context).await;
            rollback_executed = rollback_errors.is_empty();
        }

        let message = format!("{error:#}");
        let finished_at = Utc::now();
        self.emit(ExecutionEvent::RunCompleted {
            success: false,
            finished_at,
        });
        let result = ExecutionResult {
            success: false,
            executed_tasks,
            skipped_tasks,
            skip_reasons,
            failed_task: Some(failed_task.clone()),
            error: Some(message.clone()),
            rollback_executed,
            rollback_errors,
            started_at,
            finished_at,
            duration_ms: elapsed_ms(clock),
        };
        Err(WorkflowError::task_failed(failed_task, message, result))
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }
}

/// Offset of the first task in `remaining` whose id is one of `targets`.
fn find_jump_target<C>(remaining: &[Task<C>], targets: &[String]) -> Option<usize> {
    if targets.is_empty() {
        return None;
    }
    remaining.iter().position(|task| targets.iter().any(|target| target == task.id()))
}

fn elapsed_ms(clock: Instant) -> u64 {
    clock.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skip::{data_present, skip_if};
    use relay_types::SkipDecision;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc::unbounded_channel;

    type Journal = Arc<Mutex<Vec<String>>>;

    fn step(id: &str) -> Task<()> {
        let key = id.to_string();
        Task::new(id, format!("task {id}"), move |context: WorkflowContext<()>| {
            let key = key.clone();
            async move { Ok(context.fork(key, json!(true))) }
        })
    }

    fn failing(id: &str) -> Task<()> {
        let id_owned = id.to_string();
        Task::new(id, format!("task {id}"), move |_context: WorkflowContext<()>| {
            let id_owned = id_owned.clone();
            async move { Err(anyhow::anyhow!("{id_owned} exploded")) }
        })
    }

    fn journaled(task: Task<()>, journal: &Journal) -> Task<()> {
        let journal = journal.clone();
        let id = task.id().to_string();
        task.with_undo(move |_context: WorkflowContext<()>| {
            let journal = journal.clone();
            let id = id.clone();
            async move {
                journal.lock().unwrap().push(id);
                Ok(())
            }
        })
    }

    fn rollback_on() -> Executor {
        Executor::new(ExecutorOptions { rollback_enabled: true })
    }

    #[tokio::test]
    async fn executes_all_tasks_in_order() {
        let tasks = vec![step("A"), step("B").depends_on(["A"])];
        let report = rollback_on().execute(&tasks, WorkflowContext::new(())).await.expect("run");
        assert!(report.result.success);
        assert_eq!(report.result.executed_tasks, vec!["A", "B"]);
        assert!(report.result.skipped_tasks.is_empty());
        assert!(report.result.failed_task.is_none());
        assert!(report.context.contains("A") && report.context.contains("B"));
    }

    #[tokio::test]
    async fn later_tasks_see_earlier_outputs() {
        let reader = Task::new("read", "Read version", |context: WorkflowContext<()>| async move {
            let version = context.get("version")?.clone();
            Ok(context.fork("seen", version))
        });
        let writer = Task::new("write", "Write version", |context: WorkflowContext<()>| async move {
            Ok(context.fork("version", json!("3.1.4")))
        });
        let report = rollback_on()
            .execute(&[writer, reader], WorkflowContext::new(()))
            .await
            .expect("run");
        assert_eq!(report.context.get("seen").unwrap(), &json!("3.1.4"));
    }

    #[tokio::test]
    async fn skip_check_sees_post_fork_context() {
        let tasks = vec![step("tag"), step("retag").skip_when(data_present("tag"))];
        let report = rollback_on().execute(&tasks, WorkflowContext::new(())).await.expect("run");
        assert_eq!(report.result.executed_tasks, vec!["tag"]);
        assert_eq!(report.result.skipped_tasks, vec!["retag"]);
        assert_eq!(report.result.skip_reason("retag"), Some("'tag' is already present"));
    }

    #[tokio::test]
    async fn skip_to_jumps_over_intermediate_tasks() {
        let tasks = vec![
            step("A"),
            step("B").skip_when(|_: &WorkflowContext<()>| SkipDecision::skip("nothing to publish").jump_to(["D"])),
            step("C"),
            step("D"),
        ];
        let report = rollback_on().execute(&tasks, WorkflowContext::new(())).await.expect("run");
        assert_eq!(report.result.executed_tasks, vec!["A", "D"]);
        assert_eq!(report.result.skipped_tasks, vec!["B"]);
        assert!(!report.context.contains("C"));
    }

    #[tokio::test]
    async fn unknown_or_earlier_skip_targets_continue_with_next_task() {
        let tasks = vec![
            step("A"),
            step("B").skip_when(skip_if("always", |_: &WorkflowContext<()>| true).jump_to(["A", "missing"])),
            step("C"),
        ];
        let report = rollback_on().execute(&tasks, WorkflowContext::new(())).await.expect("run");
        assert_eq!(report.result.executed_tasks, vec!["A", "C"]);
        assert_eq!(report.result.skipped_tasks, vec!["B"]);
    }

    #[tokio::test]
    async fn jump_uses_first_matching_remaining_task() {
        let tasks = vec![
            step("B").skip_when(skip_if("jump", |_: &WorkflowContext<()>| true).jump_to(["E", "D"])),
            step("C"),
            step("D"),
            step("E"),
        ];
        let report = rollback_on().execute(&tasks, WorkflowContext::new(())).await.expect("run");
        assert_eq!(report.result.executed_tasks, vec!["D", "E"]);
    }

    #[tokio::test]
    async fn failure_rolls_back_in_reverse_order() {
        let journal: Journal = Arc::default();
        let tasks = vec![journaled(step("A"), &journal), journaled(step("B"), &journal), failing("C")];
        let error = rollback_on()
            .execute(&tasks, WorkflowContext::new(()))
            .await
            .expect_err("C fails");

        assert_eq!(error.failed_task(), Some("C"));
        let result = error.execution_result().expect("partial result");
        assert!(!result.success);
        assert_eq!(result.executed_tasks, vec!["A", "B"]);
        assert_eq!(result.failed_task.as_deref(), Some("C"));
        assert_eq!(result.error.as_deref(), Some("C exploded"));
        assert!(result.rollback_executed);
        assert!(result.rollback_errors.is_empty());
        assert_eq!(*journal.lock().unwrap(), vec!["B", "A"]);
    }

    #[tokio::test]
    async fn failing_task_is_never_compensated() {
        let journal: Journal = Arc::default();
        let tasks = vec![journaled(step("A"), &journal), journaled(step("B"), &journal), journaled(failing("C"), &journal)];
        let error = rollback_on()
            .execute(&tasks, WorkflowContext::new(()))
            .await
            .expect_err("C fails");

        let result = error.execution_result().expect("partial result");
        assert!(result.rollback_executed);
        assert_eq!(*journal.lock().unwrap(), vec!["B", "A"]);
    }

    #[tokio::test]
    async fn failed_task_is_the_running_one_not_the_last_completed() {
        let tasks = vec![step("A"), step("B").skip_when(skip_if("skip", |_: &WorkflowContext<()>| true)), failing("C")];
        let error = rollback_on()
            .execute(&tasks, WorkflowContext::new(()))
            .await
            .expect_err("C fails");
        let result = error.execution_result().expect("partial result");
        assert_eq!(result.failed_task.as_deref(), Some("C"));
        assert_eq!(result.executed_tasks, vec!["A"]);
        assert_eq!(result.skipped_tasks, vec!["B"]);
    }

    #[tokio::test]
    async fn tasks_after_failure_never_run() {
        let journal: Journal = Arc::default();
        let tasks = vec![failing("A"), journaled(step("B"), &journal)];
        let error = rollback_on()
            .execute(&tasks, WorkflowContext::new(()))
            .await
            .expect_err("A fails");
        let result = error.execution_result().expect("partial result");
        assert!(result.executed_tasks.is_empty());
        assert!(!result.rollback_executed);
        assert!(journal.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rollback_collects_every_compensation_failure() {
        let journal: Journal = Arc::default();
        let broken = step("B").with_undo(|_context: WorkflowContext<()>| async move { Err(anyhow::anyhow!("cannot delete tag")) });
        let tasks = vec![journaled(step("A"), &journal), broken, step("no-undo"), failing("D")];
        let error = rollback_on()
            .execute(&tasks, WorkflowContext::new(()))
            .await
            .expect_err("D fails");
        let result = error.execution_result().expect("partial result");

        assert!(!result.rollback_executed);
        assert!(result.rollback_attempted());
        assert_eq!(result.rollback_errors.len(), 1);
        assert_eq!(result.rollback_errors[0].task_id, "B");
        assert_eq!(result.rollback_errors[0].message, "cannot delete tag");
        assert_eq!(result.error.as_deref(), Some("D exploded"));
        assert_eq!(*journal.lock().unwrap(), vec!["A"]);
    }

    #[tokio::test]
    async fn rollback_disabled_leaves_completed_tasks() {
        let journal: Journal = Arc::default();
        let tasks = vec![journaled(step("A"), &journal), failing("B")];
        let executor = Executor::new(ExecutorOptions { rollback_enabled: false });
        let error = executor.execute(&tasks, WorkflowContext::new(())).await.expect_err("B fails");
        let result = error.execution_result().expect("partial result");
        assert!(!result.rollback_executed);
        assert!(!result.rollback_attempted());
        assert!(journal.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn undo_receives_rollback_time_context() {
        let seen: Journal = Arc::default();
        let recorder = seen.clone();
        let first = step("A").with_undo(move |context: WorkflowContext<()>| {
            let recorder = recorder.clone();
            async move {
                recorder.lock().unwrap().extend(context.data().keys().cloned());
                Ok(())
            }
        });
        let tasks = vec![first, step("B"), failing("C")];
        let _ = rollback_on().execute(&tasks, WorkflowContext::new(())).await;
        assert_eq!(*seen.lock().unwrap(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn events_follow_the_run() {
        let (sender, mut receiver) = unbounded_channel();
        let tasks = vec![
            step("A").with_undo(|_context: WorkflowContext<()>| async move { Ok(()) }),
            step("B").skip_when(skip_if("skip", |_: &WorkflowContext<()>| true)),
            failing("C"),
        ];
        let executor = rollback_on().with_event_sink(sender);
        let _ = executor.execute(&tasks, WorkflowContext::new(())).await;
        drop(executor);

        let mut kinds = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            kinds.push(match event {
                ExecutionEvent::RunStarted { total_tasks, .. } => format!("run_started:{total_tasks}"),
                ExecutionEvent::TaskStarted { task_id, .. } => format!("started:{task_id}"),
                ExecutionEvent::TaskSkipped { task_id, .. } => format!("skipped:{task_id}"),
                ExecutionEvent::TaskSucceeded { task_id, .. } => format!("succeeded:{task_id}"),
                ExecutionEvent::TaskFailed { task_id, .. } => format!("failed:{task_id}"),
                ExecutionEvent::RollbackStarted { tasks } => format!("rollback:{}", tasks.join(",")),
                ExecutionEvent::TaskCompensated { task_id } => format!("compensated:{task_id}"),
                ExecutionEvent::CompensationMissing { task_id } => format!("missing:{task_id}"),
                ExecutionEvent::CompensationFailed { task_id, .. } => format!("compensation_failed:{task_id}"),
                ExecutionEvent::RunCompleted { success, .. } => format!("completed:{success}"),
            });
        }
        assert_eq!(
            kinds,
            vec![
                "run_started:3",
                "started:A",
                "succeeded:A",
                "skipped:B",
                "started:C",
                "failed:C",
                "rollback:A",
                "compensated:A",
                "completed:false",
            ]
        );
    }

    #[tokio::test]
    async fn closed_event_receiver_does_not_fail_the_run() {
        let (sender, receiver) = unbounded_channel();
        drop(receiver);
        let report = rollback_on()
            .with_event_sink(sender)
            .execute(&[step("A")], WorkflowContext::new(()))
            .await
            .expect("run");
        assert!(report.result.success);
    }
}
