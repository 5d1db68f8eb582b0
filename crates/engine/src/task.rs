//! The task contract.
//!
//! A [`Task`] is a plain record of metadata plus function values: an optional
//! skip condition, an execute function, and an optional compensation. Execute
//! receives the current context and returns a forked one; compensation receives
//! the context at rollback time.

use std::{fmt, future::Future, sync::Arc};

use futures_util::future::BoxFuture;
use relay_types::{SkipDecision, TaskMetadata};

use crate::{context::WorkflowContext, skip::SkipCondition};

/// Boxed future returned by task functions.
pub type TaskFuture<T> = BoxFuture<'static, anyhow::Result<T>>;

type ExecuteFn<C> = Arc<dyn Fn(WorkflowContext<C>) -> TaskFuture<WorkflowContext<C>> + Send + Sync>;
type UndoFn<C> = Arc<dyn Fn(WorkflowContext<C>) -> TaskFuture<()> + Send + Sync>;

/// A single named unit of work. Immutable once built.
pub struct Task<C> {
    meta: TaskMetadata,
    skip: Option<Arc<dyn SkipCondition<C>>>,
    execute: ExecuteFn<C>,
    undo: Option<UndoFn<C>>,
}

impl<C> Task<C>
where
    C: Send + Sync + 'static,
{
    /// Creates a task from its id, description, and execute function.
    ///
    /// ```rust
    /// use relay_engine::{Task, WorkflowContext};
    /// use serde_json::json;
    ///
    /// let bump = Task::new("bump", "Bump the package version", |context: WorkflowContext<()>| async move {
    ///     Ok(context.fork("version", json!("1.3.0")))
    /// });
    /// let commit = Task::new("commit", "Commit the release", |context: WorkflowContext<()>| async move { Ok(context) })
    ///     .depends_on(["bump"]);
    ///
    /// assert_eq!(commit.meta().dependencies, vec!["bump".to_string()]);
    /// assert!(!bump.has_undo());
    /// ```
    pub fn new<F, Fut>(id: impl Into<String>, description: impl Into<String>, execute: F) -> Self
    where
        F: Fn(WorkflowContext<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<WorkflowContext<C>>> + Send + 'static,
    {
        Self {
            meta: TaskMetadata::new(id, description),
            skip: None,
            execute: Arc::new(move |context: WorkflowContext<C>| -> TaskFuture<WorkflowContext<C>> { Box::pin(execute(context)) }),
            undo: None,
        }
    }

    /// Declares the ids this task depends on.
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Attaches a skip condition, evaluated right before execution.
    pub fn skip_when(mut self, condition: impl SkipCondition<C> + 'static) -> Self {
        self.skip = Some(Arc::new(condition));
        self
    }

    /// Registers a compensation invoked during rollback.
    pub fn with_undo<F, Fut>(mut self, undo: F) -> Self
    where
        F: Fn(WorkflowContext<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.undo = Some(Arc::new(move |context: WorkflowContext<C>| -> TaskFuture<()> { Box::pin(undo(context)) }));
        self
    }

    /// Runs the execute function against `context`.
    pub async fn execute(&self, context: &WorkflowContext<C>) -> anyhow::Result<WorkflowContext<C>> {
        (self.execute)(context.clone()).await
    }

    /// Runs the compensation, or returns `None` when the task has none.
    pub async fn undo(&self, context: &WorkflowContext<C>) -> Option<anyhow::Result<()>> {
        let undo = self.undo.as_ref()?;
        Some(undo(context.clone()).await)
    }
}

impl<C> Task<C> {
    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn meta(&self) -> &TaskMetadata {
        &self.meta
    }

    pub fn has_undo(&self) -> bool {
        self.undo.is_some()
    }

    /// Evaluates the skip condition, or returns `None` when the task always runs.
    pub fn should_skip(&self, context: &WorkflowContext<C>) -> Option<SkipDecision> {
        self.skip.as_ref().map(|condition| condition.evaluate(context))
    }
}

impl<C> Clone for Task<C> {
    fn clone(&self) -> Self {
        Self {
            meta: self.meta.clone(),
            skip: self.skip.clone(),
            execute: Arc::clone(&self.execute),
            undo: self.undo.clone(),
        }
    }
}

impl<C> fmt::Debug for Task<C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Task")
            .field("meta", &self.meta)
            .field("has_skip_condition", &self.skip.is_some())
            .field("has_undo", &self.undo.is_some())
            .finish()
    }
}
