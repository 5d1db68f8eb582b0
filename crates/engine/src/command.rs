//! Commands: named task builders with lifecycle hooks.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use indexmap::IndexMap;
use relay_types::ExecutionResult;

use crate::{context::WorkflowContext, error::WorkflowError, task::Task};

/// A workflow the orchestrator can run.
///
/// Commands are data: `build_tasks` returns the task list, and the orchestrator
/// decides how it runs. The hooks default to no-ops.
#[async_trait]
pub trait Command<C>: Send + Sync
where
    C: Send + Sync + 'static,
{
    /// Name used for lookup in a [`CommandRegistry`].
    fn name(&self) -> &str;

    /// Service keys resolved before the context is built.
    fn required_services(&self) -> Vec<String> {
        Vec::new()
    }

    /// Produces the tasks for this run.
    async fn build_tasks(&self, context: &WorkflowContext<C>) -> anyhow::Result<Vec<Task<C>>>;

    async fn before_execute(&self, _context: &WorkflowContext<C>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_execute(&self, _result: &ExecutionResult) -> anyhow::Result<()> {
        Ok(())
    }

    /// Receives the raw error before it is returned to the caller.
    async fn on_error(&self, _error: &WorkflowError) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Commands by name. Built per orchestrator, never global.
pub struct CommandRegistry<C> {
    commands: IndexMap<String, Arc<dyn Command<C>>>,
}

impl<C> CommandRegistry<C>
where
    C: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self { commands: IndexMap::new() }
    }

    /// Registers `command` under its name, replacing any earlier one.
    pub fn register(&mut self, command: impl Command<C> + 'static) -> &mut Self {
        let command: Arc<dyn Command<C>> = Arc::new(command);
        self.commands.insert(command.name().to_string(), command);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Command<C>>, WorkflowError> {
        self.commands
            .get(name)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownCommand { name: name.to_string() })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl<C> Default for CommandRegistry<C>
where
    C: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for CommandRegistry<C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_list().entries(self.commands.keys()).finish()
    }
}
