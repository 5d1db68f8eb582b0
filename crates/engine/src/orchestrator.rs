//! Orchestrator: resolves services, builds the context, runs a command's tasks
//! through the graph resolver and executor, and drives the command's hooks.

use relay_types::{ExecutionEvent, ExecutionResult};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{Instrument, error, info, info_span, warn};

use crate::{
    command::{Command, CommandRegistry},
    config::EngineConfig,
    context::WorkflowContext,
    error::WorkflowError,
    executor::Executor,
    graph,
    services::ServiceRegistry,
};

/// Runs commands against an explicit service registry.
#[derive(Debug)]
pub struct Orchestrator<C> {
    services: ServiceRegistry,
    commands: CommandRegistry<C>,
    config: EngineConfig,
    events: Option<UnboundedSender<ExecutionEvent>>,
}

impl<C> Orchestrator<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(services: ServiceRegistry, config: EngineConfig) -> Self {
        Self {
            services,
            commands: CommandRegistry::new(),
            config,
            events: None,
        }
    }

    pub fn with_commands(mut self, commands: CommandRegistry<C>) -> Self {
        self.commands = commands;
        self
    }

    /// Forwards executor lifecycle events to `sender`.
    pub fn with_event_sink(mut self, sender: UnboundedSender<ExecutionEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn commands(&self) -> &CommandRegistry<C> {
        &self.commands
    }

    /// Looks up `name` in the command registry and runs it.
    pub async fn run_named(&self, name: &str, config: C) -> Result<ExecutionResult, WorkflowError> {
        let command = self.commands.get(name)?;
        self.run(command.as_ref(), config).await
    }

    /// Runs `command` with the per-run `config`.
    ///
    /// Graph problems are reported before any task executes. Every error, whatever
    /// its stage, is passed to the command's `on_error` hook before being returned.
    pub async fn run(&self, command: &dyn Command<C>, config: C) -> Result<ExecutionResult, WorkflowError> {
        let span = info_span!("workflow", command = %command.name());
        async move {
            match self.run_stages(command, config).await {
                Ok(result) => Ok(result),
                Err(failure) => {
                    if let Err(hook_error) = command.on_error(&failure).await {
                        error!(error = %format!("{hook_error:#}"), "on_error hook failed");
                    }
                    Err(failure)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_stages(&self, command: &dyn Command<C>, config: C) -> Result<ExecutionResult, WorkflowError> {
        let services = self.services.resolve(command.required_services())?;
        let context = WorkflowContext::with_services(config, services);

        command
            .before_execute(&context)
            .await
            .map_err(|error| hook_error("before_execute", error, None))?;

        let tasks = command.build_tasks(&context).await.map_err(|error| WorkflowError::BuildTasks {
            command: command.name().to_string(),
            message: format!("{error:#}"),
        })?;

        let (ordered, validation) = graph::order_tasks(tasks)?;
        for warning in &validation.warnings {
            warn!("{warning}");
        }
        if self.config.treat_warnings_as_errors && !validation.warnings.is_empty() {
            return Err(WorkflowError::validation(validation.warnings));
        }
        if self.config.emit_statistics {
            let stats = graph::statistics(&ordered);
            info!(
                tasks = stats.total_tasks,
                edges = stats.total_edges,
                roots = stats.root_tasks.len(),
                max_depth = stats.max_depth,
                "task graph ready"
            );
        }

        let mut executor = Executor::new(self.config.executor_options());
        if let Some(sender) = &self.events {
            executor = executor.with_event_sink(sender.clone());
        }
        let report = executor.execute(&ordered, context).await?;

        if let Err(error) = command.after_execute(&report.result).await {
            return Err(hook_error("after_execute", error, Some(report.result)));
        }
        Ok(report.result)
    }
}

fn hook_error(hook: &'static str, error: anyhow::Error, result: Option<ExecutionResult>) -> WorkflowError {
    WorkflowError::Hook {
        hook,
        message: format!("{error:#}"),
        result: result.map(Box::new),
    }
}
