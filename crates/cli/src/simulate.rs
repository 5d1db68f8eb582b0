//! Dry runs of a task graph document through the orchestrator.
//!
//! Every task is a placeholder that records its id in the context and registers a
//! no-op compensation, so a simulated failure shows which tasks would be rolled back.

use anyhow::anyhow;
use async_trait::async_trait;
use relay_engine::{
    Command, EngineConfig, ExecutionEvent, ExecutionResult, GraphDocument, Orchestrator, ServiceRegistry, Task, TaskMetadata, WorkflowContext,
    WorkflowError, skip::config_flag,
};
use serde_json::json;
use tokio::sync::mpsc::unbounded_channel;
use tracing::warn;

/// Per-run settings of a simulation.
#[derive(Debug, Clone, Default)]
pub struct SimulationConfig {
    /// Task that fails when it runs.
    pub fail: Option<String>,
    /// Tasks skipped by their skip condition.
    pub skip: Vec<String>,
}

struct DocumentCommand {
    document: GraphDocument,
}

#[async_trait]
impl Command<SimulationConfig> for DocumentCommand {
    fn name(&self) -> &str {
        self.document.name.as_deref().unwrap_or("simulation")
    }

    async fn build_tasks(&self, _context: &WorkflowContext<SimulationConfig>) -> anyhow::Result<Vec<Task<SimulationConfig>>> {
        Ok(self.document.tasks.iter().map(placeholder_task).collect())
    }

    async fn on_error(&self, error: &WorkflowError) -> anyhow::Result<()> {
        warn!(error = %error, "simulation failed");
        Ok(())
    }
}

fn placeholder_task(meta: &TaskMetadata) -> Task<SimulationConfig> {
    let task_id = meta.id.clone();
    let skipped_id = meta.id.clone();
    Task::new(meta.id.clone(), meta.description.clone(), move |context: WorkflowContext<SimulationConfig>| {
        let task_id = task_id.clone();
        async move {
            if context.config().fail.as_deref() == Some(task_id.as_str()) {
                return Err(anyhow!("simulated failure in '{task_id}'"));
            }
            Ok(context.fork(task_id, json!("done")))
        }
    })
    .depends_on(meta.dependencies.clone())
    .skip_when(config_flag("skipped on request", move |config: &SimulationConfig| config.skip.contains(&skipped_id)))
    .with_undo(|_context: WorkflowContext<SimulationConfig>| async move { Ok(()) })
}

/// Runs `document` with placeholder tasks and collects the emitted events.
pub async fn simulate(
    document: GraphDocument,
    engine_config: EngineConfig,
    config: SimulationConfig,
) -> (Result<ExecutionResult, WorkflowError>, Vec<ExecutionEvent>) {
    let (sender, mut receiver) = unbounded_channel();
    let orchestrator = Orchestrator::new(ServiceRegistry::new(), engine_config).with_event_sink(sender);
    let command = DocumentCommand { document };
    let outcome = orchestrator.run(&command, config).await;
    drop(orchestrator);

    let mut events = Vec::new();
    while let Some(event) = receiver.recv().await {
        events.push(event);
    }
    (outcome, events)
}
