//! # Relay Engine
//!
//! The Relay engine orders and runs command workflows. A command builds a list of
//! [`Task`]s with declared dependencies; the engine validates the graph, runs the
//! tasks one at a time against an immutable [`WorkflowContext`], honours per-task
//! skip conditions, and compensates completed tasks in reverse order when one fails.
//!
//! ## Usage
//!
//! ```rust
//! use relay_engine::{Executor, ExecutorOptions, Task, WorkflowContext, graph};
//! use serde_json::json;
//!
//! # tokio::runtime::Runtime::new()?.block_on(async {
//! let tasks = vec![
//!     Task::new("tag", "Create the release tag", |context: WorkflowContext<()>| async move {
//!         let version = context.get_as::<String>("version")?;
//!         Ok(context.fork("tag", json!(format!("v{version}"))))
//!     })
//!     .depends_on(["bump"]),
//!     Task::new("bump", "Bump the version", |context: WorkflowContext<()>| async move {
//!         Ok(context.fork("version", json!("1.4.0")))
//!     }),
//! ];
//!
//! let (ordered, _validation) = graph::order_tasks(tasks)?;
//! let report = Executor::new(ExecutorOptions::default())
//!     .execute(&ordered, WorkflowContext::new(()))
//!     .await?;
//! assert_eq!(report.result.executed_tasks, vec!["bump", "tag"]);
//! assert_eq!(report.context.get("tag")?, &json!("v1.4.0"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # })?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`graph`**: validation, cycle detection, topological ordering, statistics
//! - **`task`** / **`skip`**: the unit of work and its skip conditions
//! - **`context`**: the forking workflow context
//! - **`executor`**: sequential execution with rollback
//! - **`orchestrator`** / **`command`** / **`services`**: the caller-facing runner

use std::{fs, path::Path};

use anyhow::{Context, Result};

pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod graph;
pub mod orchestrator;
pub mod services;
pub mod skip;
pub mod task;

pub use command::{Command, CommandRegistry};
pub use config::{EngineConfig, ExecutorOptions};
pub use context::{ContextData, WorkflowContext};
pub use error::{CycleError, WorkflowError};
pub use executor::{ExecutionReport, Executor};
pub use orchestrator::Orchestrator;
pub use relay_types::{
    ExecutionEvent, ExecutionResult, GraphDocument, GraphStatistics, GraphValidationResult, RollbackFailure, SkipDecision, TaskMetadata,
};
pub use services::{ServiceRegistry, Services};
pub use skip::{SkipCondition, SkipConditionExt};
pub use task::{Task, TaskFuture};

/// Loads a task graph document from YAML or JSON.
///
/// `.json` files are parsed as JSON; anything else is parsed as YAML.
///
/// ```rust
/// let temp_dir = tempfile::tempdir()?;
/// let path = temp_dir.path().join("release.yaml");
/// std::fs::write(&path, "name: release\ntasks:\n  - id: bump\n    description: Bump version\n")?;
///
/// let document = relay_engine::load_graph_document(&path)?;
/// assert_eq!(document.name.as_deref(), Some("release"));
/// assert_eq!(document.tasks.len(), 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn load_graph_document(file_path: impl AsRef<Path>) -> Result<GraphDocument> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read task graph file: {}", file_path.display()))?;

    let is_json = file_path.extension().and_then(|extension| extension.to_str()) == Some("json");
    let document = if is_json {
        serde_json::from_str(&content).with_context(|| format!("invalid JSON task graph in {}", file_path.display()))?
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("invalid YAML task graph in {}", file_path.display()))?
    };
    Ok(document)
}
