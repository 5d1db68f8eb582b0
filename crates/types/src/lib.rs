//! Shared type definitions for the Relay workflow engine and CLI.
//!
//! Everything in this crate is plain, serializable data: task metadata and skip
//! decisions consumed by the engine, graph diagnostics produced by the resolver,
//! and the execution audit trail returned once per run.

pub mod execution;
pub mod graph;
pub mod task;

pub use execution::{ExecutionEvent, ExecutionResult, RollbackFailure};
pub use graph::{FanStatistic, GraphDocument, GraphStatistics, GraphValidationResult};
pub use task::{SkipDecision, TaskMetadata};
