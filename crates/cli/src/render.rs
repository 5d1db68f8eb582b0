//! Text and JSON renderings of graph diagnostics and run results.

use relay_engine::{ExecutionEvent, ExecutionResult, GraphDocument, GraphStatistics, GraphValidationResult};
use serde_json::{Value, json};

fn title(document: &GraphDocument) -> &str {
    document.name.as_deref().unwrap_or("task graph")
}

pub fn validation_text(document: &GraphDocument, validation: &GraphValidationResult) -> String {
    let mut lines = Vec::new();
    let verdict = if validation.is_valid { "valid" } else { "invalid" };
    lines.push(format!("{} ({} tasks): {verdict}", title(document), document.tasks.len()));
    for error in &validation.errors {
        lines.push(format!("  error: {error}"));
    }
    for warning in &validation.warnings {
        lines.push(format!("  warning: {warning}"));
    }
    if validation.is_valid {
        lines.push(format!("  order: {}", validation.execution_order.join(" → ")));
    }
    lines.join("\n")
}

pub fn plan_json(document: &GraphDocument, validation: &GraphValidationResult, statistics: &GraphStatistics) -> Value {
    let steps: Vec<Value> = validation
        .execution_order
        .iter()
        .map(|task_id| {
            let description = document
                .tasks
                .iter()
                .find(|task| &task.id == task_id)
                .map(|task| task.description.as_str())
                .unwrap_or_default();
            json!({
                "id": task_id,
                "description": description,
                "depth": validation.depth_map.get(task_id).copied().unwrap_or_default(),
            })
        })
        .collect();
    json!({
        "name": document.name,
        "steps": steps,
        "warnings": validation.warnings,
        "statistics": statistics,
    })
}

pub fn plan_text(document: &GraphDocument, validation: &GraphValidationResult, statistics: &GraphStatistics) -> String {
    let mut lines = vec![format!("Plan for {}:", title(document))];
    for (position, task_id) in validation.execution_order.iter().enumerate() {
        let depth = validation.depth_map.get(task_id).copied().unwrap_or_default();
        let description = document
            .tasks
            .iter()
            .find(|task| &task.id == task_id)
            .map(|task| task.description.as_str())
            .unwrap_or_default();
        lines.push(format!("{:>3}. {}{task_id}  {description}", position + 1, "  ".repeat(depth)));
    }
    lines.push(String::new());
    lines.push(statistics_text(statistics));
    lines.join("\n")
}

pub fn statistics_text(statistics: &GraphStatistics) -> String {
    let fan = |label: &str, value: &Option<relay_types::FanStatistic>| match value {
        Some(fan) => format!("{label}: {} ({})", fan.task_ids.join(", "), fan.count),
        None => format!("{label}: -"),
    };
    [
        format!("tasks: {}", statistics.total_tasks),
        format!("edges: {}", statistics.total_edges),
        format!("roots: {}", statistics.root_tasks.join(", ")),
        format!("leaves: {}", statistics.leaf_tasks.join(", ")),
        format!("average dependencies: {:.2}", statistics.average_dependencies),
        format!("max depth: {}", statistics.max_depth),
        fan("max fan-in", &statistics.max_fan_in),
        fan("max fan-out", &statistics.max_fan_out),
    ]
    .join("\n")
}

pub fn event_line(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted { total_tasks, .. } => format!("▶ run started ({total_tasks} tasks)"),
        ExecutionEvent::TaskStarted { index, task_id, .. } => format!("  [{}] {task_id}: running", index + 1),
        ExecutionEvent::TaskSucceeded { task_id, duration_ms } => format!("  ✓ {task_id} ({duration_ms} ms)"),
        ExecutionEvent::TaskSkipped { task_id, reason, jumped_to } => {
            let reason = reason.as_deref().unwrap_or("skipped");
            match jumped_to {
                Some(target) => format!("  ↷ {task_id}: {reason} (jump to {target})"),
                None => format!("  ↷ {task_id}: {reason}"),
            }
        }
        ExecutionEvent::TaskFailed { task_id, message } => format!("  ✗ {task_id}: {message}"),
        ExecutionEvent::RollbackStarted { tasks } => format!("⟲ rolling back: {}", tasks.join(", ")),
        ExecutionEvent::TaskCompensated { task_id } => format!("  ⟲ {task_id}: compensated"),
        ExecutionEvent::CompensationMissing { task_id } => format!("  ⟲ {task_id}: no compensation"),
        ExecutionEvent::CompensationFailed { task_id, message } => format!("  ⟲ {task_id}: compensation failed: {message}"),
        ExecutionEvent::RunCompleted { success, .. } => {
            format!("■ run {}", if *success { "succeeded" } else { "failed" })
        }
    }
}

pub fn result_text(result: &ExecutionResult) -> String {
    let mut lines = vec![
        format!("executed: {}", result.executed_tasks.join(", ")),
        format!("skipped: {}", result.skipped_tasks.join(", ")),
    ];
    if let Some(failed_task) = &result.failed_task {
        lines.push(format!("failed: {failed_task} ({})", result.error.as_deref().unwrap_or("unknown error")));
        let rollback = if result.rollback_executed {
            "completed"
        } else if result.rollback_attempted() {
            "incomplete"
        } else {
            "not run"
        };
        lines.push(format!("rollback: {rollback}"));
        for failure in &result.rollback_errors {
            lines.push(format!("  {}: {}", failure.task_id, failure.message));
        }
    }
    lines.push(format!("duration: {} ms", result.duration_ms));
    lines.join("\n")
}
