//! Task graph validation and ordering.
//!
//! The resolver works over anything that exposes [`TaskMetadata`] (see [`GraphNode`]),
//! so the same checks run on live [`Task`]s and on metadata loaded from a file.
//!
//! - Duplicate ids and dependencies on unknown ids are collected as errors; the scan
//!   never stops at the first one. The first declaration of a duplicated id is the one
//!   kept in the graph.
//! - Cycles are found with a depth-first search over the dependency edges and reported
//!   as a trace (`a → b → a`).
//! - When no errors were recorded, the execution order comes from Kahn's algorithm.
//!   Among tasks that become ready at the same time, the one declared first runs first.
//!   A residual in-degree after Kahn's pass is reported as a cycle as well.
//! - Depth (longest path from a root) is diagnostic only.

use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};

use indexmap::IndexMap;
use relay_types::{FanStatistic, GraphStatistics, GraphValidationResult, TaskMetadata};
use tracing::debug;

use crate::{
    error::{CycleError, WorkflowError},
    task::Task,
};

/// Anything that can take part in a task graph.
pub trait GraphNode {
    fn metadata(&self) -> &TaskMetadata;
}

impl GraphNode for TaskMetadata {
    fn metadata(&self) -> &TaskMetadata {
        self
    }
}

impl<C> GraphNode for Task<C> {
    fn metadata(&self) -> &TaskMetadata {
        self.meta()
    }
}

impl<T: GraphNode + ?Sized> GraphNode for &T {
    fn metadata(&self) -> &TaskMetadata {
        (**self).metadata()
    }
}

impl<T: GraphNode + ?Sized> GraphNode for Arc<T> {
    fn metadata(&self) -> &TaskMetadata {
        (**self).metadata()
    }
}

/// Validates a task set and computes its execution order and depths.
///
/// ```rust
/// use relay_engine::graph;
/// use relay_types::TaskMetadata;
///
/// let tasks = vec![
///     TaskMetadata::new("commit", "Commit").with_dependencies(["bump"]),
///     TaskMetadata::new("bump", "Bump version"),
/// ];
/// let result = graph::validate(&tasks);
/// assert!(result.is_valid);
/// assert_eq!(result.execution_order, vec!["bump", "commit"]);
/// assert_eq!(result.depth_map["commit"], 1);
/// ```
pub fn validate<N: GraphNode>(nodes: &[N]) -> GraphValidationResult {
    let graph = DependencyGraph::build(nodes);
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for duplicate in &graph.duplicates {
        errors.push(format!("duplicate task id: '{duplicate}'"));
    }
    for (task_id, dependency) in graph.missing_dependencies() {
        errors.push(format!("task '{task_id}' depends on unknown task '{dependency}'"));
    }
    for meta in graph.nodes.values() {
        if let Some(warning) = missing_description(meta) {
            warnings.push(warning);
        }
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        for dependency in &meta.dependencies {
            if !seen.insert(dependency.as_str()) && reported.insert(dependency.as_str()) {
                warnings.push(format!("task '{}' lists dependency '{dependency}' more than once", meta.id));
            }
        }
    }
    for trace in graph.find_cycles() {
        errors.push(format!("{CYCLE_TRACE_PREFIX}{trace}"));
    }

    let mut execution_order = Vec::new();
    let mut depth_map = IndexMap::new();
    if errors.is_empty() {
        match graph.kahn_order() {
            Ok(order) => {
                depth_map = graph.depths(&order);
                execution_order = order.iter().map(|&index| graph.id(index).to_string()).collect();
            }
            Err(residual) => errors.push(format!("{CYCLE_RESIDUAL_PREFIX}{}", graph.join_ids(&residual))),
        }
    }

    debug!(
        tasks = graph.nodes.len(),
        errors = errors.len(),
        warnings = warnings.len(),
        "validated task graph"
    );

    GraphValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        execution_order,
        depth_map,
    }
}

/// Orders task ids so every dependency precedes its dependents.
///
/// Dependencies on unknown ids are ignored here ([`validate`] reports them) and
/// duplicated ids appear once. The result is deterministic for a given input order.
pub fn topological_sort<N: GraphNode>(nodes: &[N]) -> Result<Vec<String>, CycleError> {
    let graph = DependencyGraph::build(nodes);
    match graph.kahn_order() {
        Ok(order) => Ok(order.iter().map(|&index| graph.id(index).to_string()).collect()),
        Err(residual) => {
            let path = graph
                .find_cycles()
                .into_iter()
                .next()
                .unwrap_or_else(|| graph.join_ids(&residual));
            Err(CycleError::new(path))
        }
    }
}

/// Computes diagnostic statistics for a task set.
pub fn statistics<N: GraphNode>(nodes: &[N]) -> GraphStatistics {
    let graph = DependencyGraph::build(nodes);
    let total_tasks = graph.nodes.len();
    let total_edges: usize = graph.edges.iter().map(Vec::len).sum();

    let mut fan_in = vec![0usize; total_tasks];
    for dependencies in &graph.edges {
        for &dependency in dependencies {
            fan_in[dependency] += 1;
        }
    }
    let fan_out: Vec<usize> = graph.edges.iter().map(Vec::len).collect();

    let root_tasks = (0..total_tasks)
        .filter(|&index| graph.edges[index].is_empty())
        .map(|index| graph.id(index).to_string())
        .collect();
    let leaf_tasks = (0..total_tasks)
        .filter(|&index| fan_in[index] == 0)
        .map(|index| graph.id(index).to_string())
        .collect();

    let max_depth = graph
        .kahn_order()
        .map(|order| graph.depths(&order).values().copied().max().unwrap_or(0))
        .unwrap_or(0);

    let average_dependencies = if total_tasks == 0 {
        0.0
    } else {
        total_edges as f64 / total_tasks as f64
    };

    GraphStatistics {
        total_tasks,
        total_edges,
        root_tasks,
        leaf_tasks,
        average_dependencies,
        max_depth,
        max_fan_in: graph.max_fan(&fan_in),
        max_fan_out: graph.max_fan(&fan_out),
    }
}

/// Validates `tasks` and returns them in execution order.
///
/// Fails with [`WorkflowError::Cycle`] when the only problems are cycles, and with
/// [`WorkflowError::Validation`] otherwise. A task without a description cannot be
/// run: it is a warning in [`validate`] diagnostics but an error here. Remaining
/// warnings are returned in the result for the caller to act on.
pub fn order_tasks<C>(tasks: Vec<Task<C>>) -> Result<(Vec<Task<C>>, GraphValidationResult), WorkflowError> {
    let validation = validate(&tasks);
    let undescribed: Vec<String> = tasks.iter().filter_map(|task| missing_description(task.meta())).collect();
    if !validation.is_valid || !undescribed.is_empty() {
        let mut rejected = validation;
        rejected.errors.extend(undescribed);
        return Err(graph_error(&rejected));
    }

    let mut by_id: IndexMap<String, Task<C>> = IndexMap::with_capacity(tasks.len());
    for task in tasks {
        by_id.entry(task.id().to_string()).or_insert(task);
    }
    let ordered = validation
        .execution_order
        .iter()
        .filter_map(|task_id| by_id.swap_remove(task_id))
        .collect();
    Ok((ordered, validation))
}

/// Converts an invalid validation result into the matching error.
pub fn graph_error(validation: &GraphValidationResult) -> WorkflowError {
    let cycle_paths: Vec<&str> = validation.errors.iter().filter_map(|error| cycle_path(error)).collect();
    if !cycle_paths.is_empty() && cycle_paths.len() == validation.errors.len() {
        WorkflowError::Cycle {
            path: cycle_paths.join("; "),
        }
    } else {
        WorkflowError::validation(validation.errors.clone())
    }
}

fn missing_description(meta: &TaskMetadata) -> Option<String> {
    meta.description
        .trim()
        .is_empty()
        .then(|| format!("task '{}' has no description", meta.id))
}

const CYCLE_TRACE_PREFIX: &str = "circular dependency detected: ";
const CYCLE_RESIDUAL_PREFIX: &str = "circular dependency detected among: ";

fn cycle_path(error: &str) -> Option<&str> {
    error
        .strip_prefix(CYCLE_TRACE_PREFIX)
        .or_else(|| error.strip_prefix(CYCLE_RESIDUAL_PREFIX))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    OnStack,
    Done,
}

/// Index-based view of a task set. The first declaration of each id wins.
struct DependencyGraph<'a> {
    nodes: IndexMap<&'a str, &'a TaskMetadata>,
    /// Known, de-duplicated dependency indices per node.
    edges: Vec<Vec<usize>>,
    duplicates: Vec<&'a str>,
}

impl<'a> DependencyGraph<'a> {
    fn build<N: GraphNode>(nodes: &'a [N]) -> Self {
        let mut lookup: IndexMap<&'a str, &'a TaskMetadata> = IndexMap::with_capacity(nodes.len());
        let mut duplicates = Vec::new();
        for node in nodes {
            let meta = node.metadata();
            if lookup.contains_key(meta.id.as_str()) {
                duplicates.push(meta.id.as_str());
                continue;
            }
            lookup.insert(meta.id.as_str(), meta);
        }

        let edges: Vec<Vec<usize>> = lookup
            .values()
            .map(|meta| {
                let mut seen = HashSet::new();
                meta.dependencies
                    .iter()
                    .filter_map(|dependency| lookup.get_index_of(dependency.as_str()))
                    .filter(|index| seen.insert(*index))
                    .collect()
            })
            .collect();

        Self {
            nodes: lookup,
            edges,
            duplicates,
        }
    }

    fn id(&self, index: usize) -> &'a str {
        self.nodes.get_index(index).map(|(id, _)| *id).unwrap_or_default()
    }

    fn join_ids(&self, indices: &[usize]) -> String {
        indices.iter().map(|&index| self.id(index)).collect::<Vec<_>>().join(", ")
    }

    fn missing_dependencies(&self) -> Vec<(&'a str, &'a str)> {
        let mut missing = Vec::new();
        for meta in self.nodes.values() {
            let mut seen = HashSet::new();
            for dependency in &meta.dependencies {
                if !self.nodes.contains_key(dependency.as_str()) && seen.insert(dependency.as_str()) {
                    missing.push((meta.id.as_str(), dependency.as_str()));
                }
            }
        }
        missing
    }

    /// Depth-first search for cycles, one trace per back edge found.
    fn find_cycles(&self) -> Vec<String> {
        let mut state = vec![VisitState::Unvisited; self.nodes.len()];
        let mut stack = Vec::new();
        let mut cycles = Vec::new();
        for start in 0..self.nodes.len() {
            if state[start] == VisitState::Unvisited {
                self.visit(start, &mut state, &mut stack, &mut cycles);
            }
        }
        cycles
    }

    fn visit(&self, index: usize, state: &mut [VisitState], stack: &mut Vec<usize>, cycles: &mut Vec<String>) {
        state[index] = VisitState::OnStack;
        stack.push(index);

        for &dependency in &self.edges[index] {
            match state[dependency] {
                VisitState::Unvisited => self.visit(dependency, state, stack, cycles),
                VisitState::OnStack => {
                    if let Some(position) = stack.iter().position(|&entry| entry == dependency) {
                        let mut trace: Vec<&str> = stack[position..].iter().map(|&entry| self.id(entry)).collect();
                        trace.push(self.id(dependency));
                        cycles.push(trace.join(" → "));
                    }
                }
                VisitState::Done => {}
            }
        }

        stack.pop();
        state[index] = VisitState::Done;
    }

    /// Kahn's algorithm; ready nodes are taken in declaration order.
    ///
    /// The ready set is a priority queue on declaration index rather than a FIFO:
    /// whenever several tasks are ready, the one declared first runs first, no
    /// matter when it became ready. Depths are computed over the same order.
    ///
    /// Returns the indices left with a positive in-degree on failure.
    fn kahn_order(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degrees: Vec<usize> = self.edges.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (index, dependencies) in self.edges.iter().enumerate() {
            for &dependency in dependencies {
                dependents[dependency].push(index);
            }
        }

        let mut ready: BTreeSet<usize> = (0..self.nodes.len()).filter(|&index| in_degrees[index] == 0).collect();
        let mut ordered = Vec::with_capacity(self.nodes.len());
        while let Some(index) = ready.pop_first() {
            ordered.push(index);
            for &child in &dependents[index] {
                in_degrees[child] -= 1;
                if in_degrees[child] == 0 {
                    ready.insert(child);
                }
            }
        }

        if ordered.len() != self.nodes.len() {
            let remaining = (0..self.nodes.len()).filter(|&index| in_degrees[index] > 0).collect();
            return Err(remaining);
        }
        Ok(ordered)
    }

    /// Longest-path depth per node, keyed in the given (topological) order.
    fn depths(&self, order: &[usize]) -> IndexMap<String, usize> {
        let mut depth = vec![0usize; self.nodes.len()];
        for &index in order {
            depth[index] = self.edges[index]
                .iter()
                .map(|&dependency| depth[dependency] + 1)
                .max()
                .unwrap_or(0);
        }
        order.iter().map(|&index| (self.id(index).to_string(), depth[index])).collect()
    }

    fn max_fan(&self, counts: &[usize]) -> Option<FanStatistic> {
        let count = counts.iter().copied().max().filter(|&max| max > 0)?;
        let task_ids = counts
            .iter()
            .enumerate()
            .filter(|(_, value)| **value == count)
            .map(|(index, _)| self.id(index).to_string())
            .collect();
        Some(FanStatistic { task_ids, count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str, dependencies: &[&str]) -> TaskMetadata {
        TaskMetadata::new(id, format!("task {id}")).with_dependencies(dependencies.iter().copied())
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|entry| entry == id).expect("id present in order")
    }

    #[test]
    fn order_respects_dependencies_even_when_declared_out_of_order() {
        let tasks = vec![meta("second", &["first"]), meta("first", &[])];
        let result = validate(&tasks);
        assert!(result.is_valid, "errors: {:?}", result.errors);
        assert_eq!(result.execution_order, vec!["first", "second"]);
    }

    #[test]
    fn every_dependency_precedes_its_dependent() {
        let tasks = vec![
            meta("publish", &["push", "changelog"]),
            meta("push", &["tag"]),
            meta("tag", &["commit"]),
            meta("commit", &["bump", "changelog"]),
            meta("changelog", &["bump"]),
            meta("bump", &[]),
        ];
        let result = validate(&tasks);
        assert!(result.is_valid);
        assert_eq!(result.execution_order.len(), tasks.len());
        for task in &tasks {
            for dependency in &task.dependencies {
                assert!(position(&result.execution_order, dependency) < position(&result.execution_order, &task.id));
            }
        }
        assert_eq!(result.depth_map["bump"], 0);
        assert_eq!(result.depth_map["commit"], 2);
        assert_eq!(result.depth_map["publish"], 5);
    }

    #[test]
    fn ready_ties_follow_declaration_order() {
        let tasks = vec![meta("c", &["root"]), meta("root", &[]), meta("b", &["root"]), meta("a", &[])];
        let order = topological_sort(&tasks).expect("acyclic");
        assert_eq!(order, vec!["root", "c", "b", "a"].into_iter().map(String::from).collect::<Vec<_>>());
        assert_eq!(topological_sort(&tasks).expect("acyclic"), order);
    }

    #[test]
    fn unknown_dependencies_are_all_reported() {
        let tasks = vec![meta("only", &["missing"]), meta("other", &["gone", "missing"])];
        let result = validate(&tasks);
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|error| error.contains("'only' depends on unknown task 'missing'")));
        assert!(result.errors.iter().any(|error| error.contains("'other' depends on unknown task 'gone'")));
        assert!(result.errors.iter().any(|error| error.contains("'other' depends on unknown task 'missing'")));
        assert!(result.execution_order.is_empty());
    }

    #[test]
    fn two_node_cycle_is_traced() {
        let tasks = vec![meta("a", &["b"]), meta("b", &["a"])];
        let result = validate(&tasks);
        assert!(!result.is_valid);
        assert!(result.execution_order.is_empty());
        let cycle = result
            .errors
            .iter()
            .find(|error| error.contains("circular dependency"))
            .expect("cycle error");
        assert!(cycle.contains("a → b → a"), "unexpected trace: {cycle}");

        let error = topological_sort(&tasks).expect_err("cycle");
        assert_eq!(error.path, "a → b → a");
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let result = validate(&[meta("loop", &["loop"])]);
        assert_eq!(result.errors, vec!["circular dependency detected: loop → loop".to_string()]);
    }

    #[test]
    fn longer_cycle_reports_full_path() {
        let tasks = vec![meta("start", &[]), meta("x", &["start", "z"]), meta("y", &["x"]), meta("z", &["y"])];
        let result = validate(&tasks);
        assert!(result.errors.iter().any(|error| error.ends_with("x → z → y → x")), "errors: {:?}", result.errors);
    }

    #[test]
    fn duplicate_ids_are_errors_and_never_duplicated_in_order() {
        let tasks = vec![meta("x", &[]), meta("y", &["x"]), meta("x", &[])];
        let result = validate(&tasks);
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec!["duplicate task id: 'x'".to_string()]);

        let order = topological_sort(&tasks).expect("acyclic");
        assert_eq!(order.iter().filter(|id| id.as_str() == "x").count(), 1);
        assert_eq!(order, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn blank_description_is_a_warning() {
        let tasks = vec![TaskMetadata::new("quiet", "  ")];
        let result = validate(&tasks);
        assert!(result.is_valid);
        assert_eq!(result.warnings, vec!["task 'quiet' has no description".to_string()]);
    }

    #[test]
    fn repeated_dependency_counts_once() {
        let tasks = vec![meta("a", &[]), meta("b", &["a", "a", "a"])];
        let stats = statistics(&tasks);
        assert_eq!(stats.total_edges, 1);
        let result = validate(&tasks);
        assert!(result.is_valid);
        assert_eq!(result.warnings, vec!["task 'b' lists dependency 'a' more than once".to_string()]);
    }

    fn runnable(id: &str, description: &str) -> Task<()> {
        Task::new(id, description, |context: crate::context::WorkflowContext<()>| async move { Ok(context) })
    }

    #[test]
    fn order_tasks_rejects_blank_descriptions() {
        let error = order_tasks(vec![runnable("a", "First"), runnable("x", "")]).expect_err("blank description");
        match error {
            WorkflowError::Validation { errors } => assert_eq!(errors, vec!["task 'x' has no description".to_string()]),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn order_tasks_reports_blank_descriptions_alongside_cycles() {
        let tasks = vec![runnable("a", "").depends_on(["b"]), runnable("b", "B").depends_on(["a"])];
        let error = order_tasks(tasks).expect_err("invalid");
        match error {
            WorkflowError::Validation { errors } => {
                assert_eq!(errors.len(), 2, "errors: {errors:?}");
                assert!(errors[0].contains("a → b → a"));
                assert_eq!(errors[1], "task 'a' has no description");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn ready_tasks_run_in_declaration_order_not_arrival_order() {
        // "other" is ready before "late", but "late" was declared first.
        let tasks = vec![meta("late", &["root"]), meta("root", &[]), meta("other", &[]), meta("early_dependent", &["other"])];
        let result = validate(&tasks);
        assert_eq!(result.execution_order, vec!["root", "late", "other", "early_dependent"]);
    }

    #[test]
    fn statistics_describe_graph_shape() {
        let tasks = vec![
            meta("bump", &[]),
            meta("changelog", &["bump"]),
            meta("commit", &["bump", "changelog"]),
            meta("tag", &["commit"]),
            meta("notify", &[]),
        ];
        let stats = statistics(&tasks);
        assert_eq!(stats.total_tasks, 5);
        assert_eq!(stats.total_edges, 4);
        assert_eq!(stats.root_tasks, vec!["bump", "notify"]);
        assert_eq!(stats.leaf_tasks, vec!["tag", "notify"]);
        assert!((stats.average_dependencies - 0.8).abs() < f64::EPSILON);
        assert_eq!(stats.max_depth, 3);
        let fan_in = stats.max_fan_in.expect("fan in");
        assert_eq!(fan_in.task_ids, vec!["bump"]);
        assert_eq!(fan_in.count, 2);
        let fan_out = stats.max_fan_out.expect("fan out");
        assert_eq!(fan_out.task_ids, vec!["commit"]);
        assert_eq!(fan_out.count, 2);
    }

    #[test]
    fn statistics_of_edgeless_graph_have_no_fan() {
        let stats = statistics(&[meta("solo", &[])]);
        assert!(stats.max_fan_in.is_none());
        assert!(stats.max_fan_out.is_none());
        assert_eq!(stats.root_tasks, stats.leaf_tasks);
        assert_eq!(statistics::<TaskMetadata>(&[]).average_dependencies, 0.0);
    }

    #[test]
    fn graph_error_distinguishes_cycles_from_validation() {
        let cyclic = validate(&[meta("a", &["b"]), meta("b", &["a"])]);
        assert!(matches!(graph_error(&cyclic), WorkflowError::Cycle { ref path } if path == "a → b → a"));

        let missing = validate(&[meta("a", &["nope"])]);
        assert!(matches!(graph_error(&missing), WorkflowError::Validation { .. }));
    }
}
