//! Skip conditions.
//!
//! A skip condition is a pure function of the current [`WorkflowContext`] that
//! decides whether a task runs. Closures returning a [`SkipDecision`] are skip
//! conditions, and the combinators here compose them without subclassing:
//!
//! - [`all`] skips only when every child skips, stopping at the first child that runs.
//! - [`any`] skips when some child skips, stopping at the first child that skips.
//! - [`not`] inverts a condition.
//!
//! JSON truthiness used by [`data_truthy`]: `null`, `false`, `0`, `""`, and empty
//! arrays/objects are falsy; everything else is truthy.

use std::sync::Arc;

use relay_types::SkipDecision;
use serde_json::Value;

use crate::context::WorkflowContext;

/// Decides whether a task should be skipped.
pub trait SkipCondition<C>: Send + Sync {
    fn evaluate(&self, context: &WorkflowContext<C>) -> SkipDecision;
}

impl<C, F> SkipCondition<C> for F
where
    F: Fn(&WorkflowContext<C>) -> SkipDecision + Send + Sync,
{
    fn evaluate(&self, context: &WorkflowContext<C>) -> SkipDecision {
        self(context)
    }
}

/// Boxed condition, as accepted by the combinators.
pub type BoxedSkipCondition<C> = Box<dyn SkipCondition<C>>;

/// Convenience methods for composing conditions.
pub trait SkipConditionExt<C>: SkipCondition<C> + Sized + 'static {
    fn boxed(self) -> BoxedSkipCondition<C> {
        Box::new(self)
    }

    fn and(self, other: impl SkipCondition<C> + 'static) -> All<C> {
        all([self.boxed(), Box::new(other) as BoxedSkipCondition<C>])
    }

    fn or(self, other: impl SkipCondition<C> + 'static) -> Any<C> {
        any([self.boxed(), Box::new(other) as BoxedSkipCondition<C>])
    }
}

impl<C, T> SkipConditionExt<C> for T where T: SkipCondition<C> + Sized + 'static {}

type Predicate<C> = Arc<dyn Fn(&WorkflowContext<C>) -> bool + Send + Sync>;

/// Skips with a fixed reason whenever a boolean predicate holds.
pub struct SkipIf<C> {
    reason: String,
    predicate: Predicate<C>,
    jump_to: Vec<String>,
}

impl<C> SkipIf<C> {
    /// Resume from the first of these tasks when the condition skips.
    pub fn jump_to<I, S>(mut self, task_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.jump_to = task_ids.into_iter().map(Into::into).collect();
        self
    }
}

impl<C> SkipCondition<C> for SkipIf<C> {
    fn evaluate(&self, context: &WorkflowContext<C>) -> SkipDecision {
        if (self.predicate)(context) {
            SkipDecision::skip(self.reason.clone()).jump_to(self.jump_to.iter().cloned())
        } else {
            SkipDecision::run()
        }
    }
}

/// Skip with `reason` when `predicate` returns true.
pub fn skip_if<C, F>(reason: impl Into<String>, predicate: F) -> SkipIf<C>
where
    F: Fn(&WorkflowContext<C>) -> bool + Send + Sync + 'static,
{
    SkipIf {
        reason: reason.into(),
        predicate: Arc::new(predicate),
        jump_to: Vec::new(),
    }
}

/// Skip when a configuration flag is set.
pub fn config_flag<C, F>(reason: impl Into<String>, flag: F) -> SkipIf<C>
where
    C: 'static,
    F: Fn(&C) -> bool + Send + Sync + 'static,
{
    skip_if(reason, move |context: &WorkflowContext<C>| flag(context.config()))
}

/// Skip when `key` is present in the context data.
pub fn data_present<C: 'static>(key: impl Into<String>) -> SkipIf<C> {
    let key = key.into();
    let reason = format!("'{key}' is already present");
    skip_if(reason, move |context: &WorkflowContext<C>| context.contains(&key))
}

/// Skip when `key` holds exactly `expected`.
pub fn data_equals<C: 'static>(key: impl Into<String>, expected: impl Into<Value>) -> SkipIf<C> {
    let key = key.into();
    let expected = expected.into();
    let reason = format!("'{key}' equals {expected}");
    skip_if(reason, move |context: &WorkflowContext<C>| {
        context.get(&key).is_ok_and(|value| *value == expected)
    })
}

/// Skip when `key` holds a truthy value.
pub fn data_truthy<C: 'static>(key: impl Into<String>) -> SkipIf<C> {
    let key = key.into();
    let reason = format!("'{key}' is set");
    skip_if(reason, move |context: &WorkflowContext<C>| context.get(&key).is_ok_and(is_truthy))
}

/// JSON truthiness.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Conjunction of conditions. See [`all`].
pub struct All<C> {
    conditions: Vec<BoxedSkipCondition<C>>,
}

/// Skip only when every condition skips.
///
/// Evaluation stops at the first condition that lets the task run. Reasons of
/// the skipping children are joined with `"; "`; the first jump target wins.
/// An empty conjunction never skips.
pub fn all<C, I>(conditions: I) -> All<C>
where
    I: IntoIterator<Item = BoxedSkipCondition<C>>,
{
    All {
        conditions: conditions.into_iter().collect(),
    }
}

impl<C> SkipCondition<C> for All<C> {
    fn evaluate(&self, context: &WorkflowContext<C>) -> SkipDecision {
        if self.conditions.is_empty() {
            return SkipDecision::run();
        }

        let mut reasons = Vec::with_capacity(self.conditions.len());
        let mut jump_to: Option<Vec<String>> = None;
        for condition in &self.conditions {
            let decision = condition.evaluate(context);
            if !decision.should_skip {
                return SkipDecision::run();
            }
            reasons.push(decision.reason_or_default().to_string());
            if jump_to.is_none() {
                jump_to = decision.skip_to_tasks;
            }
        }

        SkipDecision::skip(reasons.join("; ")).jump_to(jump_to.unwrap_or_default())
    }
}

/// Disjunction of conditions. See [`any`].
pub struct Any<C> {
    conditions: Vec<BoxedSkipCondition<C>>,
}

/// Skip when any condition skips, returning that child's decision unchanged.
///
/// Evaluation stops at the first skipping condition.
pub fn any<C, I>(conditions: I) -> Any<C>
where
    I: IntoIterator<Item = BoxedSkipCondition<C>>,
{
    Any {
        conditions: conditions.into_iter().collect(),
    }
}

impl<C> SkipCondition<C> for Any<C> {
    fn evaluate(&self, context: &WorkflowContext<C>) -> SkipDecision {
        self.conditions
            .iter()
            .map(|condition| condition.evaluate(context))
            .find(|decision| decision.should_skip)
            .unwrap_or_else(SkipDecision::run)
    }
}

/// Negation of a condition. See [`not`].
pub struct Not<C> {
    inner: BoxedSkipCondition<C>,
}

/// Invert `condition`. The inverted decision never carries jump targets.
pub fn not<C>(condition: impl SkipCondition<C> + 'static) -> Not<C> {
    Not {
        inner: Box::new(condition),
    }
}

impl<C> SkipCondition<C> for Not<C> {
    fn evaluate(&self, context: &WorkflowContext<C>) -> SkipDecision {
        let decision = self.inner.evaluate(context);
        if decision.should_skip {
            SkipDecision::run()
        } else {
            let reason = decision
                .reason
                .map(|reason| format!("not ({reason})"))
                .unwrap_or_else(|| "negated condition matched".to_string());
            SkipDecision::skip(reason)
        }
    }
}
