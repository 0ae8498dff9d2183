use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use riddler_core::error::Result;

use crate::context::{is_truthy, ExecutionContext};

/// A unit of work: takes the assembled input, produces an output.
pub trait Stage: Send + Sync + 'static {
    fn run(&self, input: Value) -> BoxFuture<'_, Result<Value>>;
}

impl<F, Fut> Stage for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn run(&self, input: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin(self(input))
    }
}

/// Synchronous combiner used by merge steps.
pub type MergerFn = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// Produces a partial input object from the accumulated context.
pub type MergeFn = Arc<dyn Fn(&ExecutionContext) -> Value + Send + Sync>;

/// Context predicate used by [`Guard::Predicate`].
pub type PredicateFn = Arc<dyn Fn(&ExecutionContext) -> bool + Send + Sync>;

/// Condition controlling whether a step executes.
#[derive(Clone)]
pub enum Guard {
    Literal(bool),
    Predicate(PredicateFn),
    /// Truthiness of `field` inside `step`'s recorded result.
    FieldRef { step: String, field: String },
}

impl Guard {
    /// Parse a `"step.field"` reference. A bare `"step"` tests the whole result.
    pub fn field(reference: &str) -> Self {
        let (step, field) = reference.split_once('.').unwrap_or((reference, ""));
        Guard::FieldRef {
            step: step.to_string(),
            field: field.to_string(),
        }
    }

    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
    {
        Guard::Predicate(Arc::new(predicate))
    }

    pub fn evaluate(&self, ctx: &ExecutionContext) -> bool {
        match self {
            Guard::Literal(value) => *value,
            Guard::Predicate(predicate) => predicate(ctx),
            Guard::FieldRef { step, field } => ctx.field(step, field).is_some_and(is_truthy),
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Literal(value) => write!(f, "Literal({value})"),
            Guard::Predicate(_) => write!(f, "Predicate(..)"),
            Guard::FieldRef { step, field } => write!(f, "FieldRef({step}.{field})"),
        }
    }
}

impl From<bool> for Guard {
    fn from(value: bool) -> Self {
        Guard::Literal(value)
    }
}

impl From<&str> for Guard {
    fn from(reference: &str) -> Self {
        Guard::field(reference)
    }
}

impl From<String> for Guard {
    fn from(reference: String) -> Self {
        Guard::field(&reference)
    }
}

/// Options accepted when declaring a step.
#[derive(Clone, Default)]
pub struct StepOptions {
    pub(crate) guard: Option<Guard>,
    pub(crate) after: Option<Vec<String>>,
    pub(crate) merge: Option<MergeFn>,
}

impl StepOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the guard (`bool`, or a `"step.field"` string).
    pub fn guard(mut self, guard: impl Into<Guard>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    /// Guard the step with a context predicate.
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Guard::when(predicate));
        self
    }

    /// Declare explicit dependencies.
    pub fn after<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after = Some(deps.into_iter().map(Into::into).collect());
        self
    }

    /// Merge a partial object into the step's input before it runs.
    pub fn merge<F>(mut self, merge: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Value + Send + Sync + 'static,
    {
        self.merge = Some(Arc::new(merge));
        self
    }
}

/// A member of a branch group: a stage plus an optional own guard.
pub struct Branch {
    pub(crate) stage: Arc<dyn Stage>,
    pub(crate) guard: Option<Guard>,
}

impl Branch {
    pub fn new(stage: impl Stage) -> Self {
        Self {
            stage: Arc::new(stage),
            guard: None,
        }
    }

    pub fn guard(mut self, guard: impl Into<Guard>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Guard::when(predicate));
        self
    }
}

/// Defaults shared by every member of a branch group.
#[derive(Clone, Default)]
pub struct BranchOptions {
    pub(crate) guard: Option<Guard>,
    pub(crate) after: Option<Vec<String>>,
}

impl BranchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(mut self, guard: impl Into<Guard>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    pub fn after<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after = Some(deps.into_iter().map(Into::into).collect());
        self
    }
}

/// What a step does when it runs.
#[derive(Clone)]
pub enum StepKind {
    Action(Arc<dyn Stage>),
    Merger(MergerFn),
}

/// A registered step. Immutable once the graph is built.
#[derive(Clone)]
pub struct Step {
    pub name: String,
    pub kind: StepKind,
    pub guard: Option<Guard>,
    pub merge: Option<MergeFn>,
}

impl Step {
    pub fn is_merger(&self) -> bool {
        matches!(self.kind, StepKind::Merger(_))
    }

    /// Whether the guard (if any) lets the step run.
    pub fn should_run(&self, ctx: &ExecutionContext) -> bool {
        self.guard.as_ref().map_or(true, |g| g.evaluate(ctx))
    }

    pub(crate) async fn invoke(&self, input: Value) -> Result<Value> {
        match &self.kind {
            StepKind::Action(stage) => stage.run(input).await,
            StepKind::Merger(merger) => merger(&input),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("merger", &self.is_merger())
            .field("guard", &self.guard)
            .field("merge", &self.merge.is_some())
            .finish()
    }
}
