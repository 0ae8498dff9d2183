use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use riddler_core::error::{Result, RiddleError};

use super::name::validate_step_name;
use super::schedule;
use super::step::{Branch, BranchOptions, Guard, MergeFn, Stage, Step, StepKind, StepOptions};
use super::workflow::Workflow;
use super::yield_point::{YieldFn, YieldPoint, YieldResponse};

/// Accumulates step, branch, merge and yield declarations into a [`Workflow`].
///
/// Declarations chain fluently. The first declaration error is kept and
/// returned from [`build`](Self::build); once an error is recorded further
/// declarations are ignored, so a graph with any error is never usable.
///
/// Dependency rules:
/// - an explicit `after` list is used as given;
/// - otherwise a step depends on the step declared right before it, unless it
///   carries a guard or a merge function;
/// - a merge function requires an explicit `after`.
#[derive(Default)]
pub struct PipelineBuilder {
    steps: Vec<Step>,
    names: HashSet<String>,
    edges: HashMap<String, Vec<String>>,
    yields: Vec<YieldPoint>,
    error: Option<RiddleError>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an action step.
    pub fn step(mut self, name: impl Into<String>, stage: impl Stage, options: StepOptions) -> Self {
        if self.error.is_none() {
            let result = self.declare_step(name.into(), StepKind::Action(Arc::new(stage)), options);
            self.record(result);
        }
        self
    }

    /// Declare a group of steps sharing dependency and guard defaults.
    ///
    /// Members are registered in iteration order and run sequentially. A
    /// member's own guard overrides the group guard.
    pub fn branch<I, S>(mut self, members: I, options: BranchOptions) -> Self
    where
        I: IntoIterator<Item = (S, Branch)>,
        S: Into<String>,
    {
        let before_group = self.steps.last().map(|s| s.name.clone());

        for (name, branch) in members {
            if self.error.is_some() {
                break;
            }
            let guard = branch.guard.or_else(|| options.guard.clone());
            let after = match &options.after {
                Some(after) => after.clone(),
                None if guard.is_none() => before_group.iter().cloned().collect(),
                None => Vec::new(),
            };
            let result = self.register(name.into(), StepKind::Action(branch.stage), guard, None, after);
            self.record(result);
        }
        self
    }

    /// Declare a step that combines prior results synchronously.
    ///
    /// The merger receives the assembled input, the same value an action
    /// step would get. `after` must name at least one step.
    pub fn merge<F, I, S>(mut self, name: impl Into<String>, merger: F, after: I) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.error.is_none() {
            let name = name.into();
            let after: Vec<String> = after.into_iter().map(Into::into).collect();
            let result = if after.is_empty() {
                Err(RiddleError::MergeWithoutDependency(name))
            } else {
                self.register(name, StepKind::Merger(Arc::new(merger)), None, None, after)
            };
            self.record(result);
        }
        self
    }

    /// Declare a yield point that fires after the most recently declared step.
    pub fn yield_point<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Value) -> Result<YieldResponse> + Send + Sync + 'static,
    {
        if self.error.is_none() {
            let name = name.into();
            let result = match self.steps.last() {
                Some(step) => {
                    let after = vec![step.name.clone()];
                    self.register_yield(name, after, Arc::new(func))
                }
                None => Err(RiddleError::YieldWithoutStep(name)),
            };
            self.record(result);
        }
        self
    }

    /// Declare a yield point that fires after any of the listed steps.
    pub fn yield_after<F, I, S>(mut self, name: impl Into<String>, after: I, func: F) -> Self
    where
        F: Fn(&Value) -> Result<YieldResponse> + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.error.is_none() {
            let name = name.into();
            let after: Vec<String> = after.into_iter().map(Into::into).collect();
            let result = if after.is_empty() {
                Err(RiddleError::YieldWithoutStep(name))
            } else {
                self.register_yield(name, after, Arc::new(func))
            };
            self.record(result);
        }
        self
    }

    /// Validate the graph and freeze it.
    ///
    /// Fails with the first declaration error, then with any cycle or
    /// dependency on an unregistered step.
    pub fn build(self) -> Result<Workflow> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let names: Vec<String> = self.steps.iter().map(|s| s.name.clone()).collect();
        let order = schedule::order(&names, &self.edges)?;

        for point in &self.yields {
            if let Some(missing) = point.after.iter().find(|s| !self.names.contains(*s)) {
                return Err(RiddleError::UnknownDependency {
                    step: point.name.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        debug!(
            steps = self.steps.len(),
            yields = self.yields.len(),
            order = ?order,
            "Workflow built"
        );

        Ok(Workflow::new(self.steps, self.edges, self.yields))
    }

    fn declare_step(&mut self, name: String, kind: StepKind, options: StepOptions) -> Result<()> {
        let StepOptions { guard, after, merge } = options;
        let after = match after {
            Some(after) => after,
            None if merge.is_some() => return Err(RiddleError::MergeWithoutDependency(name)),
            None if guard.is_some() => Vec::new(),
            None => self.steps.last().map(|s| s.name.clone()).into_iter().collect(),
        };
        self.register(name, kind, guard, merge, after)
    }

    fn register(
        &mut self,
        name: String,
        kind: StepKind,
        guard: Option<Guard>,
        merge: Option<MergeFn>,
        after: Vec<String>,
    ) -> Result<()> {
        self.check_name(&name)?;
        self.names.insert(name.clone());
        if !after.is_empty() {
            self.edges.insert(name.clone(), after);
        }
        self.steps.push(Step {
            name,
            kind,
            guard,
            merge,
        });
        Ok(())
    }

    fn register_yield(&mut self, name: String, after: Vec<String>, func: YieldFn) -> Result<()> {
        self.check_name(&name)?;
        self.yields.push(YieldPoint { name, after, func });
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<()> {
        validate_step_name(name)?;
        if self.names.contains(name) || self.yields.iter().any(|y| y.name == name) {
            return Err(RiddleError::DuplicateStep(name.to_string()));
        }
        Ok(())
    }

    fn record(&mut self, result: Result<()>) {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn emit(value: Value) -> impl Stage {
        move |_input: Value| {
            let value = value.clone();
            async move { Ok::<_, RiddleError>(value) }
        }
    }

    fn noop_yield(_: &Value) -> Result<YieldResponse> {
        Ok(YieldResponse::new())
    }

    #[test]
    fn test_implicit_edges_follow_declaration() {
        let wf = PipelineBuilder::new()
            .step("a", emit(json!({})), StepOptions::new())
            .step("b", emit(json!({})), StepOptions::new())
            .step("c", emit(json!({})), StepOptions::new())
            .build()
            .unwrap();
        assert!(wf.dependencies("a").is_empty());
        assert_eq!(wf.dependencies("b"), ["a"]);
        assert_eq!(wf.dependencies("c"), ["b"]);
        assert_eq!(wf.order().unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn test_guard_suppresses_implicit_edge() {
        let wf = PipelineBuilder::new()
            .step("detect", emit(json!({})), StepOptions::new())
            .step("decipher", emit(json!({})), StepOptions::new().guard("detect.isRiddle"))
            .build()
            .unwrap();
        assert!(wf.dependencies("decipher").is_empty());
    }

    #[test]
    fn test_explicit_after_is_kept() {
        let wf = PipelineBuilder::new()
            .step("a", emit(json!({})), StepOptions::new())
            .step("b", emit(json!({})), StepOptions::new())
            .step("c", emit(json!({})), StepOptions::new().after(["a"]).merge(|_| json!({})))
            .build()
            .unwrap();
        assert_eq!(wf.dependencies("c"), ["a"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = PipelineBuilder::new()
            .step("a", emit(json!(1)), StepOptions::new())
            .step("a", emit(json!(2)), StepOptions::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, RiddleError::DuplicateStep(n) if n == "a"));
    }

    #[test]
    fn test_duplicate_across_kinds_rejected() {
        let err = PipelineBuilder::new()
            .step("a", emit(json!(1)), StepOptions::new())
            .merge("a", |v: &Value| Ok(v.clone()), ["a"])
            .build()
            .unwrap_err();
        assert!(matches!(err, RiddleError::DuplicateStep(_)));
    }

    #[test]
    fn test_reserved_name_rejected() {
        let err = PipelineBuilder::new()
            .step("last", emit(json!(1)), StepOptions::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, RiddleError::ReservedName(_)));
    }

    #[test]
    fn test_first_error_wins() {
        let err = PipelineBuilder::new()
            .step("result", emit(json!(1)), StepOptions::new())
            .step("x", emit(json!(1)), StepOptions::new())
            .step("x", emit(json!(1)), StepOptions::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, RiddleError::ReservedName(_)));
    }

    #[test]
    fn test_merge_function_requires_after() {
        let err = PipelineBuilder::new()
            .step("a", emit(json!({})), StepOptions::new())
            .step("b", emit(json!({})), StepOptions::new().merge(|_| json!({})))
            .build()
            .unwrap_err();
        assert!(matches!(err, RiddleError::MergeWithoutDependency(n) if n == "b"));
    }

    #[test]
    fn test_merge_step_requires_after() {
        let err = PipelineBuilder::new()
            .step("a", emit(json!({})), StepOptions::new())
            .merge("m", |v: &Value| Ok(v.clone()), Vec::<String>::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, RiddleError::MergeWithoutDependency(n) if n == "m"));
    }

    #[test]
    fn test_cycle_rejected_at_build() {
        let err = PipelineBuilder::new()
            .step("x", emit(json!({})), StepOptions::new().after(["y"]))
            .step("y", emit(json!({})), StepOptions::new().after(["x"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, RiddleError::CircularDependency(s) if s == "x" || s == "y"));
    }

    #[test]
    fn test_unknown_dependency_rejected_at_build() {
        let err = PipelineBuilder::new()
            .step("a", emit(json!({})), StepOptions::new().after(["ghost"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, RiddleError::UnknownDependency { dependency, .. } if dependency == "ghost"));
    }

    #[test]
    fn test_branch_members_share_defaults() {
        let wf = PipelineBuilder::new()
            .step("root", emit(json!({})), StepOptions::new())
            .branch(
                [
                    ("left", Branch::new(emit(json!({})))),
                    ("right", Branch::new(emit(json!({}))).guard(false)),
                ],
                BranchOptions::new(),
            )
            .build()
            .unwrap();
        assert_eq!(wf.dependencies("left"), ["root"]);
        assert!(wf.dependencies("right").is_empty());
        assert!(wf.step("right").unwrap().guard.is_some());
        assert_eq!(wf.order().unwrap(), ["root", "left", "right"]);
    }

    #[test]
    fn test_branch_group_guard_and_after() {
        let wf = PipelineBuilder::new()
            .step("root", emit(json!({})), StepOptions::new())
            .step("other", emit(json!({})), StepOptions::new())
            .branch(
                [("only", Branch::new(emit(json!({}))))],
                BranchOptions::new().after(["root"]).guard("root.go"),
            )
            .build()
            .unwrap();
        assert_eq!(wf.dependencies("only"), ["root"]);
        assert!(matches!(
            wf.step("only").unwrap().guard,
            Some(Guard::FieldRef { .. })
        ));
    }

    #[test]
    fn test_yield_point_follows_previous_step() {
        let wf = PipelineBuilder::new()
            .step("a", emit(json!({})), StepOptions::new())
            .yield_point("a-done", noop_yield)
            .step("b", emit(json!({})), StepOptions::new())
            .build()
            .unwrap();
        assert_eq!(wf.yields().len(), 1);
        assert_eq!(wf.yield_after("a").map(|y| y.name.as_str()), Some("a-done"));
        assert!(wf.yield_after("b").is_none());
        // Yields take no part in ordering.
        assert_eq!(wf.dependencies("b"), ["a"]);
    }

    #[test]
    fn test_yield_without_step_rejected() {
        let err = PipelineBuilder::new()
            .yield_point("early", noop_yield)
            .build()
            .unwrap_err();
        assert!(matches!(err, RiddleError::YieldWithoutStep(n) if n == "early"));
    }

    #[test]
    fn test_yield_after_unknown_step_rejected() {
        let err = PipelineBuilder::new()
            .step("a", emit(json!({})), StepOptions::new())
            .yield_after("y", ["nope"], noop_yield)
            .build()
            .unwrap_err();
        assert!(matches!(err, RiddleError::UnknownDependency { step, .. } if step == "y"));
    }

    #[test]
    fn test_sinks() {
        let wf = PipelineBuilder::new()
            .step("a", emit(json!({})), StepOptions::new())
            .step("b", emit(json!({})), StepOptions::new())
            .step("c", emit(json!({})), StepOptions::new().after(["a"]))
            .build()
            .unwrap();
        let sinks = wf.sinks();
        assert!(sinks.contains("b"));
        assert!(sinks.contains("c"));
        assert!(!sinks.contains("a"));
    }
}
