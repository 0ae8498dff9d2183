use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use riddler_core::error::{Result, RiddleError};

use super::workflow::Workflow;
use super::yield_point::YieldResponse;
use crate::context::{assemble_input, yield_snapshot, ExecutionContext};

/// Progress of a single logical run.
///
/// Serializable so a session store can persist it between continuations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// The original run input.
    pub input: Value,
    /// Scheduler order, computed once when the run starts.
    pub order: Vec<String>,
    /// Index into `order` of the next step to consider.
    pub position: usize,
    /// Results in execution order.
    pub results: Vec<(String, Value)>,
    pub executed: HashSet<String>,
    pub context: ExecutionContext,
    pub completed: bool,
}

impl RunState {
    pub fn new(input: Value, order: Vec<String>) -> Self {
        Self {
            context: ExecutionContext::new(input.clone()),
            input,
            order,
            position: 0,
            results: Vec::new(),
            executed: HashSet::new(),
            completed: false,
        }
    }

    /// Name of the step at the resume position, if any remain.
    pub fn current_step(&self) -> Option<&str> {
        self.order.get(self.position).map(String::as_str)
    }

    pub fn result(&self, step: &str) -> Option<&Value> {
        self.context.result(step)
    }

    fn record(&mut self, step: &str, value: Value) {
        self.context.record(step, value.clone());
        self.results.push((step.to_string(), value));
        self.executed.insert(step.to_string());
    }
}

/// A yield point that paused a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldRecord {
    /// Yield point name.
    pub name: String,
    /// The step whose completion triggered it.
    pub after_step: String,
    pub response: YieldResponse,
}

/// How far a suspendable run got.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// Reached the end of the order.
    Completed,
    /// Stopped at a yield point.
    Suspended(YieldRecord),
    /// The cancel token was tripped before the next step.
    Cancelled,
}

/// Outcome of [`Workflow::run`].
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Result of the last executed sink step.
    pub value: Value,
    /// Every executed step's result, in execution order.
    pub results: Vec<(String, Value)>,
    pub context: ExecutionContext,
    pub elapsed_ms: u64,
}

impl Workflow {
    /// Fresh run state positioned at the first step.
    pub fn start_state(&self, input: Value) -> Result<RunState> {
        Ok(RunState::new(input, self.order()?))
    }

    /// Execute every step in order, ignoring yield points.
    pub async fn run(&self, input: Value) -> Result<RunOutput> {
        let start = Instant::now();
        let mut state = self.start_state(input)?;
        self.drive(&mut state, 0, false, None).await?;

        let value = self.final_value(&state);
        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            executed = state.results.len(),
            total = state.order.len(),
            elapsed_ms,
            "Workflow run complete"
        );

        Ok(RunOutput {
            value,
            results: state.results,
            context: state.context,
            elapsed_ms,
        })
    }

    /// Execute from `from` until the order ends or a yield point fires.
    ///
    /// On failure the state keeps its position at the failed step, so a
    /// later call from `state.position` retries exactly that step.
    pub async fn run_until_suspension(
        &self,
        state: &mut RunState,
        from: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<Advance> {
        self.drive(state, from, true, cancel).await
    }

    async fn drive(
        &self,
        state: &mut RunState,
        from: usize,
        suspend: bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<Advance> {
        let mut index = from;

        while index < state.order.len() {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                state.position = index;
                debug!(position = index, "Run cancelled before next step");
                return Ok(Advance::Cancelled);
            }

            let name = state.order[index].clone();
            state.position = index;

            if state.executed.contains(&name) {
                index += 1;
                continue;
            }

            let Some(step) = self.step(&name) else {
                return Err(RiddleError::StepFailed {
                    step: name,
                    message: "step is not registered in this workflow".into(),
                });
            };

            if !step.should_run(&state.context) {
                debug!(step = %name, "Guard false, skipping step");
                index += 1;
                continue;
            }

            let merged = step.merge.as_ref().map(|merge| merge(&state.context));
            let input = assemble_input(&state.input, &state.results, merged);

            let step_start = Instant::now();
            let output = match step.invoke(input).await {
                Ok(output) => output,
                Err(e) => {
                    error!(step = %name, error = %e, "Step failed");
                    return Err(e);
                }
            };
            debug!(
                step = %name,
                elapsed_ms = step_start.elapsed().as_millis() as u64,
                "Step complete"
            );

            state.record(&name, output);
            index += 1;
            state.position = index;

            if suspend {
                if let Some(point) = self.yield_after(&name) {
                    let snapshot = yield_snapshot(&state.input, &state.results);
                    let response = point.respond(&snapshot)?;
                    debug!(
                        step = %name,
                        yield_point = %point.name,
                        next_step = ?response.next_step,
                        "Suspending at yield point"
                    );
                    return Ok(Advance::Suspended(YieldRecord {
                        name: point.name.clone(),
                        after_step: name,
                        response,
                    }));
                }
            }
        }

        state.position = state.order.len();
        state.completed = true;
        Ok(Advance::Completed)
    }

    /// Result of the last executed sink step, else the most recent result.
    pub fn final_value(&self, state: &RunState) -> Value {
        let sinks = self.sinks();
        state
            .results
            .iter()
            .rev()
            .find(|(name, _)| sinks.contains(name.as_str()))
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| state.context.last().clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::graph::builder::PipelineBuilder;
    use crate::graph::step::{Stage, StepOptions};

    fn emit(value: Value) -> impl Stage {
        move |_input: Value| {
            let value = value.clone();
            async move { Ok::<_, RiddleError>(value) }
        }
    }

    fn echo() -> impl Stage {
        |input: Value| async move { Ok::<_, RiddleError>(json!({ "seen": input })) }
    }

    fn counted(counter: Arc<AtomicUsize>, value: Value) -> impl Stage {
        move |_input: Value| {
            counter.fetch_add(1, Ordering::SeqCst);
            let value = value.clone();
            async move { Ok::<_, RiddleError>(value) }
        }
    }

    fn riddle_graph(is_riddle: bool) -> Workflow {
        PipelineBuilder::new()
            .step("detect", emit(json!({ "isRiddle": is_riddle, "topic": "sphinx" })), StepOptions::new())
            .step(
                "decipher",
                emit(json!({ "deciphered": true })),
                StepOptions::new().guard("detect.isRiddle"),
            )
            .step("answer", echo(), StepOptions::new())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_guard_false_skips_step() {
        let output = riddle_graph(false).run(json!({ "question": "q" })).await.unwrap();

        assert!(output.context.result("decipher").is_none());
        assert!(output.results.iter().all(|(name, _)| name != "decipher"));

        let seen = &output.value["seen"];
        assert_eq!(seen["isRiddle"], json!(false));
        assert_eq!(seen["question"], json!("q"));
        assert!(seen.get("deciphered").is_none());
    }

    #[tokio::test]
    async fn test_string_guard_runs_when_field_truthy() {
        let output = riddle_graph(true).run(json!({})).await.unwrap();
        assert_eq!(output.context.result("decipher"), Some(&json!({ "deciphered": true })));
        assert_eq!(output.value["seen"]["deciphered"], json!(true));
        let names: Vec<&str> = output.results.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["detect", "decipher", "answer"]);
    }

    #[tokio::test]
    async fn test_literal_and_predicate_guards() {
        let wf = PipelineBuilder::new()
            .step("a", emit(json!({ "a": 1 })), StepOptions::new())
            .step("never", emit(json!({ "never": 1 })), StepOptions::new().guard(false))
            .step(
                "seen_a",
                emit(json!({ "seen_a": 1 })),
                StepOptions::new().when(|ctx| ctx.contains("a")),
            )
            .build()
            .unwrap();
        let output = wf.run(json!({})).await.unwrap();
        assert!(output.context.result("never").is_none());
        assert!(output.context.result("seen_a").is_some());
    }

    #[tokio::test]
    async fn test_every_prior_output_is_visible() {
        // `c` only depends on `b`, yet sees `a`'s keys too.
        let wf = PipelineBuilder::new()
            .step("a", emit(json!({ "k": "a", "from_a": 1 })), StepOptions::new())
            .step("b", emit(json!({ "k": "b" })), StepOptions::new())
            .step("c", echo(), StepOptions::new().after(["b"]))
            .build()
            .unwrap();
        let output = wf.run(json!({ "k": "input" })).await.unwrap();
        assert_eq!(output.value["seen"]["k"], json!("b"));
        assert_eq!(output.value["seen"]["from_a"], json!(1));
    }

    #[tokio::test]
    async fn test_merge_function_overrides_prior_outputs() {
        let wf = PipelineBuilder::new()
            .step("a", emit(json!({ "content": "raw", "flag": true })), StepOptions::new())
            .step(
                "b",
                echo(),
                StepOptions::new().after(["a"]).merge(|ctx| {
                    json!({ "content": "merged", "flagCopy": ctx.field("a", "flag").cloned() })
                }),
            )
            .build()
            .unwrap();
        let output = wf.run(json!({})).await.unwrap();
        assert_eq!(output.value["seen"]["content"], json!("merged"));
        assert_eq!(output.value["seen"]["flagCopy"], json!(true));
    }

    #[tokio::test]
    async fn test_merger_step_combines_results() {
        let wf = PipelineBuilder::new()
            .step("left", emit(json!({ "l": 2 })), StepOptions::new())
            .step("right", emit(json!({ "r": 3 })), StepOptions::new().after(["left"]))
            .merge(
                "sum",
                |input: &Value| {
                    let l = input["l"].as_i64().unwrap_or(0);
                    let r = input["r"].as_i64().unwrap_or(0);
                    Ok(json!({ "sum": l + r }))
                },
                ["left", "right"],
            )
            .build()
            .unwrap();
        let output = wf.run(json!({})).await.unwrap();
        assert_eq!(output.value, json!({ "sum": 5 }));
    }

    #[tokio::test]
    async fn test_final_value_prefers_last_sink() {
        let wf = PipelineBuilder::new()
            .step("a", emit(json!({ "a": 1 })), StepOptions::new())
            .step("b", emit(json!({ "b": 1 })), StepOptions::new())
            .step("c", emit(json!({ "c": 1 })), StepOptions::new().after(["a"]))
            .build()
            .unwrap();
        // Order a, b, c; both b and c are sinks.
        let output = wf.run(json!({})).await.unwrap();
        assert_eq!(output.value, json!({ "c": 1 }));
    }

    #[tokio::test]
    async fn test_non_object_input_is_wrapped() {
        let wf = PipelineBuilder::new()
            .step("only", echo(), StepOptions::new())
            .build()
            .unwrap();
        let output = wf.run(json!("plain text")).await.unwrap();
        assert_eq!(output.value["seen"], json!({ "input": "plain text" }));
    }

    #[tokio::test]
    async fn test_failure_propagates_unmodified() {
        let wf = PipelineBuilder::new()
            .step("a", emit(json!({ "a": 1 })), StepOptions::new())
            .step(
                "boom",
                |_input: Value| async move { Err::<Value, _>(RiddleError::Search("offline".into())) },
                StepOptions::new(),
            )
            .step("after", emit(json!({})), StepOptions::new())
            .build()
            .unwrap();

        let err = wf.run(json!({})).await.unwrap_err();
        assert!(matches!(err, RiddleError::Search(msg) if msg == "offline"));

        let mut state = wf.start_state(json!({})).unwrap();
        let err = wf.run_until_suspension(&mut state, 0, None).await.unwrap_err();
        assert!(matches!(err, RiddleError::Search(_)));
        assert_eq!(state.current_step(), Some("boom"));
        assert_eq!(state.results.len(), 1);
        assert!(!state.completed);
    }

    #[tokio::test]
    async fn test_suspends_at_yield_points() {
        let wf = PipelineBuilder::new()
            .step("a", emit(json!({ "a": 1 })), StepOptions::new())
            .yield_point("a-done", |snapshot| {
                Ok(YieldResponse::new()
                    .next_step("b")
                    .action("working on b")
                    .payload(snapshot.clone()))
            })
            .step("b", emit(json!({ "b": 2 })), StepOptions::new())
            .build()
            .unwrap();

        let mut state = wf.start_state(json!({ "question": "q" })).unwrap();
        let advance = wf.run_until_suspension(&mut state, 0, None).await.unwrap();
        let record = match advance {
            Advance::Suspended(record) => record,
            other => panic!("expected suspension, got {other:?}"),
        };
        assert_eq!(record.name, "a-done");
        assert_eq!(record.after_step, "a");
        assert_eq!(record.response.next_step.as_deref(), Some("b"));
        assert_eq!(record.response.payload["a"], json!({ "a": 1 }));
        assert_eq!(record.response.payload["webRequest"]["question"], json!("q"));
        assert_eq!(state.position, 1);
        assert!(state.result("b").is_none());

        let from = state.position;
        let advance = wf.run_until_suspension(&mut state, from, None).await.unwrap();
        assert_eq!(advance, Advance::Completed);
        assert!(state.completed);
        assert_eq!(state.position, 2);
        assert_eq!(state.result("b"), Some(&json!({ "b": 2 })));
    }

    #[tokio::test]
    async fn test_run_ignores_yield_points() {
        let wf = PipelineBuilder::new()
            .step("a", emit(json!({ "a": 1 })), StepOptions::new())
            .yield_point("a-done", |_| Ok(YieldResponse::new()))
            .step("b", emit(json!({ "b": 2 })), StepOptions::new())
            .build()
            .unwrap();
        let output = wf.run(json!({})).await.unwrap();
        assert_eq!(output.results.len(), 2);
    }

    #[tokio::test]
    async fn test_resume_skips_executed_steps() {
        let calls = Arc::new(AtomicUsize::new(0));
        let wf = PipelineBuilder::new()
            .step("a", counted(calls.clone(), json!({ "a": 1 })), StepOptions::new())
            .step("b", emit(json!({ "b": 1 })), StepOptions::new())
            .build()
            .unwrap();
        let mut state = wf.start_state(json!({})).unwrap();
        wf.run_until_suspension(&mut state, 0, None).await.unwrap();
        // Re-driving from the start must not re-run anything.
        wf.run_until_suspension(&mut state, 0, None).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.results.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_token_stops_before_next_step() {
        let calls = Arc::new(AtomicUsize::new(0));
        let wf = PipelineBuilder::new()
            .step("a", counted(calls.clone(), json!({})), StepOptions::new())
            .build()
            .unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let mut state = wf.start_state(json!({})).unwrap();
        let advance = wf.run_until_suspension(&mut state, 0, Some(&token)).await.unwrap();
        assert_eq!(advance, Advance::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!state.completed);
    }

    #[tokio::test]
    async fn test_state_round_trips_through_json() {
        let wf = riddle_graph(true);
        let mut state = wf.start_state(json!({ "question": "q" })).unwrap();
        wf.run_until_suspension(&mut state, 0, None).await.unwrap();

        let restored: RunState = serde_json::from_value(serde_json::to_value(&state).unwrap()).unwrap();
        assert!(restored.completed);
        assert_eq!(restored.results, state.results);
        assert_eq!(restored.context.result("decipher"), Some(&json!({ "deciphered": true })));
    }
}
