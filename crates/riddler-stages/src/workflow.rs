//! Wiring of the four riddle steps and the three pauses between them.
//!
//! ```text
//! inputClassification ──▶ search? ──▶ responseGeneration ──▶ responseAssembly
//!        │ input-complete     │ search-complete   │ generation-complete
//! ```

use serde_json::{json, Value};

use riddler_core::error::Result;
use riddler_pipeline::{pipeline, ExecutionContext, Guard, StepOptions, Workflow, YieldResponse};

use crate::action_words::{phase_words, Phase};
use crate::assembly::{found_results, response_assembly};
use crate::classification::InputClassification;
use crate::generation::ResponseGeneration;
use crate::search::SearchAnswer;
use crate::Services;

pub const CLASSIFY: &str = "inputClassification";
pub const SEARCH: &str = "search";
pub const GENERATE: &str = "responseGeneration";
pub const ASSEMBLE: &str = "responseAssembly";

/// Labels a client echoes back as the expected next step.
pub const SEARCH_LABEL: &str = "search";
pub const GENERATION_LABEL: &str = "response-generation";
pub const ASSEMBLY_LABEL: &str = "response-assembly";

fn pick(ctx: &ExecutionContext, step: &str, field: &str) -> Value {
    ctx.field(step, field).cloned().unwrap_or(Value::Null)
}

fn flag(value: &Value, key: &str) -> bool {
    value[key].as_bool().unwrap_or(false)
}

fn label<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value[key].as_str().filter(|s| !s.is_empty())
}

fn after_classification(snapshot: &Value) -> Result<YieldResponse> {
    let classification = &snapshot[CLASSIFY];
    let next = if flag(classification, "needsSearch") {
        SEARCH_LABEL
    } else {
        GENERATION_LABEL
    };
    Ok(YieldResponse::new()
        .next_step(next)
        .action(label(classification, "nextActionWord").unwrap_or("processing"))
        .completed_action(phase_words(Phase::Classification, flag(classification, "isRiddle")).past_tense)
        .payload(classification.clone()))
}

fn after_search(snapshot: &Value) -> Result<YieldResponse> {
    let search = &snapshot[SEARCH];
    let completed = if flag(search, "searchPerformed") {
        let hits = search["searchResults"].as_array().map_or(0, Vec::len);
        found_results(hits)
    } else {
        phase_words(Phase::Search, false).past_tense
    };
    Ok(YieldResponse::new()
        .next_step(GENERATION_LABEL)
        .action(label(&snapshot[CLASSIFY], "subsequentActionWord").unwrap_or("crafting response"))
        .completed_action(completed)
        .payload(search.clone()))
}

fn after_generation(snapshot: &Value) -> Result<YieldResponse> {
    let generated = &snapshot[GENERATE];
    let answered = generated["responseType"].as_str() == Some("riddle_answer");
    Ok(YieldResponse::new()
        .next_step(ASSEMBLY_LABEL)
        .action(label(generated, "nextActionWord").unwrap_or("finalizing response"))
        .completed_action(phase_words(Phase::Generation, answered).past_tense)
        .payload(generated.clone()))
}

/// Build the riddle workflow over the given services.
pub fn riddle_workflow(services: Services) -> Result<Workflow> {
    pipeline()
        .step(CLASSIFY, InputClassification::new(services.clone()), StepOptions::new())
        .yield_point("input-complete", after_classification)
        .step(
            SEARCH,
            SearchAnswer::new(services.clone()),
            StepOptions::new()
                .guard(Guard::field(&format!("{CLASSIFY}.needsSearch")))
                .after([CLASSIFY])
                .merge(|ctx| {
                    let query = ctx
                        .field(CLASSIFY, "searchQuery")
                        .filter(|q| !q.is_null())
                        .or_else(|| ctx.field(CLASSIFY, "coreContent"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    json!({
                        "searchQuery": query,
                        "needsSearch": pick(ctx, CLASSIFY, "needsSearch"),
                        "isRiddle": pick(ctx, CLASSIFY, "isRiddle"),
                    })
                }),
        )
        .yield_point("search-complete", after_search)
        .step(
            GENERATE,
            ResponseGeneration::new(services),
            StepOptions::new().after([CLASSIFY, SEARCH]).merge(|ctx| {
                json!({
                    "content": pick(ctx, CLASSIFY, "coreContent"),
                    "isRiddle": pick(ctx, CLASSIFY, "isRiddle"),
                    "riddleAnswer": pick(ctx, CLASSIFY, "riddleAnswer"),
                    "searchContent": pick(ctx, SEARCH, "answerContent"),
                })
            }),
        )
        .yield_point("generation-complete", after_generation)
        .step(
            ASSEMBLE,
            response_assembly,
            StepOptions::new().after([GENERATE]).merge(|ctx| {
                json!({
                    "generatedContent": pick(ctx, GENERATE, ""),
                    "classificationData": pick(ctx, CLASSIFY, ""),
                    "searchData": pick(ctx, SEARCH, ""),
                })
            }),
        )
        .build()
}
