use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use riddler_core::error::Result;
use riddler_core::types::SearchHit;

use crate::classification::Classification;
use crate::generation::{GeneratedContent, ResponseType};
use crate::search::SearchOutcome;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
    #[serde(rename = "type")]
    pub kind: String,
    pub earned: bool,
    pub context: String,
}

impl Badge {
    fn earned(kind: &str, context: &str) -> Self {
        Self {
            kind: kind.to_string(),
            earned: true,
            context: context.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub original_input: String,
    pub riddle_target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiddleEntry {
    pub final_response: String,
    pub response_type: ResponseType,
    pub riddle_target: Option<String>,
    pub source_result: Option<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentTense {
    pub present_tense: String,
}

/// Client-facing result of a full run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembledResponse {
    pub final_response: String,
    pub response_type: ResponseType,
    pub badges: Vec<Badge>,
    pub metadata: ResponseMetadata,
    pub search_performed: bool,
    pub search_results: Vec<SearchHit>,
    pub riddles: Option<Vec<RiddleEntry>>,
    pub action_words: PresentTense,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_action: Option<String>,
}

/// `"found 1 result"`, `"found 3 results"`.
pub fn found_results(count: usize) -> String {
    format!("found {count} result{}", if count == 1 { "" } else { "s" })
}

pub fn assemble(
    generated: &GeneratedContent,
    classification: &Classification,
    search: Option<&SearchOutcome>,
) -> AssembledResponse {
    let searched = search.filter(|s| s.search_performed);
    let results = search.map(|s| s.search_results.clone()).unwrap_or_default();

    let mut badges = Vec::new();
    if classification.is_riddle {
        badges.push(Badge::earned("riddle_asked", "User asked a riddle"));
    }
    if searched.is_some() {
        badges.push(Badge::earned("search_performed", "Web search executed"));
    }
    match generated.response_type {
        ResponseType::GeneratedRiddle => {
            badges.push(Badge::earned("creative_generation", "New riddle generated"))
        }
        ResponseType::RiddleAnswer => {
            badges.push(Badge::earned("direct_answer", "Riddle answer provided"))
        }
        ResponseType::StumperResponse => {}
    }

    let riddles = (generated.response_type == ResponseType::GeneratedRiddle).then(|| {
        vec![RiddleEntry {
            final_response: generated.final_response.clone(),
            response_type: generated.response_type,
            riddle_target: generated.riddle_target.clone(),
            source_result: results.first().cloned(),
        }]
    });

    let present = if generated.next_action_word.is_empty() {
        "completing".to_string()
    } else {
        generated.next_action_word.clone()
    };

    AssembledResponse {
        final_response: generated.final_response.clone(),
        response_type: generated.response_type,
        badges,
        metadata: ResponseMetadata {
            original_input: classification.core_content.clone(),
            riddle_target: generated.riddle_target.clone(),
        },
        search_performed: searched.is_some(),
        completed_action: searched.map(|s| found_results(s.search_results.len())),
        search_results: results,
        riddles,
        action_words: PresentTense {
            present_tense: present,
        },
    }
}

/// Last step. Expects `generatedContent`, `classificationData` and an
/// optional `searchData` in its input.
pub async fn response_assembly(input: Value) -> Result<Value> {
    let generated: GeneratedContent = serde_json::from_value(input["generatedContent"].clone())?;
    let classification: Classification =
        serde_json::from_value(input["classificationData"].clone())?;
    let search: Option<SearchOutcome> = match &input["searchData"] {
        Value::Null => None,
        other => Some(serde_json::from_value(other.clone())?),
    };

    let response = assemble(&generated, &classification, search.as_ref());
    debug!(
        response_type = ?response.response_type,
        badges = response.badges.len(),
        search_performed = response.search_performed,
        "Response assembled"
    );
    Ok(serde_json::to_value(response)?)
}
