use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use riddler_core::config::TaskKind;
use riddler_core::error::{Result, RiddleError};
use riddler_core::types::ChatMessage;
use riddler_pipeline::Stage;

use crate::action_words::{contextual_words, InputTraits};
use crate::prompts::{fill, CLASSIFICATION_PROMPT};
use crate::{question_of, workflow, Services};

const RIDDLE_MARKERS: &[&str] = &["What am I", "I am", "What has", "riddle"];
const SEARCH_MARKERS: &[&str] = &["weather", "current", "latest", "news", "today"];
const DEFAULT_INTENT: &str = "General information seeking";

/// What the first step learned about the question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub input_type: String,
    pub is_riddle: bool,
    pub needs_search: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub riddle_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    pub core_content: String,
    pub user_intent: String,
    #[serde(default)]
    pub badges: Vec<String>,
    pub next_action_word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsequent_action_word: Option<String>,
}

impl Classification {
    /// Read a model reply leniently: missing, null, empty or mistyped
    /// fields take their defaults.
    pub fn from_model_output(parsed: &Value, question: &str) -> Self {
        let input_type = text_field(parsed, "inputType").unwrap_or_else(|| "question".into());
        let is_riddle = flag(parsed, "isRiddle");
        let needs_search = flag(parsed, "needsSearch");
        let next_action_word = text_field(parsed, "nextActionWord").unwrap_or_else(|| {
            contextual_words(InputTraits {
                text: question,
                input_type: &input_type,
                is_riddle,
                needs_search,
            })
            .present_tense
        });

        Self {
            is_riddle,
            needs_search,
            riddle_answer: text_field(parsed, "riddleAnswer"),
            search_query: text_field(parsed, "searchQuery"),
            core_content: text_field(parsed, "coreContent").unwrap_or_else(|| question.into()),
            user_intent: text_field(parsed, "userIntent").unwrap_or_else(|| DEFAULT_INTENT.into()),
            badges: parsed["badges"]
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|b| b.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            next_action_word,
            subsequent_action_word: text_field(parsed, "subsequentActionWord"),
            input_type,
        }
    }

    /// Keyword classification used when the model is unavailable or
    /// replies with something unreadable.
    pub fn heuristic(question: &str) -> Self {
        let is_riddle = RIDDLE_MARKERS.iter().any(|m| question.contains(m));
        let needs_search = SEARCH_MARKERS.iter().any(|m| question.contains(m));

        let next_action_word = if needs_search {
            "investigating data sources"
        } else if is_riddle {
            "providing solution"
        } else {
            "crafting mysterious riddle"
        };

        Self {
            input_type: "question".into(),
            is_riddle,
            needs_search,
            riddle_answer: None,
            search_query: None,
            core_content: question.to_string(),
            user_intent: DEFAULT_INTENT.into(),
            badges: Vec::new(),
            next_action_word: next_action_word.into(),
            subsequent_action_word: needs_search.then(|| "weaving riddle patterns".to_string()),
        }
    }
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    value[key]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn flag(value: &Value, key: &str) -> bool {
    value[key].as_bool().unwrap_or(false)
}

/// Pull the first JSON object out of a reply that may wrap it in prose or
/// a code fence.
pub fn extract_json(text: &str) -> Result<Value> {
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str(&text[start..=end]).map_err(|e| RiddleError::LlmParse(e.to_string()))
        }
        _ => Err(RiddleError::LlmParse("reply contains no JSON object".into())),
    }
}

/// First step: decide whether the question is a riddle and whether it needs
/// a live search.
pub struct InputClassification {
    services: Services,
}

impl InputClassification {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn ask_model(&self, question: &str) -> Result<Classification> {
        let config = self.services.config.model_for(TaskKind::Classification);
        let prompt = fill(CLASSIFICATION_PROMPT, &[("question", question)]);
        let response = self
            .services
            .llm
            .chat(
                &config,
                vec![ChatMessage::system(prompt), ChatMessage::user(question)],
            )
            .await?;
        let parsed = extract_json(&response.text)?;
        Ok(Classification::from_model_output(&parsed, question))
    }

    pub async fn classify(&self, question: &str, search_requested: bool) -> Classification {
        let mut classification = match self.ask_model(question).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Classification failed, using keyword fallback");
                Classification::heuristic(question)
            }
        };
        classification.needs_search |= search_requested;
        debug!(
            is_riddle = classification.is_riddle,
            needs_search = classification.needs_search,
            next_action = %classification.next_action_word,
            "Question classified"
        );
        classification
    }
}

impl Stage for InputClassification {
    fn run(&self, input: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let question = question_of(&input, workflow::CLASSIFY)?;
            let search_requested = input["searchRequested"].as_bool().unwrap_or(false);
            let classification = self.classify(&question, search_requested).await;
            Ok(serde_json::to_value(classification)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use riddler_test_utils::{test_config, MockLlmClient};

    fn stage(llm: MockLlmClient) -> (InputClassification, Arc<MockLlmClient>) {
        let llm = Arc::new(llm);
        let services = Services::new(llm.clone(), None, test_config());
        (InputClassification::new(services), llm)
    }

    #[test]
    fn test_extract_json_from_fenced_reply() {
        let value = extract_json("Sure!\n```json\n{\"isRiddle\": true}\n```").unwrap();
        assert_eq!(value, json!({"isRiddle": true}));
        assert!(extract_json("no json here").is_err());
        assert!(extract_json("} backwards {").is_err());
    }

    #[test]
    fn test_lenient_defaults() {
        let c = Classification::from_model_output(
            &json!({"isRiddle": "yes", "coreContent": "", "badges": ["riddle_asked", 3]}),
            "What has a neck?",
        );
        assert_eq!(c.input_type, "question");
        assert!(!c.is_riddle);
        assert_eq!(c.core_content, "What has a neck?");
        assert_eq!(c.user_intent, DEFAULT_INTENT);
        assert_eq!(c.badges, vec!["riddle_asked".to_string()]);
        assert!(!c.next_action_word.is_empty());
    }

    #[test]
    fn test_heuristic() {
        let riddle = Classification::heuristic("What has keys but opens no locks?");
        assert!(riddle.is_riddle);
        assert!(!riddle.needs_search);
        assert_eq!(riddle.next_action_word, "providing solution");

        let search = Classification::heuristic("latest news on Mars");
        assert!(search.needs_search);
        assert_eq!(search.next_action_word, "investigating data sources");
        assert_eq!(search.subsequent_action_word.as_deref(), Some("weaving riddle patterns"));

        let plain = Classification::heuristic("the ocean");
        assert_eq!(plain.next_action_word, "crafting mysterious riddle");
    }

    #[tokio::test]
    async fn test_stage_uses_fast_model() {
        let (stage, llm) = stage(MockLlmClient::new().reply(
            r#"{"inputType":"question","isRiddle":true,"needsSearch":false,"riddleAnswer":"a piano","coreContent":"piano","nextActionWord":"deciphering"}"#,
        ));
        let out = stage.run(json!({"question": "What has keys but opens no locks?"})).await.unwrap();
        assert_eq!(out["isRiddle"], json!(true));
        assert_eq!(out["riddleAnswer"], json!("a piano"));
        assert_eq!(out["nextActionWord"], json!("deciphering"));
        assert!(out.get("searchQuery").is_none());

        let calls = llm.calls();
        assert_eq!(calls[0].model_id, "fast-model");
        assert_eq!(calls[0].max_tokens, 256);
        assert!(calls[0].messages[0].content.contains("Input: What has keys"));
    }

    #[tokio::test]
    async fn test_stage_falls_back_on_garbage() {
        let (stage, _) = stage(MockLlmClient::new().reply("I think it's a riddle"));
        let out = stage.run(json!({"question": "What am I? I have a face"})).await.unwrap();
        assert_eq!(out["isRiddle"], json!(true));
        assert_eq!(out["nextActionWord"], json!("providing solution"));
    }

    #[tokio::test]
    async fn test_search_requested_forces_search() {
        let (stage, _) = stage(MockLlmClient::new().fail("HTTP 500"));
        let out = stage
            .run(json!({"question": "volcanoes", "searchRequested": true}))
            .await
            .unwrap();
        assert_eq!(out["needsSearch"], json!(true));
    }

    #[tokio::test]
    async fn test_missing_question_fails() {
        let (stage, llm) = stage(MockLlmClient::new());
        assert!(stage.run(json!({"question": "  "})).await.is_err());
        assert_eq!(llm.call_count(), 0);
    }
}
