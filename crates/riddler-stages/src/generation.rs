use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use riddler_core::config::{ModelConfig, TaskKind};
use riddler_core::error::Result;
use riddler_core::types::ChatMessage;
use riddler_pipeline::Stage;

use crate::prompts::{fill, RIDDLE_PROMPT};
use crate::Services;

pub const STUMPER: &str = "I present a mystery that cannot be easily solved.";
pub const NO_ANSWER: &str = "I understand you asked a riddle, but I cannot provide the answer.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    RiddleAnswer,
    GeneratedRiddle,
    StumperResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContent {
    pub final_response: String,
    pub response_type: ResponseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub riddle_target: Option<String>,
    pub next_action_word: String,
}

fn non_empty<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input[key].as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// Answer a riddle the user posed, using the answer found during
/// classification.
pub fn direct_answer(input: &Value) -> GeneratedContent {
    match non_empty(input, "riddleAnswer") {
        Some(answer) => GeneratedContent {
            final_response: answer.to_string(),
            response_type: ResponseType::RiddleAnswer,
            riddle_target: Some(answer.to_string()),
            next_action_word: "finalizing response".into(),
        },
        None => GeneratedContent {
            final_response: NO_ANSWER.into(),
            response_type: ResponseType::StumperResponse,
            riddle_target: None,
            next_action_word: "finalizing response".into(),
        },
    }
}

/// Third step: answer the user's riddle or write a new one.
///
/// New riddles go to the creative model first, then the default model with
/// a smaller budget, then a fixed stumper line.
pub struct ResponseGeneration {
    services: Services,
}

impl ResponseGeneration {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn write_riddle(&self, config: &ModelConfig, content: &str) -> Result<String> {
        let response = self
            .services
            .llm
            .chat(
                config,
                vec![
                    ChatMessage::system(fill(RIDDLE_PROMPT, &[("content", content)])),
                    ChatMessage::user(format!("Create a riddle about: {content}")),
                ],
            )
            .await?;
        Ok(response.text.trim().to_string())
    }

    pub async fn generate_riddle(&self, input: &Value) -> GeneratedContent {
        let content = non_empty(input, "searchContent")
            .or_else(|| non_empty(input, "content"))
            .or_else(|| non_empty(input, "question"))
            .unwrap_or("a mystery")
            .to_string();

        let creative = self.services.config.model_for(TaskKind::Creative);
        let mut fallback = self.services.config.model.clone();
        fallback.max_tokens = TaskKind::Classification.max_tokens();

        let mut riddle = None;
        for config in [&creative, &fallback] {
            match self.write_riddle(config, &content).await {
                Ok(text) if !text.is_empty() => {
                    info!(model = %config.model_id, "Riddle generated");
                    riddle = Some(text);
                    break;
                }
                Ok(_) => warn!(model = %config.model_id, "Model returned an empty riddle"),
                Err(e) => warn!(model = %config.model_id, error = %e, "Riddle generation failed"),
            }
        }

        match riddle {
            Some(text) => GeneratedContent {
                final_response: text,
                response_type: ResponseType::GeneratedRiddle,
                riddle_target: Some(content),
                next_action_word: "finalizing response".into(),
            },
            None => GeneratedContent {
                final_response: STUMPER.into(),
                response_type: ResponseType::StumperResponse,
                riddle_target: Some(content),
                next_action_word: "finalizing response".into(),
            },
        }
    }

    pub async fn execute(&self, input: &Value) -> GeneratedContent {
        let is_riddle = input["isRiddle"].as_bool().unwrap_or(false);
        if is_riddle && non_empty(input, "riddleAnswer").is_some() {
            direct_answer(input)
        } else {
            self.generate_riddle(input).await
        }
    }
}

impl Stage for ResponseGeneration {
    fn run(&self, input: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let generated = self.execute(&input).await;
            Ok(serde_json::to_value(generated)?)
        })
    }
}
