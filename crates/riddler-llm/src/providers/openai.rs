use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use riddler_core::config::ModelConfig;
use riddler_core::error::{Result, RiddleError};
use riddler_core::traits::LlmClient;
use riddler_core::types::*;

use super::presets;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible client. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter, etc.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize, Debug, PartialEq)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn convert_messages(messages: Vec<ChatMessage>) -> Vec<OaiMessage> {
    messages
        .into_iter()
        .map(|msg| OaiMessage {
            role: match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: msg.content,
        })
        .collect()
}

fn endpoint(config: &ModelConfig) -> &str {
    config
        .base_url
        .as_deref()
        .or_else(|| presets::get_preset(&config.provider).map(|p| p.default_base_url))
        .unwrap_or(OPENAI_API_URL)
}

fn parse_completion(body: &str) -> Result<ChatResponse> {
    let completion: ChatCompletion =
        serde_json::from_str(body).map_err(|e| RiddleError::LlmParse(e.to_string()))?;

    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| RiddleError::LlmParse("response has no choices".into()))?;

    let stop_reason = match choice.finish_reason.as_deref() {
        Some("stop") | None => StopReason::EndTurn,
        Some("length") => StopReason::MaxTokens,
        Some(other) => StopReason::Other(other.to_string()),
    };
    let (input_tokens, output_tokens) = completion
        .usage
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    Ok(ChatResponse {
        text: choice.message.content.unwrap_or_default(),
        stop_reason,
        input_tokens,
        output_tokens,
    })
}

impl LlmClient for OpenAiClient {
    fn chat(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<ChatResponse>> {
        let config = config.clone();

        Box::pin(async move {
            let url = endpoint(&config).to_string();

            let body = ChatRequest {
                model: config.model_id.clone(),
                messages: convert_messages(messages),
                max_tokens: config.max_tokens,
                temperature: if config.temperature > 0.0 {
                    Some(config.temperature)
                } else {
                    None
                },
                stream: false,
            };

            let mut req = self.http.post(&url).json(&body);

            if let Some(api_key) = &config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }
            if let Some(preset) = presets::get_preset(&config.provider) {
                for (k, v) in preset.extra_headers {
                    req = req.header(*k, *v);
                }
            }

            let response = req
                .send()
                .await
                .map_err(|e| RiddleError::LlmRequest(e.to_string()))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| RiddleError::LlmRequest(e.to_string()))?;

            if !status.is_success() {
                return Err(RiddleError::LlmRequest(format!("HTTP {}: {}", status, text)));
            }

            let parsed = parse_completion(&text)?;
            debug!(
                model = %config.model_id,
                input_tokens = parsed.input_tokens,
                output_tokens = parsed.output_tokens,
                "Chat completion received"
            );
            Ok(parsed)
        })
    }
}
