//! Mocks and fixtures shared by riddler test suites.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use futures::future::BoxFuture;

use riddler_core::config::{AppConfig, ModelConfig};
use riddler_core::error::{Result, RiddleError};
use riddler_core::traits::{LlmClient, SearchProvider};
use riddler_core::types::{ChatMessage, ChatResponse, SearchHit};

enum Scripted {
    Reply(String),
    Fail(String),
}

/// A recorded call to [`MockLlmClient::chat`].
#[derive(Debug, Clone)]
pub struct LlmCall {
    pub model_id: String,
    pub max_tokens: u32,
    pub messages: Vec<ChatMessage>,
}

impl LlmCall {
    /// Concatenated message contents, handy for prompt assertions.
    pub fn prompt(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// LLM client replaying a script of replies and failures in order.
///
/// Once the script runs out it answers with the default reply if one was
/// set, and fails otherwise. Models listed with [`fail_model`](Self::fail_model)
/// always fail without consuming the script.
#[derive(Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Scripted>>,
    default_reply: Option<String>,
    failing_models: HashSet<String>,
    calls: Mutex<Vec<LlmCall>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Scripted::Reply(text.into()));
        self
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Scripted::Fail(message.into()));
        self
    }

    pub fn default_reply(mut self, text: impl Into<String>) -> Self {
        self.default_reply = Some(text.into());
        self
    }

    pub fn fail_model(mut self, model_id: impl Into<String>) -> Self {
        self.failing_models.insert(model_id.into());
        self
    }

    pub fn calls(&self) -> Vec<LlmCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn push(&self, item: Scripted) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(item);
    }

    fn next(&self, model_id: &str) -> Result<String> {
        if self.failing_models.contains(model_id) {
            return Err(RiddleError::LlmRequest(format!("HTTP 503: {model_id} unavailable")));
        }
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Fail(message)) => Err(RiddleError::LlmRequest(message)),
            None => self
                .default_reply
                .clone()
                .ok_or_else(|| RiddleError::LlmRequest("no scripted response".into())),
        }
    }
}

impl LlmClient for MockLlmClient {
    fn chat(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<ChatResponse>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LlmCall {
                model_id: config.model_id.clone(),
                max_tokens: config.max_tokens,
                messages,
            });
        let result = self.next(&config.model_id);

        Box::pin(async move {
            let text = result?;
            Ok(ChatResponse::text(text))
        })
    }
}

/// Search provider returning fixed hits, or failing on demand.
#[derive(Default)]
pub struct MockSearch {
    hits: Vec<SearchHit>,
    failure: Option<String>,
    queries: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            ..Self::default()
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl SearchProvider for MockSearch {
    fn name(&self) -> &str {
        "mock"
    }

    fn search(&self, query: &str, limit: usize) -> BoxFuture<'_, Result<Vec<SearchHit>>> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.to_string());
        let result = match &self.failure {
            Some(message) => Err(RiddleError::Search(message.clone())),
            None => Ok(self.hits.iter().take(limit).cloned().collect()),
        };
        Box::pin(async move { result })
    }
}

/// Minimal config with a fast model, a creative model and no search.
pub fn test_config() -> AppConfig {
    let mut model = ModelConfig::new("openai", "fast-model");
    model.api_key = Some("test-key".into());
    let mut creative = ModelConfig::new("openai", "creative-model");
    creative.max_tokens = 512;
    AppConfig {
        model,
        creative_model: Some(creative),
        search: None,
        gateway: Default::default(),
        sessions: Default::default(),
    }
}

/// Write `contents` to a `config.toml` inside a fresh temp dir.
///
/// Keep the returned `TempDir` alive for as long as the path is used.
pub fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).expect("write config");
    (dir, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_order_and_default() {
        let llm = MockLlmClient::new().reply("one").fail("boom").default_reply("again");
        let config = ModelConfig::new("openai", "m");

        let first = llm.chat(&config, vec![ChatMessage::user("q")]).await.unwrap();
        assert_eq!(first.text, "one");
        assert!(llm.chat(&config, vec![]).await.is_err());
        assert_eq!(llm.chat(&config, vec![]).await.unwrap().text, "again");
        assert_eq!(llm.call_count(), 3);
        assert_eq!(llm.calls()[0].prompt(), "q");
    }

    #[tokio::test]
    async fn test_failing_model_keeps_script() {
        let llm = MockLlmClient::new().reply("kept").fail_model("big");
        assert!(llm.chat(&ModelConfig::new("openai", "big"), vec![]).await.is_err());
        let reply = llm.chat(&ModelConfig::new("openai", "small"), vec![]).await.unwrap();
        assert_eq!(reply.text, "kept");
    }

    #[tokio::test]
    async fn test_mock_search_limits_hits() {
        let search = MockSearch::new(vec![
            SearchHit::new("a", "1", "http://a"),
            SearchHit::new("b", "2", "http://b"),
        ]);
        let hits = search.search("weather", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(search.queries(), vec!["weather".to_string()]);
    }
}
