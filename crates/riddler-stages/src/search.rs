use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use riddler_core::config::{SearchConfig, TaskKind};
use riddler_core::error::{Result, RiddleError};
use riddler_core::traits::SearchProvider;
use riddler_core::types::{ChatMessage, SearchHit};
use riddler_pipeline::Stage;

use crate::prompts::{fill, KNOWLEDGE_ANSWER_PROMPT, SEARCH_ANSWER_PROMPT};
use crate::{question_of, workflow, Services};

const GOOGLE_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";
/// Hits quoted to the model when answering from search.
const CONTEXT_HITS: usize = 2;

/// Google Programmable Search client.
pub struct GoogleSearch {
    api_key: String,
    engine_id: String,
    http: reqwest::Client,
}

impl GoogleSearch {
    pub fn new(api_key: &str, engine_id: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            engine_id: engine_id.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Build from config, if a key and engine id are both present.
    pub fn from_config(config: &SearchConfig) -> Option<Self> {
        let engine_id = config.engine_id.as_deref()?;
        (!config.api_key.is_empty()).then(|| Self::new(&config.api_key, engine_id))
    }

    fn url(&self, query: &str, limit: usize) -> String {
        format!(
            "{GOOGLE_SEARCH_URL}?key={}&cx={}&q={}&num={}",
            urlencoding::encode(&self.api_key),
            urlencoding::encode(&self.engine_id),
            urlencoding::encode(query),
            limit.clamp(1, 10)
        )
    }
}

#[derive(Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<SearchHit>,
}

impl SearchProvider for GoogleSearch {
    fn name(&self) -> &str {
        "google"
    }

    fn search(&self, query: &str, limit: usize) -> BoxFuture<'_, Result<Vec<SearchHit>>> {
        let url = self.url(query, limit);
        Box::pin(async move {
            let resp = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| RiddleError::Search(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(RiddleError::Search(format!("HTTP {status}")));
            }

            let body: GoogleResponse = resp
                .json()
                .await
                .map_err(|e| RiddleError::Search(e.to_string()))?;
            Ok(body.items)
        })
    }
}

/// Where an answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    Search,
    Knowledge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub search_performed: bool,
    #[serde(default)]
    pub search_results: Vec<SearchHit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_search_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_source: Option<AnswerSource>,
}

impl SearchOutcome {
    pub fn skipped() -> Self {
        Self {
            search_performed: false,
            search_results: Vec::new(),
            answer_content: None,
            actual_search_query: None,
            answer_source: None,
        }
    }
}

/// `"title: snippet"` for the top hits, blank-line separated.
pub fn search_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .take(CONTEXT_HITS)
        .map(|h| format!("{}: {}", h.title, h.snippet))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn pick_query(input: &Value, question: &str) -> String {
    if input["inputType"].as_str() == Some("url") {
        return question.to_string();
    }
    ["searchQuery", "coreContent"]
        .iter()
        .filter_map(|k| input[*k].as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(question)
        .to_string()
}

/// Optional step: look the question up and answer it in a few sentences.
///
/// Without a configured provider, or when the provider fails or finds
/// nothing, the answer comes from the model's general knowledge.
pub struct SearchAnswer {
    services: Services,
}

impl SearchAnswer {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn lookup(&self, provider: &Arc<dyn SearchProvider>, query: &str) -> Vec<SearchHit> {
        let limit = self
            .services
            .config
            .search
            .as_ref()
            .map(|s| s.max_results)
            .unwrap_or(3);
        match provider.search(query, limit).await {
            Ok(hits) => {
                info!(provider = provider.name(), query, hits = hits.len(), "Search completed");
                hits
            }
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "Search failed, answering from knowledge");
                Vec::new()
            }
        }
    }

    async fn answer(&self, prompt: String) -> Result<String> {
        let config = self.services.config.model_for(TaskKind::Classification);
        let response = self
            .services
            .llm
            .chat(&config, vec![ChatMessage::user(prompt)])
            .await?;
        Ok(response.text.trim().to_string())
    }

    pub async fn execute(&self, input: &Value) -> Result<SearchOutcome> {
        if !input["needsSearch"].as_bool().unwrap_or(false) {
            debug!("Search not needed");
            return Ok(SearchOutcome::skipped());
        }

        let question = question_of(input, workflow::SEARCH)?;
        let query = pick_query(input, &question);

        let hits = match &self.services.search {
            Some(provider) => self.lookup(provider, &query).await,
            None => Vec::new(),
        };

        if hits.is_empty() {
            let topic = input["coreContent"].as_str().unwrap_or(&question).to_string();
            let prompt = fill(KNOWLEDGE_ANSWER_PROMPT, &[("topic", &topic), ("question", &question)]);
            return Ok(SearchOutcome {
                search_performed: false,
                search_results: Vec::new(),
                answer_content: Some(self.answer(prompt).await?),
                actual_search_query: Some(query),
                answer_source: Some(AnswerSource::Knowledge),
            });
        }

        let context = search_context(&hits);
        let prompt = fill(SEARCH_ANSWER_PROMPT, &[("context", &context), ("question", &question)]);
        Ok(SearchOutcome {
            search_performed: true,
            answer_content: Some(self.answer(prompt).await?),
            search_results: hits,
            actual_search_query: Some(query),
            answer_source: Some(AnswerSource::Search),
        })
    }
}

impl Stage for SearchAnswer {
    fn run(&self, input: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let outcome = self.execute(&input).await?;
            Ok(serde_json::to_value(outcome)?)
        })
    }
}
