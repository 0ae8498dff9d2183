use futures::future::BoxFuture;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// Single-shot chat completion against one model.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and wait for the full completion.
    fn chat(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<ChatResponse>>;
}

/// Web search backend.
pub trait SearchProvider: Send + Sync + 'static {
    /// Provider name (e.g., "google").
    fn name(&self) -> &str;

    /// Run a query and return at most `limit` hits.
    fn search(&self, query: &str, limit: usize) -> BoxFuture<'_, Result<Vec<SearchHit>>>;
}
