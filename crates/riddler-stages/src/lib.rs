//! The riddle workflow: classify a question, optionally search, then answer
//! the user's riddle or write a new one.

pub mod action_words;
pub mod assembly;
pub mod classification;
pub mod generation;
pub mod prompts;
pub mod search;
pub mod workflow;

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use riddler_core::config::AppConfig;
use riddler_core::error::{Result, RiddleError};
use riddler_core::traits::{LlmClient, SearchProvider};

pub use assembly::AssembledResponse;
pub use classification::Classification;
pub use generation::{GeneratedContent, ResponseType};
pub use search::{GoogleSearch, SearchOutcome};
pub use workflow::riddle_workflow;

/// Shared handles every stage needs.
#[derive(Clone)]
pub struct Services {
    pub llm: Arc<dyn LlmClient>,
    pub search: Option<Arc<dyn SearchProvider>>,
    pub config: Arc<AppConfig>,
}

impl Services {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        search: Option<Arc<dyn SearchProvider>>,
        config: AppConfig,
    ) -> Self {
        Self {
            llm,
            search,
            config: Arc::new(config),
        }
    }

    /// Real clients built from config.
    pub fn from_config(config: AppConfig) -> Self {
        let llm: Arc<dyn LlmClient> = Arc::from(riddler_llm::create_client(&config.model));
        let search = config
            .search
            .as_ref()
            .filter(|s| s.provider == "google")
            .and_then(GoogleSearch::from_config)
            .map(|g| Arc::new(g) as Arc<dyn SearchProvider>);

        info!(
            model = %config.model.model_id,
            creative_model = config.creative_model.as_ref().map(|m| m.model_id.as_str()),
            search = search.is_some(),
            "Riddle services ready"
        );
        Self::new(llm, search, config)
    }
}

/// The trimmed `question` field of `step`'s input.
pub(crate) fn question_of(input: &Value, step: &str) -> Result<String> {
    input["question"]
        .as_str()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RiddleError::StepFailed {
            step: step.to_string(),
            message: "Question is required".into(),
        })
}
