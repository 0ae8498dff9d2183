pub mod providers;
pub mod retry;

use riddler_core::config::ModelConfig;
use riddler_core::traits::LlmClient;

pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client based on the provider name.
///
/// Every supported provider speaks the OpenAI chat-completions protocol;
/// a `[model.retry]` section wraps the client in a [`RetryingClient`].
pub fn create_client(config: &ModelConfig) -> Box<dyn LlmClient> {
    let client: Box<dyn LlmClient> = Box::new(OpenAiClient::new());
    match &config.retry {
        Some(retry) => Box::new(RetryingClient::new(client, Vec::new(), retry.clone())),
        None => client,
    }
}
