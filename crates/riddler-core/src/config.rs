use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RiddleError};

/// Top-level riddler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fast model used for classification, search answers and packaging.
    pub model: ModelConfig,
    /// Larger model used for riddle writing. Falls back to `model`.
    #[serde(default)]
    pub creative_model: Option<ModelConfig>,
    #[serde(default)]
    pub search: Option<SearchConfig>,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// The kind of work a model is being asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Classification,
    Creative,
}

impl TaskKind {
    /// Recommended completion budget for the task.
    pub fn max_tokens(self) -> u32 {
        match self {
            TaskKind::Classification => 256,
            TaskKind::Creative => 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 256 }
fn default_temperature() -> f32 { 0.0 }

impl ModelConfig {
    pub fn new(provider: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model_id: model_id.into(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry: None,
        }
    }
}

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 2 }
fn default_initial_backoff() -> u64 { 500 }
fn default_max_backoff() -> u64 { 10_000 }

/// Web search provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    pub api_key: String,
    /// Programmable search engine id (Google `cx`).
    #[serde(default)]
    pub engine_id: Option<String>,
    #[serde(default = "default_search_results")]
    pub max_results: usize,
}

fn default_search_provider() -> String { "google".to_string() }
fn default_search_results() -> usize { 3 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Deployment environment reported by `/health`.
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            environment: default_environment(),
        }
    }
}

fn default_bind() -> String { "127.0.0.1:8787".to_string() }
fn default_environment() -> String { "production".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Seconds between sweeps of finished sessions.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

fn default_cleanup_interval() -> u64 { 300 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| RiddleError::ConfigNotFound(path.display().to_string()))?;

        Self::parse(&content)
    }

    /// Parse config text, expanding `${ENV_VAR}` references first.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);

        toml::from_str(&expanded).map_err(|e| RiddleError::Config(e.to_string()))
    }

    /// Build a config purely from environment variables.
    ///
    /// Reads `RIDDLER_MODEL`, `RIDDLER_CREATIVE_MODEL`, `RIDDLER_BASE_URL`,
    /// `OPENAI_API_KEY`, `GOOGLE_SEARCH_API_KEY`, `GOOGLE_SEARCH_ENGINE_ID`
    /// and `RIDDLER_BIND`.
    pub fn from_env() -> Result<Self> {
        let model_id = std::env::var("RIDDLER_MODEL")
            .map_err(|_| RiddleError::Config("RIDDLER_MODEL is not set".into()))?;

        let mut model = ModelConfig::new("openai", model_id);
        model.api_key = std::env::var("OPENAI_API_KEY").ok();
        model.base_url = std::env::var("RIDDLER_BASE_URL").ok();

        let creative_model = std::env::var("RIDDLER_CREATIVE_MODEL").ok().map(|id| {
            let mut creative = model.clone();
            creative.model_id = id;
            creative.max_tokens = TaskKind::Creative.max_tokens();
            creative
        });

        let search = std::env::var("GOOGLE_SEARCH_API_KEY")
            .ok()
            .map(|api_key| SearchConfig {
                provider: default_search_provider(),
                api_key,
                engine_id: std::env::var("GOOGLE_SEARCH_ENGINE_ID").ok(),
                max_results: default_search_results(),
            });

        let mut gateway = GatewayConfig::default();
        if let Ok(bind) = std::env::var("RIDDLER_BIND") {
            gateway.bind = bind;
        }

        Ok(Self {
            model,
            creative_model,
            search,
            gateway,
            sessions: SessionsConfig::default(),
        })
    }

    /// Pick the model configuration for a task.
    pub fn model_for(&self, task: TaskKind) -> ModelConfig {
        let mut config = match task {
            TaskKind::Creative => self.creative_model.as_ref().unwrap_or(&self.model).clone(),
            TaskKind::Classification => self.model.clone(),
        };
        config.max_tokens = config.max_tokens.max(task.max_tokens());
        config
    }

    /// Whether a search backend is fully configured.
    pub fn search_enabled(&self) -> bool {
        self.search
            .as_ref()
            .is_some_and(|s| !s.api_key.is_empty() && s.engine_id.is_some())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Unset variables stay literal
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}
