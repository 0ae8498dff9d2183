use std::sync::Arc;

use chrono::{DateTime, Utc};

use riddler_core::config::GatewayConfig;
use riddler_pipeline::{SessionManager, Workflow};

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub workflow: Arc<Workflow>,
    pub sessions: Arc<SessionManager>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: GatewayConfig, workflow: Arc<Workflow>) -> Self {
        Self {
            config,
            sessions: Arc::new(SessionManager::in_memory(workflow.clone())),
            workflow,
            started_at: Utc::now(),
        }
    }

    /// Build stamp baked in at compile time, else the process start time.
    pub fn build_time(&self) -> String {
        option_env!("RIDDLER_BUILD_TIME")
            .map(str::to_string)
            .unwrap_or_else(|| self.started_at.to_rfc3339())
    }
}
