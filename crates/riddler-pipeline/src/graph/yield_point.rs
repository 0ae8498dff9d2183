use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use riddler_core::error::Result;

/// Signature of a yield function: snapshot in, descriptor out.
pub type YieldFn = Arc<dyn Fn(&Value) -> Result<YieldResponse> + Send + Sync>;

/// What a yield point reports when a session pauses on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldResponse {
    /// Step the client should resume at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
    /// Present-tense label for the work about to happen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Past-tense label for the work just finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_action: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl YieldResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_step(mut self, step: impl Into<String>) -> Self {
        self.next_step = Some(step.into());
        self
    }

    pub fn action(mut self, label: impl Into<String>) -> Self {
        self.action = Some(label.into());
        self
    }

    pub fn completed_action(mut self, label: impl Into<String>) -> Self {
        self.completed_action = Some(label.into());
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// A named checkpoint that fires after any of the steps in `after`.
#[derive(Clone)]
pub struct YieldPoint {
    pub name: String,
    pub after: Vec<String>,
    pub(crate) func: YieldFn,
}

impl YieldPoint {
    pub fn fires_after(&self, step: &str) -> bool {
        self.after.iter().any(|s| s == step)
    }

    pub fn respond(&self, snapshot: &Value) -> Result<YieldResponse> {
        (self.func)(snapshot)
    }
}

impl fmt::Debug for YieldPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YieldPoint")
            .field("name", &self.name)
            .field("after", &self.after)
            .finish()
    }
}
