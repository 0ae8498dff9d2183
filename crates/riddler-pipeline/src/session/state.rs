use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use riddler_core::types::SessionId;

use crate::graph::{RunState, YieldRecord};

/// Persisted progress of one resumable run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub id: SessionId,
    pub run: RunState,
    /// Label the client must echo back on `continue`, if it checks order.
    pub next_step: Option<String>,
    pub cancelled: bool,
    pub completed: bool,
    /// Final value once completed.
    pub output: Option<Value>,
    /// Every yield the session has paused on, oldest first.
    pub yields: Vec<YieldRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(id: SessionId, run: RunState) -> Self {
        let now = Utc::now();
        Self {
            id,
            next_step: run.current_step().map(str::to_string),
            run,
            cancelled: false,
            completed: false,
            output: None,
            yields: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Completed or cancelled; eligible for cleanup.
    pub fn is_finished(&self) -> bool {
        self.completed || self.cancelled
    }

    pub fn last_yield(&self) -> Option<&YieldRecord> {
        self.yields.last()
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Non-mutating snapshot for clients.
    pub fn progress(&self) -> SessionProgress {
        let total = self.run.order.len();
        let done = self.run.position.min(total);
        let suspended = !self.is_finished();
        let label = self.last_yield().filter(|_| suspended).map(|y| &y.response);

        SessionProgress {
            session_id: self.id.to_string(),
            payload: self.payload(),
            next_step: if suspended { self.next_step.clone() } else { None },
            can_continue: suspended,
            progress: format!("{done}/{total} steps complete"),
            completed: self.completed,
            cancelled: self.cancelled,
            action: label.and_then(|r| r.action.clone()),
            completed_action: label.and_then(|r| r.completed_action.clone()),
        }
    }

    fn payload(&self) -> Value {
        if self.completed {
            if let Some(output) = &self.output {
                return output.clone();
            }
        }
        if let Some(record) = self.last_yield() {
            if !record.response.payload.is_null() {
                return record.response.payload.clone();
            }
        }
        let results: Map<String, Value> = self
            .run
            .results
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Value::Object(results)
    }
}

/// Client-facing progress descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub session_id: String,
    pub payload: Value,
    pub next_step: Option<String>,
    pub can_continue: bool,
    /// `"k/n steps complete"`, where `k` is the resume position in the
    /// scheduler order. Guard-skipped steps count as passed, not executed.
    pub progress: String,
    pub completed: bool,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_action: Option<String>,
}
