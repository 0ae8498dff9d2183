use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use riddler_core::error::{Result, RiddleError};
use riddler_core::types::SessionId;

use super::state::{SessionProgress, SessionState};
use super::store::{InMemorySessionStore, SessionStore};
use crate::graph::{Advance, Workflow};

/// Per-session coordination that is never persisted.
#[derive(Clone, Default)]
struct SessionHandle {
    /// Held for the whole of `start`/`continue`.
    lock: Arc<tokio::sync::Mutex<()>>,
    cancel: CancellationToken,
}

/// Drives resumable runs of one workflow.
///
/// Sessions are keyed by an external id. `start` runs until the first yield
/// point, each `continue_session` runs to the next one, and the last call
/// completes the run. Calls for the same id are serialised; calls for
/// different ids proceed independently.
pub struct SessionManager {
    workflow: Arc<Workflow>,
    store: Arc<dyn SessionStore>,
    handles: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionManager {
    pub fn new(workflow: Arc<Workflow>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            workflow,
            store,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Manager backed by an [`InMemorySessionStore`].
    pub fn in_memory(workflow: Arc<Workflow>) -> Self {
        Self::new(workflow, Arc::new(InMemorySessionStore::new()))
    }

    pub fn workflow(&self) -> &Arc<Workflow> {
        &self.workflow
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Create a session and run it to its first yield point.
    ///
    /// An existing session with the same id is replaced. A run still in
    /// flight under that id is cancelled and allowed to finish its step
    /// before the new session is stored.
    pub async fn start(&self, input: Value, id: &SessionId) -> Result<SessionProgress> {
        let handle = SessionHandle::default();
        let _guard = handle.lock.lock().await;
        let previous = self.handles().insert(id.to_string(), handle.clone());
        if let Some(previous) = previous {
            previous.cancel.cancel();
            // Let the stale run write its last state before ours replaces it.
            drop(previous.lock.lock().await);
        }

        let run = match self.workflow.start_state(input) {
            Ok(run) => run,
            Err(e) => {
                self.forget(id.as_str(), &handle);
                return Err(e);
            }
        };
        let mut session = SessionState::new(id.clone(), run);
        info!(session_id = %id, steps = session.run.order.len(), "Session started");

        self.advance(&mut session, &handle.cancel).await?;
        Ok(session.progress())
    }

    /// Resume a session from its recorded position.
    ///
    /// Cancelled and completed sessions return their terminal descriptor
    /// without running anything. When `expected_step` is given it must match
    /// the step the session is waiting at.
    pub async fn continue_session(
        &self,
        id: &str,
        expected_step: Option<&str>,
    ) -> Result<SessionProgress> {
        let (handle, _guard) = self.lock_current(id).await;

        let Some(mut session) = self.store.get(id).await? else {
            self.forget(id, &handle);
            return Err(RiddleError::SessionNotFound(id.to_string()));
        };

        if !session.is_finished() && handle.cancel.is_cancelled() {
            session.cancelled = true;
            session.touch();
            self.store.put(session.clone()).await?;
        }
        if session.is_finished() {
            debug!(
                session_id = %id,
                completed = session.completed,
                cancelled = session.cancelled,
                "Continue on finished session"
            );
            return Ok(session.progress());
        }

        if let Some(expected) = expected_step {
            if session.next_step.as_deref() != Some(expected) {
                return Err(RiddleError::StepMismatch {
                    expected: expected.to_string(),
                    actual: session.next_step.clone().unwrap_or_else(|| "none".into()),
                });
            }
        }

        self.advance(&mut session, &handle.cancel).await?;
        Ok(session.progress())
    }

    /// Mark a session cancelled.
    ///
    /// Cooperative: a step already executing runs to completion, and the
    /// run stops before the next one.
    pub async fn cancel(&self, id: &str) -> Result<()> {
        if self.store.get(id).await?.is_none() {
            return Err(RiddleError::SessionNotFound(id.to_string()));
        }

        let handle = self.handle(id);
        handle.cancel.cancel();

        // A `continue` in flight persists the flag itself.
        if let Ok(_guard) = handle.lock.try_lock() {
            if let Some(mut session) = self.store.get(id).await? {
                session.cancelled = true;
                session.touch();
                self.store.put(session).await?;
            }
        }
        info!(session_id = %id, "Session cancelled");
        Ok(())
    }

    /// Snapshot a session without advancing it.
    pub async fn get_status(&self, id: &str) -> Result<Option<SessionProgress>> {
        Ok(self.store.get(id).await?.map(|s| s.progress()))
    }

    /// Remove every completed or cancelled session. Returns how many went.
    pub async fn cleanup(&self) -> Result<usize> {
        let mut removed = 0;
        for session in self.store.list().await? {
            if !session.is_finished() {
                continue;
            }
            let id = session.id.to_string();
            if self.store.delete(&id).await? {
                removed += 1;
            }
            self.handles().remove(&id);
        }
        if removed > 0 {
            info!(removed, "Cleaned up finished sessions");
        }
        Ok(removed)
    }

    async fn advance(&self, session: &mut SessionState, cancel: &CancellationToken) -> Result<()> {
        let from = session.run.position;
        let outcome = self
            .workflow
            .run_until_suspension(&mut session.run, from, Some(cancel))
            .await;
        session.touch();

        match outcome {
            Ok(Advance::Suspended(record)) => {
                session.next_step = record
                    .response
                    .next_step
                    .clone()
                    .or_else(|| session.run.current_step().map(str::to_string));
                debug!(
                    session_id = %session.id,
                    yield_point = %record.name,
                    next_step = ?session.next_step,
                    "Session suspended"
                );
                session.yields.push(record);
            }
            Ok(Advance::Completed) => {
                session.completed = true;
                session.next_step = None;
                session.output = Some(self.workflow.final_value(&session.run));
                info!(
                    session_id = %session.id,
                    executed = session.run.results.len(),
                    "Session completed"
                );
            }
            Ok(Advance::Cancelled) => {
                session.cancelled = true;
                info!(session_id = %session.id, "Session stopped by cancellation");
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Session step failed");
                session.cancelled |= cancel.is_cancelled();
                self.store.put(session.clone()).await?;
                return Err(e);
            }
        }

        // A cancel during the step could not take the lock to record itself.
        if cancel.is_cancelled() && !session.completed {
            session.cancelled = true;
        }
        self.store.put(session.clone()).await?;

        // Same for a cancel that landed between the check and the write.
        if cancel.is_cancelled() && !session.is_finished() {
            session.cancelled = true;
            self.store.put(session.clone()).await?;
        }
        Ok(())
    }

    fn handle(&self, id: &str) -> SessionHandle {
        self.handles().entry(id.to_string()).or_default().clone()
    }

    /// Lock the id's handle, retrying if `start` swapped it out meanwhile.
    async fn lock_current(&self, id: &str) -> (SessionHandle, tokio::sync::OwnedMutexGuard<()>) {
        loop {
            let handle = self.handle(id);
            let guard = handle.lock.clone().lock_owned().await;
            if self.is_current(id, &handle) {
                return (handle, guard);
            }
        }
    }

    fn is_current(&self, id: &str, handle: &SessionHandle) -> bool {
        self.handles()
            .get(id)
            .is_some_and(|h| Arc::ptr_eq(&h.lock, &handle.lock))
    }

    /// Drop the id's handle unless `start` has already replaced it.
    fn forget(&self, id: &str, handle: &SessionHandle) {
        let mut handles = self.handles();
        if handles.get(id).is_some_and(|h| Arc::ptr_eq(&h.lock, &handle.lock)) {
            handles.remove(id);
        }
    }

    /// Number of ids with live coordination state.
    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.handles().len()
    }

    fn handles(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
