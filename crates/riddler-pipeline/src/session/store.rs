use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use futures::future::BoxFuture;

use riddler_core::error::Result;

use super::state::SessionState;

/// Persistence backend for session state.
pub trait SessionStore: Send + Sync + 'static {
    fn get(&self, id: &str) -> BoxFuture<'_, Result<Option<SessionState>>>;

    /// Insert or replace.
    fn put(&self, state: SessionState) -> BoxFuture<'_, Result<()>>;

    /// Returns whether a session was removed.
    fn delete(&self, id: &str) -> BoxFuture<'_, Result<bool>>;

    fn list(&self) -> BoxFuture<'_, Result<Vec<SessionState>>>;
}

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, id: &str) -> BoxFuture<'_, Result<Option<SessionState>>> {
        let id = id.to_string();
        Box::pin(async move {
            let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(sessions.get(&id).cloned())
        })
    }

    fn put(&self, state: SessionState) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            sessions.insert(state.id.to_string(), state);
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, Result<bool>> {
        let id = id.to_string();
        Box::pin(async move {
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(sessions.remove(&id).is_some())
        })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<SessionState>>> {
        Box::pin(async move {
            let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(sessions.values().cloned().collect())
        })
    }
}
