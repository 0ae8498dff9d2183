//! Resumable sessions on top of the executor.

pub mod manager;
pub mod state;
pub mod store;

pub use manager::SessionManager;
pub use state::{SessionProgress, SessionState};
pub use store::{InMemorySessionStore, SessionStore};
