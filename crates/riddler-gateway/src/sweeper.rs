use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use riddler_pipeline::SessionManager;

/// Periodically removes completed and cancelled sessions.
pub struct SessionSweeper {
    sessions: Arc<SessionManager>,
    interval: Duration,
    cancel: CancellationToken,
}

impl SessionSweeper {
    pub fn new(sessions: Arc<SessionManager>, interval_secs: u64, cancel: CancellationToken) -> Self {
        Self {
            sessions,
            interval: Duration::from_secs(interval_secs.max(1)),
            cancel,
        }
    }

    /// Run the sweep loop. Blocks until cancelled.
    pub async fn run(&self) {
        info!(interval_secs = self.interval.as_secs(), "Session sweeper started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.cancel.cancelled() => {
                    info!("Session sweeper shutting down");
                    break;
                }
            }

            match self.sessions.cleanup().await {
                Ok(removed) => debug!(removed, "Session sweep finished"),
                Err(e) => warn!(error = %e, "Session sweep failed"),
            }
        }
    }
}
