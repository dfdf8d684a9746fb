//! Background removal of abandoned upload sessions
//!
//! A session that is neither completed nor cancelled (browser closed, client
//! crashed) would otherwise keep its chunks in staging forever.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::UploadResult;
use crate::services::upload_coordinator::UploadCoordinator;

/// Periodically cleans sessions untouched for longer than a TTL
pub struct StaleSessionSweeper {
    coordinator: Arc<UploadCoordinator>,
    ttl: Duration,
    interval: Duration,
}

impl StaleSessionSweeper {
    pub fn new(coordinator: Arc<UploadCoordinator>, ttl: Duration, interval: Duration) -> Self {
        Self {
            coordinator,
            ttl,
            interval,
        }
    }

    /// Sweep every staged session once
    ///
    /// # Returns
    /// Number of sessions removed
    pub async fn sweep_once(&self) -> UploadResult<usize> {
        let sessions = self.coordinator.chunk_store().list_sessions().await?;
        let mut removed = 0;

        for session_id in sessions {
            match self.coordinator.expire_if_stale(&session_id, self.ttl).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(session_id = %session_id, "Failed to sweep session: {}", e),
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Stale session sweep complete");
        }
        Ok(removed)
    }

    /// Run `sweep_once` every interval until `shutdown` is cancelled
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Stale session sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            tracing::warn!("Stale session sweep failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}
