//! Periodic hard-deletion of long-expired sessions.
//!
//! Expired rows are kept for `grace_days` so recent logins stay auditable,
//! then purged through [`SessionRegistry::cleanup_expired`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::sessions::SessionRegistry;

/// Run the session cleanup loop until `cancel` is triggered.
///
/// The first pass runs immediately.
pub async fn run(
    registry: Arc<SessionRegistry>,
    grace_days: i64,
    every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        grace_days,
        interval_secs = every.as_secs(),
        "Session cleanup job started"
    );

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session cleanup job stopping");
                break;
            }
            _ = interval.tick() => {
                match registry.cleanup_expired(grace_days).await {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!(deleted, "Session cleanup: purged expired sessions");
                    }
                    Ok(_) => tracing::debug!("Session cleanup: nothing to purge"),
                    Err(e) => {
                        tracing::error!(error = %e, "Session cleanup: purge failed");
                    }
                }
            }
        }
    }
}
