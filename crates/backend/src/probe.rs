//! Backend connectivity probing and the process-wide connectivity status.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use keyward_core::config::AuthConfig;
use keyward_core::error::CoreError;
use keyward_core::signatures::FaultSignatures;
use keyward_core::types::Timestamp;
use serde::Serialize;

use crate::client::TableQuery;
use crate::error::BackendError;
use crate::handle::CredentialHandle;

/// Table read by the probe. Every deployment has it.
pub const PROBE_TABLE: &str = "users";

/// Process-wide view of backend reachability. Starts optimistic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectivityStatus {
    pub is_connected: bool,
    /// Total failed probes since start.
    pub error_count: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_success: Option<Timestamp>,
}

impl Default for ConnectivityStatus {
    fn default() -> Self {
        Self {
            is_connected: true,
            error_count: 0,
            consecutive_failures: 0,
            last_error: None,
            last_success: None,
        }
    }
}

/// Issues a minimal read against a handle and folds the outcome into
/// [`ConnectivityStatus`].
///
/// `is_connected` only flips to `false` once `consecutive_failures` reaches
/// the tolerance, so isolated blips do not make the status flap. Concurrent
/// probes (scheduler plus request-triggered) may interleave their updates;
/// the counters are advisory.
#[derive(Debug)]
pub struct ConnectivityProbe {
    status: Mutex<ConnectivityStatus>,
    tolerance: u32,
    timeout: Duration,
    signatures: FaultSignatures,
}

impl ConnectivityProbe {
    pub fn new(tolerance: u32, timeout: Duration) -> Self {
        Self {
            status: Mutex::new(ConnectivityStatus::default()),
            tolerance: tolerance.max(1),
            timeout,
            signatures: FaultSignatures::default(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.failure_tolerance, config.probe_timeout)
    }

    pub fn tolerance(&self) -> u32 {
        self.tolerance
    }

    /// Probe `handle`; `true` when the backend answered.
    pub async fn test(&self, handle: &CredentialHandle) -> bool {
        self.check(handle).await.is_ok()
    }

    /// Probe `handle`, returning the classified fault on failure.
    ///
    /// Updates both the handle's own health and the shared status.
    pub async fn check(&self, handle: &CredentialHandle) -> Result<(), CoreError> {
        let query = TableQuery::new(PROBE_TABLE).select("id").limit(1);
        let outcome = match tokio::time::timeout(self.timeout, handle.backend().select(&query)).await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BackendError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(()) => {
                handle.record_success();
                self.record_success();
                Ok(())
            }
            Err(e) => {
                let err = e.into_core(&self.signatures);
                handle.record_failure();
                self.record_failure(&err.to_string());
                tracing::warn!(role = %handle.role(), error = %err, "Backend probe failed");
                Err(err)
            }
        }
    }

    pub fn record_success(&self) {
        let mut status = self.lock();
        if !status.is_connected {
            tracing::info!(
                after_failures = status.consecutive_failures,
                "Backend connectivity restored"
            );
        }
        status.consecutive_failures = 0;
        status.is_connected = true;
        status.last_success = Some(Utc::now());
    }

    pub fn record_failure(&self, error: &str) {
        let mut status = self.lock();
        status.error_count += 1;
        status.consecutive_failures = status.consecutive_failures.saturating_add(1);
        status.last_error = Some(error.to_string());
        if status.is_connected && status.consecutive_failures >= self.tolerance {
            status.is_connected = false;
            tracing::error!(
                consecutive_failures = status.consecutive_failures,
                tolerance = self.tolerance,
                "Backend marked disconnected"
            );
        }
    }

    pub fn status(&self) -> ConnectivityStatus {
        self.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_connected
    }

    fn lock(&self) -> MutexGuard<'_, ConnectivityStatus> {
        self.status.lock().unwrap_or_else(|p| p.into_inner())
    }
}
