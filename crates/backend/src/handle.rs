//! A cached, role-scoped connection to the backend.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use keyward_core::types::Role;
use tokio::time::Instant;

use crate::client::Backend;

#[derive(Debug, Default)]
struct Health {
    last_healthy_at: Option<Instant>,
    consecutive_failures: u32,
    last_check_failed: bool,
}

/// One backend connection plus the bookkeeping the cache needs to decide
/// whether it is still fit for use.
///
/// Handles are only ever shared as `Arc<CredentialHandle>`; the cache owns
/// the canonical reference and replaces it wholesale on renewal.
pub struct CredentialHandle {
    role: Role,
    backend: Arc<dyn Backend>,
    created_at: Instant,
    health: Mutex<Health>,
}

impl fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHandle")
            .field("role", &self.role)
            .field("created_at", &self.created_at)
            .field("consecutive_failures", &self.consecutive_failures())
            .finish_non_exhaustive()
    }
}

impl CredentialHandle {
    pub fn new(role: Role, backend: Arc<dyn Backend>) -> Self {
        Self {
            role,
            backend,
            created_at: Instant::now(),
            health: Mutex::new(Health::default()),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn last_healthy_at(&self) -> Option<Instant> {
        self.health().last_healthy_at
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.health().consecutive_failures
    }

    pub fn last_check_failed(&self) -> bool {
        self.health().last_check_failed
    }

    pub fn record_success(&self) {
        let mut health = self.health();
        health.last_healthy_at = Some(Instant::now());
        health.consecutive_failures = 0;
        health.last_check_failed = false;
    }

    pub fn record_failure(&self) {
        let mut health = self.health();
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.last_check_failed = true;
    }

    /// A handle is reusable while younger than `ttl` and its most recent
    /// health check did not fail.
    pub fn is_usable(&self, ttl: Duration) -> bool {
        self.age() < ttl && !self.last_check_failed()
    }

    fn health(&self) -> std::sync::MutexGuard<'_, Health> {
        // Health is plain counters; a panic mid-update leaves nothing torn.
        self.health.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
