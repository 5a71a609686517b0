//! Reactive handle invalidation.
//!
//! When a backend call fails with a server-fault status whose body carries
//! an expired-credential signature, the handle that made the call is stale.
//! [`FaultInterceptor`] invalidates the implicated role's cache entry so the
//! next request builds a fresh one, rate-limited by a cooldown so a
//! sustained outage does not turn into an invalidation storm.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use keyward_core::config::{AuthConfig, MIN_INVALIDATION_COOLDOWN};
use keyward_core::error::CoreError;
use keyward_core::signatures::FaultSignatures;
use keyward_core::types::Role;
use tokio::time::Instant;

use crate::cache::CredentialHandleCache;
use crate::error::BackendError;

pub struct FaultInterceptor {
    cache: Arc<CredentialHandleCache>,
    signatures: FaultSignatures,
    cooldown: Duration,
    last_triggered: Mutex<Option<Instant>>,
    renewals_triggered: AtomicU64,
}

impl FaultInterceptor {
    /// `cooldown` is raised to [`MIN_INVALIDATION_COOLDOWN`] if shorter.
    pub fn new(cache: Arc<CredentialHandleCache>, cooldown: Duration) -> Self {
        Self::with_signatures(cache, cooldown, FaultSignatures::default())
    }

    pub fn with_signatures(
        cache: Arc<CredentialHandleCache>,
        cooldown: Duration,
        signatures: FaultSignatures,
    ) -> Self {
        Self {
            cache,
            signatures,
            cooldown: cooldown.max(MIN_INVALIDATION_COOLDOWN),
            last_triggered: Mutex::new(None),
            renewals_triggered: AtomicU64::new(0),
        }
    }

    pub fn from_config(cache: Arc<CredentialHandleCache>, config: &AuthConfig) -> Self {
        Self::new(cache, config.invalidation_cooldown)
    }

    pub fn signatures(&self) -> &FaultSignatures {
        &self.signatures
    }

    /// Invalidations triggered so far. Advisory only.
    pub fn renewals_triggered(&self) -> u64 {
        self.renewals_triggered.load(Ordering::Relaxed)
    }

    /// Inspect a finished call's status and body. Returns `true` if this
    /// call triggered an invalidation of `role`'s handle.
    pub fn inspect(&self, role: Role, status: u16, body: &str) -> bool {
        if !(500..=599).contains(&status) || !self.signatures.matches(body) {
            return false;
        }
        self.trigger(role, status)
    }

    /// Await a backend call, inspect its failure, and translate it.
    ///
    /// The caller sees the classified [`CoreError`]; the raw
    /// [`BackendError`] never escapes.
    pub async fn guard<T, F>(&self, role: Role, call: F) -> Result<T, CoreError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        call.await.map_err(|e| self.observe(role, e))
    }

    /// Inspect a failed call made with `role`'s handle and translate it.
    pub fn observe(&self, role: Role, err: BackendError) -> CoreError {
        if let BackendError::Status { status, body } = &err {
            self.inspect(role, *status, body);
        }
        err.into_core(&self.signatures)
    }

    fn trigger(&self, role: Role, status: u16) -> bool {
        {
            let mut last = self
                .last_triggered
                .lock()
                .unwrap_or_else(|p| p.into_inner());
            if let Some(at) = *last {
                if at.elapsed() < self.cooldown {
                    tracing::debug!(
                        role = %role,
                        status,
                        "Expired-credential signature inside cooldown, not invalidating"
                    );
                    return false;
                }
            }
            *last = Some(Instant::now());
        }

        self.cache.invalidate(role);
        let total = self.renewals_triggered.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(
            role = %role,
            status,
            renewals_triggered = total,
            "Expired-credential signature detected, handle invalidated"
        );
        true
    }
}
