//! Proactive handle renewal.
//!
//! [`RenewalScheduler::spawn`] starts one supervised loop that sleeps for
//! the configured interval, probes the current handle, and then recreates
//! it whether or not the probe passed, so credential expiry is pre-empted
//! instead of discovered by a failing request. A failed cycle gets one
//! immediate emergency renewal and then a backoff sleep before the normal
//! cadence resumes. The loop exits only when its [`CancellationToken`] is
//! cancelled; cancellation is observed at the sleep boundary.
//! [`RenewalHandle::shutdown_within`] aborts a cycle that outlives its
//! grace period.

use std::sync::Arc;
use std::time::Duration;

use keyward_core::config::AuthConfig;
use keyward_core::error::CoreError;
use keyward_core::types::Role;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::CredentialHandleCache;

/// Observable position of the renewal loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalState {
    Idle,
    Sleeping,
    Probing,
    Renewing,
    Cancelled,
}

/// Timing for the renewal loop.
#[derive(Debug, Clone)]
pub struct RenewalConfig {
    /// Normal sleep between cycles.
    pub interval: Duration,
    /// Sleep after a failed cycle.
    pub backoff: Duration,
    /// Role whose handle is renewed.
    pub role: Role,
}

impl RenewalConfig {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            interval: config.renewal_interval,
            backoff: config.renewal_backoff,
            role: Role::Elevated,
        }
    }
}

pub struct RenewalScheduler {
    cache: Arc<CredentialHandleCache>,
    config: RenewalConfig,
}

/// Handle to a running renewal loop.
pub struct RenewalHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
    state: watch::Receiver<RenewalState>,
}

impl RenewalHandle {
    pub fn state(&self) -> RenewalState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<RenewalState> {
        self.state.clone()
    }

    /// Cancel the loop and wait until it has exited.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "Renewal loop did not exit cleanly");
        }
    }

    /// Cancel the loop and give it `grace` to exit on its own.
    ///
    /// A loop still mid-cycle after `grace` is aborted. Either way this
    /// returns only once the task has finished, so no renewal can install
    /// a handle afterwards. Returns `false` if the loop had to be aborted.
    pub async fn shutdown_within(mut self, grace: Duration) -> bool {
        self.cancel.cancel();
        match tokio::time::timeout(grace, &mut self.join).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Renewal loop did not exit cleanly");
                true
            }
            Err(_) => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "Renewal loop still busy after cancellation, aborting"
                );
                self.join.abort();
                if let Err(e) = self.join.await {
                    if !e.is_cancelled() {
                        tracing::error!(error = %e, "Renewal loop did not exit cleanly");
                    }
                }
                false
            }
        }
    }
}

impl RenewalScheduler {
    pub fn new(cache: Arc<CredentialHandleCache>, config: RenewalConfig) -> Self {
        Self { cache, config }
    }

    /// Start the loop on the current runtime.
    ///
    /// The loop also stops when `cancel` (or a parent token) is cancelled
    /// elsewhere; [`RenewalHandle::shutdown`] is the way to wait for it.
    pub fn spawn(self, cancel: CancellationToken) -> RenewalHandle {
        let (state_tx, state_rx) = watch::channel(RenewalState::Idle);
        let join = tokio::spawn(self.run(cancel.clone(), state_tx));
        RenewalHandle {
            cancel,
            join,
            state: state_rx,
        }
    }

    async fn run(self, cancel: CancellationToken, state: watch::Sender<RenewalState>) {
        tracing::info!(
            role = %self.config.role,
            interval_secs = self.config.interval.as_secs(),
            backoff_secs = self.config.backoff.as_secs(),
            "Handle renewal loop started"
        );

        let mut sleep_for = self.config.interval;

        loop {
            state.send_replace(RenewalState::Sleeping);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(sleep_for) => {}
            }

            sleep_for = match self.cycle(&state).await {
                Ok(()) => self.config.interval,
                Err(e) => {
                    tracing::warn!(
                        role = %self.config.role,
                        error = %e,
                        "Renewal cycle failed, attempting emergency renewal"
                    );
                    state.send_replace(RenewalState::Renewing);
                    match self.cache.get(self.config.role, true).await {
                        Ok(_) => tracing::info!(role = %self.config.role, "Emergency renewal succeeded"),
                        Err(e) => tracing::error!(
                            role = %self.config.role,
                            error = %e,
                            "Emergency renewal failed"
                        ),
                    }
                    self.config.backoff
                }
            };
        }

        state.send_replace(RenewalState::Cancelled);
        tracing::info!("Handle renewal loop stopped");
    }

    async fn cycle(&self, state: &watch::Sender<RenewalState>) -> Result<(), CoreError> {
        let role = self.config.role;

        state.send_replace(RenewalState::Probing);
        match self.cache.peek(role) {
            Some(handle) => {
                let healthy = self.cache.probe().test(&handle).await;
                tracing::debug!(role = %role, healthy, "Pre-renewal probe");
            }
            None => tracing::debug!(role = %role, "No cached handle to probe"),
        }

        state.send_replace(RenewalState::Renewing);
        self.cache.get(role, true).await?;
        tracing::debug!(role = %role, "Handle renewed");
        Ok(())
    }
}
