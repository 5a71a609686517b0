//! Server-side session bookkeeping.
//!
//! [`SessionRegistry`] records one row per login, keyed by the SHA-256
//! hashes of the issued access and refresh tokens. Plaintext tokens never
//! reach storage. Every store call is bounded by the registry timeout; a
//! timeout is reported the same way as any other persistence fault.
//!
//! Failure policy differs by operation:
//!
//! - `create` degrades (returns an unpersisted record) unless the registry
//!   runs in [`PersistenceMode::Strict`].
//! - `validate` fails closed: any error is `None`.
//! - everything else surfaces [`CoreError::Persistence`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use keyward_core::clock::Clock;
use keyward_core::config::{AuthConfig, PersistenceMode};
use keyward_core::device::{parse_user_agent, DeviceInfo};
use keyward_core::error::CoreError;
use keyward_core::hashing::hash_token;
use keyward_core::types::{SessionId, Timestamp, UserId};
use keyward_db::models::session::{NewSession, SessionInfo, SessionRecord, SessionRotation};
use keyward_db::SessionStore;

/// Input to [`SessionRegistry::create`].
#[derive(Debug, Clone)]
pub struct NewLogin<'a> {
    pub user_id: UserId,
    pub access_token: &'a str,
    pub refresh_token: &'a str,
    /// Parsed from `user_agent` when absent.
    pub device_info: Option<DeviceInfo>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub ttl: Duration,
}

pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    mode: PersistenceMode,
    refresh_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
        mode: PersistenceMode,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            timeout,
            mode,
            refresh_ttl,
        }
    }

    pub fn from_config(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        config: &AuthConfig,
    ) -> Self {
        Self::new(
            store,
            clock,
            config.registry_timeout,
            config.persistence_mode,
            config.refresh_token_ttl,
        )
    }

    async fn io<T, F>(&self, op: &'static str, call: F) -> Result<T, CoreError>
    where
        F: Future<Output = Result<T, CoreError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Persistence(format!(
                "session store {op} timed out after {:?}",
                self.timeout
            ))),
        }
    }

    /// `now + ttl`, rejecting zero and out-of-range lifetimes.
    fn expiry(now: Timestamp, ttl: Duration) -> Result<Timestamp, CoreError> {
        let ttl = chrono::Duration::from_std(ttl)
            .ok()
            .filter(|d| *d > chrono::Duration::zero())
            .ok_or_else(|| CoreError::Validation("session ttl must be positive".into()))?;
        now.checked_add_signed(ttl)
            .ok_or_else(|| CoreError::Validation("session ttl is out of range".into()))
    }

    /// Record a new login.
    ///
    /// In degrade mode a persistence failure is logged and a transient
    /// record (`transient == true`) is returned so the login still succeeds.
    pub async fn create(&self, login: NewLogin<'_>) -> Result<SessionRecord, CoreError> {
        let now = self.clock.now();
        let expires_at = Self::expiry(now, login.ttl)?;

        let device_info = login
            .device_info
            .unwrap_or_else(|| parse_user_agent(login.user_agent.as_deref()));

        let input = NewSession {
            id: uuid::Uuid::new_v4(),
            user_id: login.user_id,
            access_token_hash: hash_token(login.access_token),
            refresh_token_hash: hash_token(login.refresh_token),
            device_info,
            ip_address: login.ip_address,
            user_agent: login.user_agent,
            created_at: now,
            expires_at,
        };

        match self.io("insert", self.store.insert(&input)).await {
            Ok(record) => {
                tracing::info!(
                    session_id = %record.id,
                    user_id = %record.user_id,
                    expires_at = %record.expires_at,
                    "Session created"
                );
                Ok(record)
            }
            Err(e) if self.mode == PersistenceMode::Strict => {
                tracing::error!(user_id = %input.user_id, error = %e, "Session create failed");
                Err(e)
            }
            Err(e) => {
                tracing::error!(
                    user_id = %input.user_id,
                    session_id = %input.id,
                    error = %e,
                    "Session create failed, continuing login with an unpersisted session"
                );
                let mut record = SessionRecord::from_new(&input);
                record.transient = true;
                Ok(record)
            }
        }
    }

    /// Active session holding `access_token`, or `None`.
    ///
    /// Never errors: a store failure is logged and treated as no match.
    pub async fn validate(&self, access_token: &str, touch: bool) -> Option<SessionRecord> {
        let now = self.clock.now();
        let hash = hash_token(access_token);
        match self
            .io(
                "lookup",
                self.store.find_active_by_access_hash(&hash, now, touch),
            )
            .await
        {
            Ok(Some(record)) if record.is_active_at(now) => Some(record),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Session lookup failed, treating as unauthenticated");
                None
            }
        }
    }

    /// Rotate the session holding `refresh_token` to the new token pair.
    ///
    /// The refresh token is single-use: `Ok(None)` once it has been consumed
    /// or its session is revoked or expired. Of concurrent calls with the
    /// same token at most one gets `Some`.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        new_access_token: &str,
        new_refresh_token: &str,
    ) -> Result<Option<SessionRecord>, CoreError> {
        let now = self.clock.now();
        let rotation = SessionRotation {
            access_token_hash: hash_token(new_access_token),
            refresh_token_hash: hash_token(new_refresh_token),
            expires_at: Self::expiry(now, self.refresh_ttl)?,
        };

        let rotated = self
            .io(
                "rotate",
                self.store.rotate(&hash_token(refresh_token), &rotation, now),
            )
            .await?;

        match &rotated {
            Some(record) => tracing::info!(session_id = %record.id, "Session rotated"),
            None => tracing::debug!("Refresh token matched no active session"),
        }
        Ok(rotated)
    }

    /// Soft-delete one session. `false` if it was already revoked or does
    /// not exist.
    pub async fn revoke(&self, session_id: SessionId, reason: &str) -> Result<bool, CoreError> {
        let now = self.clock.now();
        let revoked = self
            .io("revoke", self.store.revoke(session_id, reason, now))
            .await?;
        if revoked {
            tracing::info!(session_id = %session_id, reason, "Session revoked");
        }
        Ok(revoked)
    }

    /// Revoke every active session of `user_id` except `except`.
    pub async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        except: Option<SessionId>,
        reason: &str,
    ) -> Result<u64, CoreError> {
        let now = self.clock.now();
        let count = self
            .io(
                "revoke_all",
                self.store.revoke_all_for_user(user_id, except, reason, now),
            )
            .await?;
        tracing::info!(user_id = %user_id, count, reason, "Sessions revoked");
        Ok(count)
    }

    /// Active sessions of `user_id`, newest first, flagging the one that
    /// holds `current_token`.
    pub async fn list_active_for_user(
        &self,
        user_id: UserId,
        current_token: Option<&str>,
    ) -> Result<Vec<SessionInfo>, CoreError> {
        let now = self.clock.now();
        let current_hash = current_token.map(hash_token);
        let records = self
            .io("list", self.store.list_active_for_user(user_id, now))
            .await?;

        Ok(records
            .into_iter()
            .map(|record| {
                let is_current = current_hash.as_deref() == Some(record.access_token_hash.as_str());
                SessionInfo::from_record(record, is_current)
            })
            .collect())
    }

    pub async fn find_by_id(&self, session_id: SessionId) -> Result<Option<SessionRecord>, CoreError> {
        self.io("find", self.store.find_by_id(session_id)).await
    }

    /// Hard-delete sessions that expired more than `older_than_days` ago.
    /// Rows expired more recently are kept for audit lookups.
    pub async fn cleanup_expired(&self, older_than_days: i64) -> Result<u64, CoreError> {
        if older_than_days < 0 {
            return Err(CoreError::Validation(
                "older_than_days must not be negative".into(),
            ));
        }
        let cutoff = chrono::Duration::try_days(older_than_days)
            .and_then(|window| self.clock.now().checked_sub_signed(window))
            .ok_or_else(|| {
                CoreError::Validation(format!("older_than_days {older_than_days} is out of range"))
            })?;
        let deleted = self
            .io("cleanup", self.store.delete_expired_before(cutoff))
            .await?;
        tracing::info!(deleted, older_than_days, "Expired sessions cleaned up");
        Ok(deleted)
    }

    pub async fn health_check(&self) -> Result<(), CoreError> {
        self.io("health_check", self.store.health_check()).await
    }
}
