//! Storage seam for session bookkeeping.
//!
//! [`SessionStore`] is what the session registry talks to. All methods
//! return [`CoreError::Persistence`] on failure; driver errors never leave
//! this module.

use std::collections::HashMap;

use async_trait::async_trait;
use keyward_core::error::CoreError;
use keyward_core::types::{SessionId, Timestamp, UserId};
use tokio::sync::RwLock;

use crate::models::session::{NewSession, SessionRecord, SessionRotation};
use crate::repositories::SessionRepo;
use crate::DbPool;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, input: &NewSession) -> Result<SessionRecord, CoreError>;

    async fn find_by_id(&self, id: SessionId) -> Result<Option<SessionRecord>, CoreError>;

    /// Look up an active session by access token hash, optionally stamping
    /// `last_used_at = now`.
    async fn find_active_by_access_hash(
        &self,
        hash: &str,
        now: Timestamp,
        touch: bool,
    ) -> Result<Option<SessionRecord>, CoreError>;

    /// Atomically find the active session holding `old_refresh_hash` and
    /// rotate it. `None` if no active row holds that hash.
    async fn rotate(
        &self,
        old_refresh_hash: &str,
        rotation: &SessionRotation,
        now: Timestamp,
    ) -> Result<Option<SessionRecord>, CoreError>;

    async fn revoke(&self, id: SessionId, reason: &str, now: Timestamp)
        -> Result<bool, CoreError>;

    async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        except: Option<SessionId>,
        reason: &str,
        now: Timestamp,
    ) -> Result<u64, CoreError>;

    async fn list_active_for_user(
        &self,
        user_id: UserId,
        now: Timestamp,
    ) -> Result<Vec<SessionRecord>, CoreError>;

    async fn delete_expired_before(&self, cutoff: Timestamp) -> Result<u64, CoreError>;

    async fn health_check(&self) -> Result<(), CoreError>;
}

fn persistence(err: sqlx::Error) -> CoreError {
    tracing::error!(error = %err, "Session store query failed");
    CoreError::Persistence(err.to_string())
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// [`SessionStore`] backed by the `user_sessions` table.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: DbPool,
}

impl PgSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, input: &NewSession) -> Result<SessionRecord, CoreError> {
        SessionRepo::create(&self.pool, input)
            .await
            .map_err(persistence)
    }

    async fn find_by_id(&self, id: SessionId) -> Result<Option<SessionRecord>, CoreError> {
        SessionRepo::find_by_id(&self.pool, id)
            .await
            .map_err(persistence)
    }

    async fn find_active_by_access_hash(
        &self,
        hash: &str,
        now: Timestamp,
        touch: bool,
    ) -> Result<Option<SessionRecord>, CoreError> {
        let result = if touch {
            SessionRepo::touch_active_by_access_hash(&self.pool, hash, now).await
        } else {
            SessionRepo::find_active_by_access_hash(&self.pool, hash, now).await
        };
        result.map_err(persistence)
    }

    async fn rotate(
        &self,
        old_refresh_hash: &str,
        rotation: &SessionRotation,
        now: Timestamp,
    ) -> Result<Option<SessionRecord>, CoreError> {
        SessionRepo::rotate_by_refresh_hash(&self.pool, old_refresh_hash, rotation, now)
            .await
            .map_err(persistence)
    }

    async fn revoke(
        &self,
        id: SessionId,
        reason: &str,
        now: Timestamp,
    ) -> Result<bool, CoreError> {
        SessionRepo::revoke(&self.pool, id, reason, now)
            .await
            .map_err(persistence)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        except: Option<SessionId>,
        reason: &str,
        now: Timestamp,
    ) -> Result<u64, CoreError> {
        SessionRepo::revoke_all_for_user(&self.pool, user_id, except, reason, now)
            .await
            .map_err(persistence)
    }

    async fn list_active_for_user(
        &self,
        user_id: UserId,
        now: Timestamp,
    ) -> Result<Vec<SessionRecord>, CoreError> {
        SessionRepo::list_active_for_user(&self.pool, user_id, now)
            .await
            .map_err(persistence)
    }

    async fn delete_expired_before(&self, cutoff: Timestamp) -> Result<u64, CoreError> {
        SessionRepo::delete_expired_before(&self.pool, cutoff)
            .await
            .map_err(persistence)
    }

    async fn health_check(&self) -> Result<(), CoreError> {
        crate::health_check(&self.pool).await.map_err(persistence)
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// [`SessionStore`] held in process memory.
///
/// Used when no `DATABASE_URL` is configured and in tests. Every mutation
/// happens under one write lock, which gives `rotate` the same
/// find-and-update atomicity as the conditional `UPDATE` in Postgres.
#[derive(Default)]
pub struct MemorySessionStore {
    rows: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, input: &NewSession) -> Result<SessionRecord, CoreError> {
        let mut rows = self.rows.write().await;
        let duplicate = rows.values().any(|r| {
            r.access_token_hash == input.access_token_hash
                || r.refresh_token_hash == input.refresh_token_hash
        });
        if rows.contains_key(&input.id) || duplicate {
            return Err(CoreError::Persistence(
                "duplicate session id or token hash".into(),
            ));
        }
        let record = SessionRecord::from_new(input);
        rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: SessionId) -> Result<Option<SessionRecord>, CoreError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_active_by_access_hash(
        &self,
        hash: &str,
        now: Timestamp,
        touch: bool,
    ) -> Result<Option<SessionRecord>, CoreError> {
        let mut rows = self.rows.write().await;
        let found = rows
            .values_mut()
            .find(|r| r.access_token_hash == hash && r.is_active_at(now));
        Ok(found.map(|r| {
            if touch {
                r.last_used_at = now;
            }
            r.clone()
        }))
    }

    async fn rotate(
        &self,
        old_refresh_hash: &str,
        rotation: &SessionRotation,
        now: Timestamp,
    ) -> Result<Option<SessionRecord>, CoreError> {
        let mut rows = self.rows.write().await;
        let found = rows
            .values_mut()
            .find(|r| r.refresh_token_hash == old_refresh_hash && r.is_active_at(now));
        Ok(found.map(|r| {
            r.access_token_hash = rotation.access_token_hash.clone();
            r.refresh_token_hash = rotation.refresh_token_hash.clone();
            r.expires_at = rotation.expires_at;
            r.last_used_at = now;
            r.clone()
        }))
    }

    async fn revoke(
        &self,
        id: SessionId,
        reason: &str,
        now: Timestamp,
    ) -> Result<bool, CoreError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(r) if !r.is_revoked => {
                r.is_revoked = true;
                r.revoked_at = Some(now);
                r.revoked_reason = Some(reason.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        except: Option<SessionId>,
        reason: &str,
        now: Timestamp,
    ) -> Result<u64, CoreError> {
        let mut rows = self.rows.write().await;
        let mut count = 0;
        for r in rows.values_mut() {
            if r.user_id == user_id && r.is_active_at(now) && Some(r.id) != except {
                r.is_revoked = true;
                r.revoked_at = Some(now);
                r.revoked_reason = Some(reason.to_string());
                count += 1;
            }
        }
        Ok(count)
    }

    async fn list_active_for_user(
        &self,
        user_id: UserId,
        now: Timestamp,
    ) -> Result<Vec<SessionRecord>, CoreError> {
        let rows = self.rows.read().await;
        let mut active: Vec<SessionRecord> = rows
            .values()
            .filter(|r| r.user_id == user_id && r.is_active_at(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }

    async fn delete_expired_before(&self, cutoff: Timestamp) -> Result<u64, CoreError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, r| r.expires_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }

    async fn health_check(&self) -> Result<(), CoreError> {
        Ok(())
    }
}
