//! Repository for the `user_sessions` table.
//!
//! Every time-dependent query takes `now` as a bind parameter instead of
//! calling `NOW()` so that expiry is evaluated against the same clock the
//! caller used to compute it.

use keyward_core::types::{SessionId, Timestamp, UserId};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::session::{NewSession, SessionRecord, SessionRotation};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, access_token_hash, refresh_token_hash, device_info, \
                       ip_address, user_agent, created_at, last_used_at, expires_at, \
                       is_revoked, revoked_at, revoked_reason";

/// Provides CRUD operations for user sessions.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a new session, returning the created row.
    pub async fn create(pool: &PgPool, input: &NewSession) -> Result<SessionRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_sessions
                (id, user_id, access_token_hash, refresh_token_hash, device_info,
                 ip_address, user_agent, created_at, last_used_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SessionRecord>(&query)
            .bind(input.id)
            .bind(input.user_id)
            .bind(&input.access_token_hash)
            .bind(&input.refresh_token_hash)
            .bind(Json(&input.device_info))
            .bind(&input.ip_address)
            .bind(&input.user_agent)
            .bind(input.created_at)
            .bind(input.expires_at)
            .fetch_one(pool)
            .await
    }

    /// Find a session by id regardless of state.
    pub async fn find_by_id(
        pool: &PgPool,
        id: SessionId,
    ) -> Result<Option<SessionRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM user_sessions WHERE id = $1");
        sqlx::query_as::<_, SessionRecord>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find an active session by its access token hash.
    pub async fn find_active_by_access_hash(
        pool: &PgPool,
        hash: &str,
        now: Timestamp,
    ) -> Result<Option<SessionRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_sessions
             WHERE access_token_hash = $1
               AND is_revoked = false
               AND expires_at > $2"
        );
        sqlx::query_as::<_, SessionRecord>(&query)
            .bind(hash)
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Find an active session by access token hash and stamp `last_used_at`
    /// in the same statement.
    pub async fn touch_active_by_access_hash(
        pool: &PgPool,
        hash: &str,
        now: Timestamp,
    ) -> Result<Option<SessionRecord>, sqlx::Error> {
        let query = format!(
            "UPDATE user_sessions SET last_used_at = $2
             WHERE access_token_hash = $1
               AND is_revoked = false
               AND expires_at > $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SessionRecord>(&query)
            .bind(hash)
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Rotate both token hashes of the active session holding `old_refresh_hash`.
    ///
    /// The match and the update are a single conditional `UPDATE`, so of any
    /// number of concurrent calls presenting the same refresh token at most
    /// one sees a row: the losers re-check the predicate after the winner's
    /// commit and find the hash gone.
    pub async fn rotate_by_refresh_hash(
        pool: &PgPool,
        old_refresh_hash: &str,
        rotation: &SessionRotation,
        now: Timestamp,
    ) -> Result<Option<SessionRecord>, sqlx::Error> {
        let query = format!(
            "UPDATE user_sessions
             SET access_token_hash = $2,
                 refresh_token_hash = $3,
                 expires_at = $4,
                 last_used_at = $5
             WHERE refresh_token_hash = $1
               AND is_revoked = false
               AND expires_at > $5
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SessionRecord>(&query)
            .bind(old_refresh_hash)
            .bind(&rotation.access_token_hash)
            .bind(&rotation.refresh_token_hash)
            .bind(rotation.expires_at)
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Revoke a single session. Returns `true` if the row was updated,
    /// `false` if it does not exist or was already revoked.
    pub async fn revoke(
        pool: &PgPool,
        id: SessionId,
        reason: &str,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions
             SET is_revoked = true, revoked_at = $2, revoked_reason = $3
             WHERE id = $1 AND is_revoked = false",
        )
        .bind(id)
        .bind(now)
        .bind(reason)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke all active sessions for a user, optionally sparing one.
    /// Returns the count of revoked sessions.
    pub async fn revoke_all_for_user(
        pool: &PgPool,
        user_id: UserId,
        except: Option<SessionId>,
        reason: &str,
        now: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions
             SET is_revoked = true, revoked_at = $3, revoked_reason = $4
             WHERE user_id = $1
               AND is_revoked = false
               AND expires_at > $3
               AND ($2::uuid IS NULL OR id <> $2)",
        )
        .bind(user_id)
        .bind(except)
        .bind(now)
        .bind(reason)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// List a user's active sessions, newest first.
    pub async fn list_active_for_user(
        pool: &PgPool,
        user_id: UserId,
        now: Timestamp,
    ) -> Result<Vec<SessionRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_sessions
             WHERE user_id = $1
               AND is_revoked = false
               AND expires_at > $2
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, SessionRecord>(&query)
            .bind(user_id)
            .bind(now)
            .fetch_all(pool)
            .await
    }

    /// Hard-delete sessions whose expiry is strictly before `cutoff`.
    /// Returns the count of deleted rows.
    pub async fn delete_expired_before(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
