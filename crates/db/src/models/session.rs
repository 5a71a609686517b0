//! User session model and DTOs.

use keyward_core::device::DeviceInfo;
use keyward_core::types::{SessionId, Timestamp, UserId};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `user_sessions` table.
///
/// Only token hashes are stored. `transient` is never persisted: it marks a
/// record that was returned to the caller without being written (login in
/// degraded mode).
#[derive(Debug, Clone, FromRow)]
pub struct SessionRecord {
    pub id: SessionId,
    pub user_id: UserId,
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    #[sqlx(json)]
    pub device_info: DeviceInfo,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: Timestamp,
    pub last_used_at: Timestamp,
    pub expires_at: Timestamp,
    pub is_revoked: bool,
    pub revoked_at: Option<Timestamp>,
    pub revoked_reason: Option<String>,
    #[sqlx(skip)]
    pub transient: bool,
}

impl SessionRecord {
    /// Not revoked and not yet expired at `now`.
    pub fn is_active_at(&self, now: Timestamp) -> bool {
        !self.is_revoked && self.expires_at > now
    }

    /// Build a record from a create DTO without touching storage.
    pub fn from_new(input: &NewSession) -> Self {
        Self {
            id: input.id,
            user_id: input.user_id,
            access_token_hash: input.access_token_hash.clone(),
            refresh_token_hash: input.refresh_token_hash.clone(),
            device_info: input.device_info.clone(),
            ip_address: input.ip_address.clone(),
            user_agent: input.user_agent.clone(),
            created_at: input.created_at,
            last_used_at: input.created_at,
            expires_at: input.expires_at,
            is_revoked: false,
            revoked_at: None,
            revoked_reason: None,
            transient: false,
        }
    }
}

/// DTO for inserting a new session. Ids and timestamps are assigned by the
/// caller so a degraded (unpersisted) record is identical in shape.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    pub device_info: DeviceInfo,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

/// New token hashes and expiry applied by a refresh-token rotation.
#[derive(Debug, Clone)]
pub struct SessionRotation {
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    pub expires_at: Timestamp,
}

/// Public view of a session for the active-session list.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub device_info: DeviceInfo,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: Timestamp,
    pub last_used_at: Timestamp,
    pub expires_at: Timestamp,
    pub is_current: bool,
}

impl SessionInfo {
    pub fn from_record(record: SessionRecord, is_current: bool) -> Self {
        Self {
            id: record.id,
            device_info: record.device_info,
            ip_address: record.ip_address,
            user_agent: record.user_agent,
            created_at: record.created_at,
            last_used_at: record.last_used_at,
            expires_at: record.expires_at,
            is_current,
        }
    }
}
