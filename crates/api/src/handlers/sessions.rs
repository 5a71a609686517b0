//! Handlers for the caller's own sessions and the admin cleanup endpoint.

use axum::extract::{Path, Query, State};
use axum::Json;
use keyward_core::error::CoreError;
use keyward_core::types::SessionId;
use keyward_db::models::session::SessionInfo;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::auth::AuthIdentity;
use crate::middleware::rbac::RequireAdmin;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
    pub total: usize,
    pub current_session_id: SessionId,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub revoked: bool,
}

#[derive(Debug, Serialize)]
pub struct RevokeOthersResponse {
    pub revoked: u64,
}

#[derive(Debug, Deserialize)]
pub struct CleanupParams {
    /// Grace window in days; defaults to `SESSION_CLEANUP_GRACE_DAYS`.
    pub older_than_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub deleted: u64,
    pub older_than_days: i64,
}

/// GET /api/v1/sessions
pub async fn list(
    State(state): State<AppState>,
    auth: AuthIdentity,
) -> AppResult<Json<SessionListResponse>> {
    let sessions = state
        .registry
        .list_active_for_user(auth.identity.id, Some(&auth.token))
        .await?;

    Ok(Json(SessionListResponse {
        total: sessions.len(),
        sessions,
        current_session_id: auth.session.id,
    }))
}

/// DELETE /api/v1/sessions/{id}
///
/// Revoke one of the caller's own active sessions. Sessions of other users
/// are reported as not found.
pub async fn revoke(
    State(state): State<AppState>,
    auth: AuthIdentity,
    Path(id): Path<SessionId>,
) -> AppResult<Json<RevokeResponse>> {
    let not_found = || CoreError::NotFound {
        entity: "Session",
        id: id.to_string(),
    };

    let record = state.registry.find_by_id(id).await?.ok_or_else(not_found)?;
    if record.user_id != auth.identity.id || record.is_revoked {
        return Err(not_found().into());
    }

    let revoked = state.registry.revoke(id, "revoked_by_user").await?;
    Ok(Json(RevokeResponse { revoked }))
}

/// POST /api/v1/sessions/revoke-others
pub async fn revoke_others(
    State(state): State<AppState>,
    auth: AuthIdentity,
) -> AppResult<Json<RevokeOthersResponse>> {
    let revoked = state
        .registry
        .revoke_all_for_user(auth.identity.id, Some(auth.session.id), "revoked_by_user")
        .await?;
    Ok(Json(RevokeOthersResponse { revoked }))
}

/// POST /api/v1/admin/sessions/cleanup?older_than_days=N
pub async fn cleanup(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Query(params): Query<CleanupParams>,
) -> AppResult<Json<CleanupResponse>> {
    let older_than_days = params
        .older_than_days
        .unwrap_or(state.config.auth.cleanup_grace_days);
    let deleted = state.registry.cleanup_expired(older_than_days).await?;

    tracing::info!(admin_id = %admin.identity.id, deleted, older_than_days, "Admin session cleanup");
    Ok(Json(CleanupResponse {
        deleted,
        older_than_days,
    }))
}
