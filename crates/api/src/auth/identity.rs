//! The composed authentication check.
//!
//! A request is authenticated only if all of these hold:
//!
//! 1. the backend accepts the bearer credential (standard handle),
//! 2. an active session record holds that credential's hash and belongs to
//!    the same subject,
//! 3. the subject's `users` row exists and is active (elevated handle).

use keyward_backend::{BackendError, TableQuery};
use keyward_core::error::CoreError;
use keyward_core::types::{Role, UserId};
use keyward_db::models::session::SessionRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;

/// Backend table holding user profiles.
pub const USERS_TABLE: &str = "users";

const USER_COLUMNS: &str = "id,email,name,role,company_id,is_active";

/// A row of the backend `users` table.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub role: String,
    #[serde(default)]
    pub company_id: Option<Uuid>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// The authenticated user as seen by handlers.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    /// One of `ADMIN`, `MANAGER`, `COLLABORATOR`.
    pub role: String,
    pub company_id: Option<Uuid>,
}

impl From<UserProfile> for Identity {
    fn from(p: UserProfile) -> Self {
        Self {
            id: p.id,
            email: p.email,
            name: p.name,
            role: p.role,
            company_id: p.company_id,
        }
    }
}

/// Result of a successful [`get_current_identity`].
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub identity: Identity,
    pub session: SessionRecord,
}

/// Authenticate `bearer` end to end. See the module docs for the checks.
pub async fn get_current_identity(
    state: &AppState,
    bearer: &str,
) -> Result<Authenticated, CoreError> {
    let standard = state.get_handle(Role::Standard).await?;
    let verified = match standard.backend().verify_identity(bearer).await {
        Ok(verified) => verified,
        // The user's own credential was refused; this is not a handle fault.
        Err(e) if matches!(e.status(), Some(401 | 403)) => {
            tracing::debug!(error = %e, "Bearer credential rejected by backend");
            return Err(CoreError::AuthenticationRejected(
                "Invalid or expired token".into(),
            ));
        }
        Err(e) => return Err(state.interceptor.observe(Role::Standard, e)),
    };

    let session = state.registry.validate(bearer, true).await.ok_or_else(|| {
        CoreError::AuthenticationRejected("Session not found, expired or revoked".into())
    })?;

    if session.user_id != verified.subject {
        tracing::warn!(
            session_id = %session.id,
            session_user = %session.user_id,
            token_subject = %verified.subject,
            "Session does not belong to the credential's subject"
        );
        return Err(CoreError::AuthenticationRejected(
            "Session does not match credential".into(),
        ));
    }

    let profile = load_profile(state, TableQuery::new(USERS_TABLE).eq("id", verified.subject))
        .await?
        .ok_or_else(|| CoreError::AuthenticationRejected("User profile not found".into()))?;

    if !profile.is_active {
        return Err(CoreError::AuthenticationRejected(
            "User account is inactive".into(),
        ));
    }

    Ok(Authenticated {
        identity: profile.into(),
        session,
    })
}

/// Look up a profile by email with the elevated handle.
pub async fn load_profile_by_email(
    state: &AppState,
    email: &str,
) -> Result<Option<UserProfile>, CoreError> {
    load_profile(state, TableQuery::new(USERS_TABLE).eq("email", email)).await
}

async fn load_profile(
    state: &AppState,
    query: TableQuery,
) -> Result<Option<UserProfile>, CoreError> {
    let elevated = state.get_handle(Role::Elevated).await?;
    let query = query.select(USER_COLUMNS).limit(1);
    let rows = state
        .interceptor
        .guard(Role::Elevated, elevated.backend().select(&query))
        .await?;

    rows.into_iter()
        .next()
        .map(|row| {
            serde_json::from_value::<UserProfile>(row)
                .map_err(|e| BackendError::Decode(format!("users row: {e}")))
        })
        .transpose()
        .map_err(CoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_defaults_to_active() {
        let id = Uuid::new_v4();
        let profile: UserProfile = serde_json::from_value(serde_json::json!({
            "id": id,
            "email": "ana@example.com",
            "role": "MANAGER",
        }))
        .unwrap();
        assert!(profile.is_active);
        assert!(profile.name.is_none());

        let identity = Identity::from(profile);
        assert_eq!(identity.id, id);
        assert_eq!(identity.role, "MANAGER");
    }
}
