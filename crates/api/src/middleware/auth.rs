//! Bearer-token authentication extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use keyward_db::models::session::SessionRecord;

use crate::auth::identity::{get_current_identity, Identity};
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated caller: profile, session record, and the presented token.
///
/// Use this as an extractor parameter in any handler that requires authentication:
///
/// ```ignore
/// async fn my_handler(auth: AuthIdentity) -> AppResult<Json<()>> {
///     tracing::info!(user_id = %auth.identity.id, role = %auth.identity.role, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthIdentity {
    pub identity: Identity,
    pub session: SessionRecord,
    /// The raw bearer token, for current-session comparison and sign-out.
    pub token: String,
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let auth_header = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            AppError::unauthorized("Invalid Authorization format. Expected: Bearer <token>")
        })
}

impl FromRequestParts<AppState> for AuthIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?.to_string();
        let authenticated = get_current_identity(state, &token).await?;

        Ok(AuthIdentity {
            identity: authenticated.identity,
            session: authenticated.session,
            token,
        })
    }
}
