//! Role-based access control (RBAC) extractors.
//!
//! Each extractor wraps [`AuthIdentity`] and rejects requests whose role
//! does not meet the minimum requirement.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use keyward_core::error::CoreError;
use keyward_core::roles::ROLE_ADMIN;

use super::auth::AuthIdentity;
use crate::error::AppError;
use crate::state::AppState;

/// Requires the `ADMIN` role. Rejects with 403 Forbidden otherwise.
///
/// ```ignore
/// async fn admin_only(RequireAdmin(auth): RequireAdmin) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
pub struct RequireAdmin(pub AuthIdentity);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthIdentity::from_request_parts(parts, state).await?;
        if auth.identity.role != ROLE_ADMIN {
            return Err(AppError::Core(CoreError::Forbidden(
                "Admin role required".into(),
            )));
        }
        Ok(RequireAdmin(auth))
    }
}
