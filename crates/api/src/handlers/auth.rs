//! Handlers for the `/auth` resource (login, refresh, logout, me).

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use keyward_core::error::CoreError;
use keyward_core::types::{Role, SessionId};
use serde::{Deserialize, Serialize};

use crate::auth::identity::{load_profile_by_email, Identity};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthIdentity;
use crate::sessions::NewLogin;
use crate::state::AppState;

/// Access token lifetime reported when the backend does not say.
const DEFAULT_ACCESS_TOKEN_SECS: i64 = 3600;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for `POST /auth/refresh`.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Successful authentication response returned by login and refresh.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Identity>,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    /// Whether a session row was revoked. `false` when bookkeeping failed
    /// or the session was already gone; the logout still succeeds.
    pub revoked: bool,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Client address from the first `X-Forwarded-For` hop, else `X-Real-IP`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    header_str("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .or_else(|| header_str("x-real-ip"))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Best-effort backend sign-out; failures are logged only.
async fn sign_out_quietly(state: &AppState, bearer: &str) {
    let result = match state.get_handle(Role::Standard).await {
        Ok(handle) => state
            .interceptor
            .guard(Role::Standard, handle.backend().sign_out(bearer))
            .await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::warn!(error = %e, "Backend sign-out failed");
    }
}

fn rejected_as(msg: &'static str) -> impl FnOnce(CoreError) -> AppError {
    move |e| match e {
        CoreError::AuthenticationRejected(_) => AppError::unauthorized(msg),
        other => AppError::Core(other),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/login
///
/// Authenticate with email + password against the backend, check the user
/// profile, and record a session.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = input.email.trim().to_lowercase();
    if email.is_empty() || input.password.is_empty() {
        return Err(AppError::BadRequest("email and password are required".into()));
    }

    // 1. Backend sign-in.
    let standard = state.get_handle(Role::Standard).await?;
    let tokens = state
        .interceptor
        .guard(
            Role::Standard,
            standard
                .backend()
                .sign_in_with_password(&email, &input.password),
        )
        .await
        .map_err(rejected_as("Invalid email or password"))?;

    // 2. Profile must exist and be active.
    let profile = match load_profile_by_email(&state, &email).await? {
        Some(profile) if profile.is_active => profile,
        Some(_) => {
            sign_out_quietly(&state, &tokens.access_token).await;
            return Err(AppError::Core(CoreError::Forbidden(
                "Account is deactivated".into(),
            )));
        }
        None => {
            sign_out_quietly(&state, &tokens.access_token).await;
            return Err(AppError::unauthorized("Invalid email or password"));
        }
    };

    // 3. Record the session.
    let ua = user_agent(&headers);
    let session = state
        .registry
        .create(NewLogin {
            user_id: profile.id,
            access_token: &tokens.access_token,
            refresh_token: &tokens.refresh_token,
            device_info: None,
            ip_address: client_ip(&headers),
            user_agent: ua,
            ttl: state.config.auth.session_ttl,
        })
        .await?;

    tracing::info!(
        user_id = %profile.id,
        session_id = %session.id,
        transient = session.transient,
        "User logged in"
    );

    Ok(Json(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: "bearer",
        expires_in: tokens.expires_in.unwrap_or(DEFAULT_ACCESS_TOKEN_SECS),
        session_id: session.id,
        user: Some(profile.into()),
    }))
}

/// POST /api/v1/auth/refresh
///
/// Exchange a refresh token for a new token pair. Each refresh token works
/// once.
pub async fn refresh(
    State(state): State<AppState>,
    Json(input): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let standard = state.get_handle(Role::Standard).await?;
    let tokens = state
        .interceptor
        .guard(
            Role::Standard,
            standard.backend().refresh_credential(&input.refresh_token),
        )
        .await
        .map_err(rejected_as("Invalid or expired refresh token"))?;

    let session = state
        .registry
        .refresh(&input.refresh_token, &tokens.access_token, &tokens.refresh_token)
        .await?
        .ok_or_else(|| AppError::unauthorized("Refresh token already used or session revoked"))?;

    Ok(Json(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: "bearer",
        expires_in: tokens.expires_in.unwrap_or(DEFAULT_ACCESS_TOKEN_SECS),
        session_id: session.id,
        user: None,
    }))
}

/// POST /api/v1/auth/logout
///
/// Revoke the current session. Bookkeeping failures are logged and do not
/// fail the logout.
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthIdentity,
) -> AppResult<Json<LogoutResponse>> {
    let revoked = match state.registry.revoke(auth.session.id, "manual_logout").await {
        Ok(revoked) => revoked,
        Err(e) => {
            tracing::error!(session_id = %auth.session.id, error = %e, "Failed to revoke session on logout");
            false
        }
    };

    sign_out_quietly(&state, &auth.token).await;

    Ok(Json(LogoutResponse { revoked }))
}

/// GET /api/v1/auth/me
pub async fn me(auth: AuthIdentity) -> Json<Identity> {
    Json(auth.identity)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.2"));
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
