pub mod admin;
pub mod auth;
pub mod health;
pub mod sessions;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /auth/login                      login (public)
/// /auth/refresh                    refresh (public)
/// /auth/logout                     logout (requires auth)
/// /auth/me                         current identity (requires auth)
///
/// /sessions                        list own active sessions
/// /sessions/{id}                   revoke own session (DELETE)
/// /sessions/revoke-others          revoke all but the current session
///
/// /admin/sessions/cleanup          purge long-expired sessions (admin only)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/sessions", sessions::router())
        .nest("/admin", admin::router())
}
