//! Route definitions for `/admin`.

use axum::routing::post;
use axum::Router;

use crate::handlers::sessions;
use crate::state::AppState;

/// Routes mounted at `/admin`. All require the `ADMIN` role.
///
/// ```text
/// POST /sessions/cleanup  -> cleanup
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/sessions/cleanup", post(sessions::cleanup))
}
