//! Route definitions for the `/sessions` resource.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::sessions;
use crate::state::AppState;

/// Routes mounted at `/sessions`. All require auth.
///
/// ```text
/// GET    /               -> list
/// DELETE /{id}           -> revoke
/// POST   /revoke-others  -> revoke_others
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(sessions::list))
        .route("/{id}", delete(sessions::revoke))
        .route("/revoke-others", post(sessions::revoke_others))
}
