use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::{AppState, ConnectivityReport};

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the session store is reachable.
    pub session_store_healthy: bool,
    pub connectivity: ConnectivityReport,
}

/// GET /health -- returns service, session store and backend health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let session_store_healthy = state.registry.health_check().await.is_ok();
    let connectivity = state.connectivity_report();

    let status = if session_store_healthy && connectivity.is_connected {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        session_store_healthy,
        connectivity,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
