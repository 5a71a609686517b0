//! Integration tests for the health check endpoint and general HTTP behaviour.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, get};
use keyward_core::types::Role;

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let t = build_test_app();
    let response = get(t.app(), "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;

    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["session_store_healthy"], true);
    assert_eq!(json["connectivity"]["is_connected"], true);
    assert_eq!(json["connectivity"]["credentials_configured"], true);
    assert_eq!(json["connectivity"]["environment"], "development");
    assert_eq!(json["connectivity"]["refresh_interval_secs"], 600);
    assert_eq!(json["connectivity"]["renewals_triggered"], 0);
}

#[tokio::test]
async fn health_reports_degraded_after_repeated_probe_failures() {
    let t = build_test_app();
    let probe = t.state.cache.probe();
    for _ in 0..probe.tolerance() {
        probe.record_failure("connection refused");
    }

    let json = body_json(get(t.app(), "/health").await).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["connectivity"]["is_connected"], false);
    assert_eq!(json["connectivity"]["consecutive_failures"], 10);
    assert_eq!(json["connectivity"]["last_error"], "connection refused");
}

#[tokio::test]
async fn health_reports_missing_credentials() {
    let t = build_test_app();
    t.connector.set_configured(Role::Elevated, false);

    let json = body_json(get(t.app(), "/health").await).await;
    assert_eq!(json["connectivity"]["credentials_configured"], false);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let t = build_test_app();
    let response = get(t.app(), "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let t = build_test_app();
    let response = get(t.app(), "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("response must carry x-request-id");
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    use axum::body::Body;
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    let t = build_test_app();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/auth/login")
        .header("origin", "http://localhost:5173")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let response = t.app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers["access-control-allow-origin"],
        "http://localhost:5173"
    );
    assert_eq!(headers["access-control-allow-credentials"], "true");
}
