#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use keyward_api::config::ServerConfig;
use keyward_api::router::build_app_router;
use keyward_api::state::AppState;
use keyward_backend::fake::{FakeBackend, FakeConnector};
use keyward_backend::BackendCredentials;
use keyward_core::clock::ManualClock;
use keyward_core::config::{AuthConfig, Environment};
use keyward_core::types::UserId;
use keyward_db::MemorySessionStore;
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "correct horse battery staple";

/// Build a test `ServerConfig` with development defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        database_url: None,
        auth: AuthConfig::for_environment(Environment::Development),
        backend: BackendCredentials::default(),
    }
}

/// Everything a router test needs to script the backend and inspect state.
pub struct TestApp {
    pub router: Router,
    pub backend: FakeBackend,
    pub connector: Arc<FakeConnector>,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn app(&self) -> Router {
        self.router.clone()
    }
}

/// Build the full application router over an in-memory session store and
/// a scripted backend.
///
/// Uses the same [`build_app_router`] as `main.rs` so tests exercise the
/// production middleware stack.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let backend = FakeBackend::default();
    let connector = Arc::new(FakeConnector::new(backend.clone()));
    let clock = Arc::new(ManualClock::starting_now());

    let state = AppState::new(
        config.clone(),
        Arc::new(MemorySessionStore::new()),
        connector.clone(),
        clock.clone(),
    );
    let router = build_app_router(state.clone(), &config);

    TestApp {
        router,
        backend,
        connector,
        state,
        clock,
    }
}

/// Register a user in the backend: a sign-in account and a `users` row.
pub fn seed_user(backend: &FakeBackend, email: &str, role: &str, is_active: bool) -> UserId {
    let id = Uuid::new_v4();
    backend.add_account(id, email, PASSWORD);
    backend.insert_row(
        "users",
        serde_json::json!({
            "id": id,
            "email": email,
            "name": "Test User",
            "role": role,
            "company_id": null,
            "is_active": is_active,
        }),
    );
    id
}

/// Log in through the API and return the JSON body. Panics unless 200.
pub async fn login(app: Router, email: &str) -> serde_json::Value {
    let body = serde_json::json!({ "email": email, "password": PASSWORD });
    let response = post_json(app, "/api/v1/auth/login", body).await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    body_json(response).await
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, request(Method::GET, uri, None, None)).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, request(Method::GET, uri, Some(token), None)).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, request(Method::POST, uri, None, Some(body))).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    send(app, request(Method::POST, uri, Some(token), Some(body))).await
}

pub async fn post_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, request(Method::POST, uri, Some(token), None)).await
}

pub async fn delete_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, request(Method::DELETE, uri, Some(token), None)).await
}

/// Collect the response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
