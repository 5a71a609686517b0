use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use keyward_api::background::session_cleanup;
use keyward_api::config::ServerConfig;
use keyward_api::router::build_app_router;
use keyward_api::state::AppState;
use keyward_backend::{RenewalConfig, RenewalScheduler, RestConnector};
use keyward_core::clock::SystemClock;
use keyward_core::types::Role;
use keyward_db::{MemorySessionStore, PgSessionStore, SessionStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "keyward_api=debug,keyward_backend=debug,tower_http=debug".into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        environment = config.auth.environment.as_str(),
        persistence_mode = ?config.auth.persistence_mode,
        "Loaded server configuration"
    );

    // --- Session store ---
    let store: Arc<dyn SessionStore> = match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = keyward_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            keyward_db::health_check(&pool)
                .await
                .expect("Database health check failed");

            keyward_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            Arc::new(PgSessionStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, sessions are kept in memory only");
            Arc::new(MemorySessionStore::new())
        }
    };

    // --- Backend handles ---
    let connector = Arc::new(RestConnector::new(
        config.backend.clone(),
        config.auth.probe_timeout,
    ));
    let state = AppState::new(config.clone(), store, connector, Arc::new(SystemClock));

    // Warm the cache; a backend outage at boot is not fatal.
    for role in Role::ALL {
        if !state.cache.is_configured(role) {
            tracing::warn!(role = %role, "Backend credentials not configured for role");
            continue;
        }
        match state.cache.get(role, false).await {
            Ok(_) => tracing::info!(role = %role, "Backend handle ready"),
            Err(e) => tracing::warn!(role = %role, error = %e, "Backend handle warm-up failed"),
        }
    }

    // --- Background tasks ---
    let cancel = CancellationToken::new();

    let renewal = RenewalScheduler::new(
        Arc::clone(&state.cache),
        RenewalConfig::from_config(&config.auth),
    )
    .spawn(cancel.child_token());

    let mut cleanup_handle = tokio::spawn(session_cleanup::run(
        Arc::clone(&state.registry),
        config.auth.cleanup_grace_days,
        config.auth.cleanup_interval,
        cancel.child_token(),
    ));

    tracing::info!("Background services started (handle renewal, session cleanup)");

    // --- Router ---
    let app = build_app_router(state.clone(), &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if !renewal.shutdown_within(shutdown_timeout).await {
        tracing::warn!("Renewal loop did not stop within the shutdown timeout and was aborted");
    }

    match tokio::time::timeout(Duration::from_secs(5), &mut cleanup_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Session cleanup task failed"),
        Err(_) => {
            tracing::warn!("Session cleanup task did not stop in time, aborting");
            cleanup_handle.abort();
        }
    }
    tracing::info!("Background services stopped");

    // The renewal task is gone, so nothing can reinstall a handle.
    state.cache.clear();

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
