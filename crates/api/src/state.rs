use std::sync::Arc;

use keyward_backend::{
    ConnectivityProbe, Connector, CredentialHandle, CredentialHandleCache, FaultInterceptor,
};
use keyward_core::clock::Clock;
use keyward_core::error::CoreError;
use keyward_core::types::{Role, Timestamp};
use keyward_db::SessionStore;
use serde::Serialize;

use crate::config::ServerConfig;
use crate::sessions::SessionRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Per-login session records.
    pub registry: Arc<SessionRegistry>,
    /// Per-role backend handles.
    pub cache: Arc<CredentialHandleCache>,
    /// Reactive invalidation for backend calls made on request paths.
    pub interceptor: Arc<FaultInterceptor>,
}

/// Connectivity snapshot served by `GET /health`.
#[derive(Debug, Serialize)]
pub struct ConnectivityReport {
    pub is_connected: bool,
    pub error_count: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_success: Option<Timestamp>,
    /// Both roles have credentials.
    pub credentials_configured: bool,
    pub environment: &'static str,
    pub refresh_interval_secs: u64,
    pub renewals_triggered: u64,
}

impl AppState {
    /// Wire the authentication components together.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn SessionStore>,
        connector: Arc<dyn Connector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let probe = Arc::new(ConnectivityProbe::from_config(&config.auth));
        let cache = Arc::new(CredentialHandleCache::from_config(
            connector,
            probe,
            &config.auth,
        ));
        let interceptor = Arc::new(FaultInterceptor::from_config(
            Arc::clone(&cache),
            &config.auth,
        ));
        let registry = Arc::new(SessionRegistry::from_config(store, clock, &config.auth));

        Self {
            config: Arc::new(config),
            registry,
            cache,
            interceptor,
        }
    }

    /// A usable backend handle for `role`.
    pub async fn get_handle(&self, role: Role) -> Result<Arc<CredentialHandle>, CoreError> {
        self.cache.get(role, false).await
    }

    pub fn connectivity_report(&self) -> ConnectivityReport {
        let status = self.cache.probe().status();
        ConnectivityReport {
            is_connected: status.is_connected,
            error_count: status.error_count,
            consecutive_failures: status.consecutive_failures,
            last_error: status.last_error,
            last_success: status.last_success,
            credentials_configured: Role::ALL.iter().all(|r| self.cache.is_configured(*r)),
            environment: self.config.auth.environment.as_str(),
            refresh_interval_secs: self.config.auth.renewal_interval.as_secs(),
            renewals_triggered: self.interceptor.renewals_triggered(),
        }
    }
}
