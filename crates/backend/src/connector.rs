//! Role-scoped backend construction.
//!
//! A [`Connector`] knows which credentials exist for which role and builds
//! a fresh [`Backend`] on demand. The cache calls it on every miss; nothing
//! else should.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keyward_core::types::Role;

use crate::client::{Backend, RestBackend};
use crate::error::BackendError;

#[async_trait]
pub trait Connector: Send + Sync {
    /// Whether credentials for `role` are present at all.
    fn is_configured(&self, role: Role) -> bool;

    /// Build a new backend for `role`. Fails with
    /// [`BackendError::NotConfigured`] when the role has no credentials.
    async fn connect(&self, role: Role) -> Result<Arc<dyn Backend>, BackendError>;
}

/// Backend URL plus one key per role.
#[derive(Clone, Default)]
pub struct BackendCredentials {
    pub url: Option<String>,
    /// Key for the standard (anon) role.
    pub anon_key: Option<String>,
    /// Key for the elevated (service) role.
    pub service_key: Option<String>,
}

impl fmt::Debug for BackendCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("BackendCredentials")
            .field("url", &self.url)
            .field("anon_key", &redact(&self.anon_key))
            .field("service_key", &redact(&self.service_key))
            .finish()
    }
}

impl BackendCredentials {
    /// Load credentials from environment variables.
    ///
    /// | Env Var               | Role      |
    /// |-----------------------|-----------|
    /// | `BACKEND_URL`         | both      |
    /// | `BACKEND_ANON_KEY`    | standard  |
    /// | `BACKEND_SERVICE_KEY` | elevated  |
    ///
    /// Missing or empty values are not an error here; they surface as a
    /// configuration fault the first time a handle for that role is requested.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            url: var("BACKEND_URL"),
            anon_key: var("BACKEND_ANON_KEY"),
            service_key: var("BACKEND_SERVICE_KEY"),
        }
    }

    pub fn key_for(&self, role: Role) -> Option<&str> {
        match role {
            Role::Standard => self.anon_key.as_deref(),
            Role::Elevated => self.service_key.as_deref(),
        }
    }

    pub fn is_configured(&self, role: Role) -> bool {
        self.url.is_some() && self.key_for(role).is_some()
    }
}

/// [`Connector`] producing [`RestBackend`]s.
#[derive(Debug, Clone)]
pub struct RestConnector {
    credentials: BackendCredentials,
    request_timeout: Duration,
}

impl RestConnector {
    pub fn new(credentials: BackendCredentials, request_timeout: Duration) -> Self {
        Self {
            credentials,
            request_timeout,
        }
    }
}

#[async_trait]
impl Connector for RestConnector {
    fn is_configured(&self, role: Role) -> bool {
        self.credentials.is_configured(role)
    }

    async fn connect(&self, role: Role) -> Result<Arc<dyn Backend>, BackendError> {
        let (Some(url), Some(key)) = (
            self.credentials.url.as_deref(),
            self.credentials.key_for(role),
        ) else {
            return Err(BackendError::NotConfigured(role));
        };

        let backend = RestBackend::new(url, key, role, self.request_timeout)?;
        tracing::debug!(role = %role, "Constructed backend client");
        Ok(Arc::new(backend))
    }
}
