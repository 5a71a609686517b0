//! Per-role credential handle cache.
//!
//! One slot per [`Role`]. Reads take a short, synchronous read lock and
//! clone the `Arc`; they never wait on handle creation. Creation is
//! serialized per role behind an async mutex, so N concurrent misses
//! produce exactly one new handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use keyward_core::config::AuthConfig;
use keyward_core::error::CoreError;
use keyward_core::signatures::FaultSignatures;
use keyward_core::types::Role;
use tokio::sync::Mutex;

use crate::connector::Connector;
use crate::error::BackendError;
use crate::handle::CredentialHandle;
use crate::probe::ConnectivityProbe;

#[derive(Default)]
struct Slot {
    current: RwLock<Option<Arc<CredentialHandle>>>,
    creation: Mutex<()>,
    /// Bumped every time a new handle is installed.
    generation: AtomicU64,
}

impl Slot {
    fn load(&self) -> Option<Arc<CredentialHandle>> {
        self.current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn store(&self, handle: Option<Arc<CredentialHandle>>) -> Option<Arc<CredentialHandle>> {
        let mut current = self.current.write().unwrap_or_else(|p| p.into_inner());
        std::mem::replace(&mut *current, handle)
    }
}

pub struct CredentialHandleCache {
    connector: Arc<dyn Connector>,
    probe: Arc<ConnectivityProbe>,
    ttl: Duration,
    connect_timeout: Duration,
    signatures: FaultSignatures,
    standard: Slot,
    elevated: Slot,
}

impl CredentialHandleCache {
    pub fn new(
        connector: Arc<dyn Connector>,
        probe: Arc<ConnectivityProbe>,
        ttl: Duration,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            probe,
            ttl,
            connect_timeout,
            signatures: FaultSignatures::default(),
            standard: Slot::default(),
            elevated: Slot::default(),
        }
    }

    pub fn from_config(
        connector: Arc<dyn Connector>,
        probe: Arc<ConnectivityProbe>,
        config: &AuthConfig,
    ) -> Self {
        Self::new(connector, probe, config.handle_ttl, config.connect_timeout)
    }

    fn slot(&self, role: Role) -> &Slot {
        match role {
            Role::Standard => &self.standard,
            Role::Elevated => &self.elevated,
        }
    }

    pub fn probe(&self) -> &Arc<ConnectivityProbe> {
        &self.probe
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_configured(&self, role: Role) -> bool {
        self.connector.is_configured(role)
    }

    /// Return a usable handle for `role`, creating one if needed.
    ///
    /// The cached handle is returned unless there is none, `force_refresh`
    /// is set, it is older than the TTL, or its last health check failed.
    /// A new handle is probed once before it is cached; if that probe
    /// fails the handle is discarded and the classified fault returned.
    ///
    /// Concurrent callers that miss together share one creation: whoever
    /// waited on the creation lock picks up the handle the winner installed.
    pub async fn get(
        &self,
        role: Role,
        force_refresh: bool,
    ) -> Result<Arc<CredentialHandle>, CoreError> {
        if !self.connector.is_configured(role) {
            return Err(CoreError::Configuration(format!(
                "backend credentials for the {role} role are not configured"
            )));
        }

        let slot = self.slot(role);
        let observed = slot.generation.load(Ordering::Acquire);

        if !force_refresh {
            if let Some(handle) = slot.load() {
                if handle.is_usable(self.ttl) {
                    return Ok(handle);
                }
            }
        }

        let _creating = slot.creation.lock().await;

        if let Some(handle) = slot.load() {
            let replaced_while_waiting = slot.generation.load(Ordering::Acquire) != observed;
            if handle.is_usable(self.ttl) && (replaced_while_waiting || !force_refresh) {
                return Ok(handle);
            }
        }

        let handle = self.create(role).await?;
        slot.store(Some(Arc::clone(&handle)));
        slot.generation.fetch_add(1, Ordering::AcqRel);
        Ok(handle)
    }

    /// Drop the cached handle for `role`; the next `get` creates a new one.
    pub fn invalidate(&self, role: Role) {
        if self.slot(role).store(None).is_some() {
            tracing::info!(role = %role, "Backend handle invalidated");
        }
    }

    /// The cached handle, if any, without policy checks.
    pub fn peek(&self, role: Role) -> Option<Arc<CredentialHandle>> {
        self.slot(role).load()
    }

    /// Release every cached handle. Called at shutdown after the renewal
    /// loop has exited.
    pub fn clear(&self) {
        for role in Role::ALL {
            self.slot(role).store(None);
        }
        tracing::info!("Backend handle cache cleared");
    }

    async fn create(&self, role: Role) -> Result<Arc<CredentialHandle>, CoreError> {
        let connected =
            tokio::time::timeout(self.connect_timeout, self.connector.connect(role)).await;
        let backend = match connected {
            Ok(Ok(backend)) => backend,
            Ok(Err(e)) => return Err(e.into_core(&self.signatures)),
            Err(_) => {
                return Err(BackendError::Timeout(self.connect_timeout).into_core(&self.signatures))
            }
        };

        let handle = Arc::new(CredentialHandle::new(role, backend));
        if let Err(e) = self.probe.check(&handle).await {
            tracing::warn!(role = %role, error = %e, "New backend handle failed its first probe");
            return Err(e);
        }

        tracing::info!(role = %role, "Backend handle created");
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::fake::{FakeBackend, FakeConnector, Failure};

    const TTL: Duration = Duration::from_secs(15 * 60);

    fn setup() -> (Arc<CredentialHandleCache>, Arc<FakeConnector>) {
        let connector = Arc::new(FakeConnector::new(FakeBackend::default()));
        let probe = Arc::new(ConnectivityProbe::new(3, Duration::from_secs(5)));
        let cache = Arc::new(CredentialHandleCache::new(
            connector.clone(),
            probe,
            TTL,
            Duration::from_secs(10),
        ));
        (cache, connector)
    }

    #[tokio::test(start_paused = true)]
    async fn same_handle_within_ttl() {
        let (cache, connector) = setup();
        let a = cache.get(Role::Standard, false).await.unwrap();
        tokio::time::advance(TTL - Duration::from_secs(1)).await;
        let b = cache.get(Role::Standard, false).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_handle_after_ttl() {
        let (cache, connector) = setup();
        let a = cache.get(Role::Standard, false).await.unwrap();
        tokio::time::advance(TTL).await;
        let b = cache.get(Role::Standard, false).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn new_handle_after_failed_health_check() {
        let (cache, connector) = setup();
        let a = cache.get(Role::Elevated, false).await.unwrap();

        connector.backend().fail_next_selects(1, Failure::status(503, "down"));
        assert!(!cache.probe().test(&a).await);

        let b = cache.get(Role::Elevated, false).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_and_force_refresh_recreate() {
        let (cache, _connector) = setup();
        let a = cache.get(Role::Elevated, false).await.unwrap();

        cache.invalidate(Role::Elevated);
        assert!(cache.peek(Role::Elevated).is_none());
        let b = cache.get(Role::Elevated, false).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));

        let c = cache.get(Role::Elevated, true).await.unwrap();
        assert!(!Arc::ptr_eq(&b, &c));
    }

    #[tokio::test(start_paused = true)]
    async fn roles_are_cached_independently() {
        let (cache, _connector) = setup();
        let standard = cache.get(Role::Standard, false).await.unwrap();
        let elevated = cache.get(Role::Elevated, false).await.unwrap();
        assert_eq!(standard.role(), Role::Standard);
        assert_eq!(elevated.role(), Role::Elevated);

        cache.invalidate(Role::Standard);
        assert!(cache.peek(Role::Elevated).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_create_one_handle() {
        let (cache, connector) = setup();

        let calls = (0..16).map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get(Role::Standard, false).await })
        });
        let handles: Vec<_> = futures::future::join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(connector.connects(), 1);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_forced_refreshes_create_one_handle() {
        let (cache, connector) = setup();
        cache.get(Role::Elevated, false).await.unwrap();

        let calls = (0..8).map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get(Role::Elevated, true).await })
        });
        futures::future::join_all(calls).await;

        // One initial creation, then the forced refreshes collapse onto one.
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn unconfigured_role_is_configuration_error() {
        let (cache, connector) = setup();
        connector.set_configured(Role::Elevated, false);
        assert_matches!(
            cache.get(Role::Elevated, false).await,
            Err(CoreError::Configuration(_))
        );
        assert!(cache.get(Role::Standard, false).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_first_probe_is_not_cached() {
        let (cache, connector) = setup();
        connector.backend().fail_next_selects(1, Failure::status(503, "down"));

        assert_matches!(
            cache.get(Role::Standard, false).await,
            Err(CoreError::Connectivity(_))
        );
        assert!(cache.peek(Role::Standard).is_none());
        assert!(cache.get(Role::Standard, false).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_connect_is_bounded() {
        let (cache, connector) = setup();
        connector.fail_connects(Some(Failure::Hang));
        assert_matches!(
            cache.get(Role::Standard, false).await,
            Err(CoreError::Connectivity(_))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn clear_drops_everything() {
        let (cache, _connector) = setup();
        cache.get(Role::Standard, false).await.unwrap();
        cache.get(Role::Elevated, false).await.unwrap();
        cache.clear();
        assert!(cache.peek(Role::Standard).is_none());
        assert!(cache.peek(Role::Elevated).is_none());
    }
}
