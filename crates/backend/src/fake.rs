//! In-process scripted backend.
//!
//! [`FakeBackend`] answers every [`Backend`] call from shared in-memory
//! state and can be told to fail or hang. [`FakeConnector`] hands out
//! clones of one `FakeBackend`, so a test can script behavior after the
//! cache has already built its handles. Used by the unit tests in this
//! crate and by the router tests in the API crate.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use keyward_core::types::{Role, Timestamp, UserId};

use crate::client::{Backend, FilterOp, TableQuery, TokenPair, VerifiedIdentity};
use crate::connector::Connector;
use crate::error::BackendError;

/// How an injected failure manifests.
#[derive(Debug, Clone)]
pub enum Failure {
    /// Answer with this HTTP status and body.
    Status { status: u16, body: String },
    /// Never answer; the caller's timeout decides.
    Hang,
}

impl Failure {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Failure::Status {
            status,
            body: body.into(),
        }
    }

    /// The signature body a backend returns for an expired handle credential.
    pub fn expired_credential() -> Self {
        Failure::status(500, r#"{"code":"PGRST301","message":"JWT expired"}"#)
    }

    async fn raise<T>(self) -> Result<T, BackendError> {
        match self {
            Failure::Status { status, body } => Err(BackendError::Status { status, body }),
            Failure::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    tables: HashMap<String, Vec<serde_json::Value>>,
    passwords: HashMap<String, (String, UserId)>,
    identities: HashMap<String, VerifiedIdentity>,
    refresh_tokens: HashMap<String, UserId>,
    signed_out: Vec<String>,
    select_failure: Option<Failure>,
    queued_select_failures: VecDeque<Failure>,
    auth_failure: Option<Failure>,
    token_counter: u64,
    select_calls: usize,
}

/// Scripted [`Backend`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Add a row to `table`.
    pub fn insert_row(&self, table: &str, row: serde_json::Value) {
        self.state()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// Drop every row of `table`.
    pub fn clear_table(&self, table: &str) {
        self.state().tables.remove(table);
    }

    /// Register a user that can sign in with `email` / `password`.
    pub fn add_account(&self, user_id: UserId, email: &str, password: &str) {
        self.state()
            .passwords
            .insert(email.to_string(), (password.to_string(), user_id));
    }

    /// Make `bearer` verify as `user_id`.
    pub fn add_identity(
        &self,
        bearer: &str,
        user_id: UserId,
        email: Option<&str>,
        expires_at: Option<Timestamp>,
    ) {
        self.state().identities.insert(
            bearer.to_string(),
            VerifiedIdentity {
                subject: user_id,
                email: email.map(str::to_string),
                expires_at,
            },
        );
    }

    /// Fail every `select` until [`heal`](Self::heal).
    pub fn fail_selects(&self, failure: Failure) {
        self.state().select_failure = Some(failure);
    }

    /// Fail the next `n` `select` calls, then answer normally.
    pub fn fail_next_selects(&self, n: usize, failure: Failure) {
        let mut state = self.state();
        for _ in 0..n {
            state.queued_select_failures.push_back(failure.clone());
        }
    }

    /// Fail every identity/token call until [`heal`](Self::heal).
    pub fn fail_auth(&self, failure: Failure) {
        self.state().auth_failure = Some(failure);
    }

    pub fn heal(&self) {
        let mut state = self.state();
        state.select_failure = None;
        state.queued_select_failures.clear();
        state.auth_failure = None;
    }

    pub fn select_calls(&self) -> usize {
        self.state().select_calls
    }

    /// Bearers passed to `sign_out`, in call order.
    pub fn signed_out(&self) -> Vec<String> {
        self.state().signed_out.clone()
    }

    fn auth_failure(&self) -> Option<Failure> {
        self.state().auth_failure.clone()
    }

    fn issue_tokens(&self, user_id: UserId, email: Option<String>) -> TokenPair {
        let mut state = self.state();
        state.token_counter += 1;
        let n = state.token_counter;
        let pair = TokenPair {
            access_token: format!("access-{n}-{user_id}"),
            refresh_token: format!("refresh-{n}-{user_id}"),
            expires_in: Some(3600),
        };
        state.identities.insert(
            pair.access_token.clone(),
            VerifiedIdentity {
                subject: user_id,
                email,
                expires_at: None,
            },
        );
        state
            .refresh_tokens
            .insert(pair.refresh_token.clone(), user_id);
        pair
    }
}

fn matches_filters(row: &serde_json::Value, query: &TableQuery) -> bool {
    query.filters.iter().all(|f| {
        let Some(field) = row.get(&f.column) else {
            return false;
        };
        let actual = match field {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match f.op {
            FilterOp::Eq => actual == f.value,
            FilterOp::Gt => actual > f.value,
            FilterOp::Gte => actual >= f.value,
            FilterOp::Lt => actual < f.value,
            FilterOp::Lte => actual <= f.value,
        }
    })
}

fn invalid_grant(description: &str) -> BackendError {
    BackendError::Status {
        status: 400,
        body: format!(r#"{{"error":"invalid_grant","error_description":"{description}"}}"#),
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn verify_identity(&self, bearer: &str) -> Result<VerifiedIdentity, BackendError> {
        if let Some(failure) = self.auth_failure() {
            return failure.raise().await;
        }
        self.state()
            .identities
            .get(bearer)
            .cloned()
            .ok_or_else(|| BackendError::Status {
                status: 401,
                body: r#"{"msg":"invalid claim: user not found"}"#.into(),
            })
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<TokenPair, BackendError> {
        if let Some(failure) = self.auth_failure() {
            return failure.raise().await;
        }
        let account = self.state().passwords.get(email).cloned();
        match account {
            Some((expected, user_id)) if expected == password => {
                Ok(self.issue_tokens(user_id, Some(email.to_string())))
            }
            _ => Err(invalid_grant("Invalid login credentials")),
        }
    }

    async fn refresh_credential(&self, refresh_token: &str) -> Result<TokenPair, BackendError> {
        if let Some(failure) = self.auth_failure() {
            return failure.raise().await;
        }
        let user_id = self.state().refresh_tokens.remove(refresh_token);
        match user_id {
            Some(user_id) => Ok(self.issue_tokens(user_id, None)),
            None => Err(invalid_grant("Invalid Refresh Token: Already Used")),
        }
    }

    async fn sign_out(&self, bearer: &str) -> Result<(), BackendError> {
        if let Some(failure) = self.auth_failure() {
            return failure.raise().await;
        }
        let mut state = self.state();
        state.identities.remove(bearer);
        state.signed_out.push(bearer.to_string());
        Ok(())
    }

    async fn select(&self, query: &TableQuery) -> Result<Vec<serde_json::Value>, BackendError> {
        let failure = {
            let mut state = self.state();
            state.select_calls += 1;
            match state.queued_select_failures.pop_front() {
                Some(failure) => Some(failure),
                None => state.select_failure.clone(),
            }
        };
        if let Some(failure) = failure {
            return failure.raise().await;
        }

        let state = self.state();
        let rows = state
            .tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_filters(row, query))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(match query.limit {
            Some(limit) => rows.into_iter().take(limit as usize).collect(),
            None => rows,
        })
    }
}

/// [`Connector`] over a shared [`FakeBackend`].
#[derive(Debug)]
pub struct FakeConnector {
    backend: FakeBackend,
    configured: Mutex<HashSet<Role>>,
    connect_failure: Mutex<Option<Failure>>,
    connects: AtomicUsize,
}

impl FakeConnector {
    /// Both roles configured.
    pub fn new(backend: FakeBackend) -> Self {
        Self {
            backend,
            configured: Mutex::new(Role::ALL.into_iter().collect()),
            connect_failure: Mutex::new(None),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn backend(&self) -> &FakeBackend {
        &self.backend
    }

    pub fn set_configured(&self, role: Role, configured: bool) {
        let mut set = self.configured.lock().unwrap_or_else(|p| p.into_inner());
        if configured {
            set.insert(role);
        } else {
            set.remove(&role);
        }
    }

    /// Make every `connect` fail (or hang) until cleared with `None`.
    pub fn fail_connects(&self, failure: Option<Failure>) {
        *self.connect_failure.lock().unwrap_or_else(|p| p.into_inner()) = failure;
    }

    /// Number of `connect` calls that produced a backend.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    fn is_configured(&self, role: Role) -> bool {
        self.configured
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&role)
    }

    async fn connect(&self, role: Role) -> Result<Arc<dyn Backend>, BackendError> {
        if !self.is_configured(role) {
            return Err(BackendError::NotConfigured(role));
        }
        let failure = self
            .connect_failure
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        if let Some(failure) = failure {
            return failure.raise().await;
        }
        // Yield so concurrent cache misses genuinely overlap in tests.
        tokio::task::yield_now().await;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.backend.clone()))
    }
}
