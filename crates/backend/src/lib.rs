//! Connection management for the identity/data backend.
//!
//! - [`client`] -- the [`Backend`](client::Backend) trait and its REST implementation.
//! - [`connector`] -- builds role-scoped backends from configured credentials.
//! - [`cache`] -- [`CredentialHandleCache`](cache::CredentialHandleCache): per-role
//!   handles with TTL, health tracking and single-flight creation.
//! - [`probe`] -- [`ConnectivityProbe`](probe::ConnectivityProbe) and the
//!   process-wide connectivity status.
//! - [`renewal`] -- the supervised proactive renewal loop.
//! - [`interceptor`] -- reactive invalidation when a call fails with an
//!   expired-credential signature.
//! - [`error`] -- raw client errors and their classification into the
//!   closed fault taxonomy.
//! - `fake` -- in-memory backend and connector, compiled for tests and
//!   behind the `test-util` feature.

pub mod cache;
pub mod client;
pub mod connector;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod handle;
pub mod interceptor;
pub mod probe;
pub mod renewal;

pub use cache::CredentialHandleCache;
pub use client::{Backend, TableQuery, TokenPair, VerifiedIdentity};
pub use connector::{BackendCredentials, Connector, RestConnector};
pub use error::{classify, BackendError};
pub use handle::CredentialHandle;
pub use interceptor::FaultInterceptor;
pub use probe::{ConnectivityProbe, ConnectivityStatus};
pub use renewal::{RenewalConfig, RenewalHandle, RenewalScheduler, RenewalState};
