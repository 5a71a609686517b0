//! Raw backend failures and their classification.
//!
//! [`BackendError`] is what the HTTP client produces. It is public so that
//! the [`Backend`](crate::client::Backend) trait can be implemented outside
//! this crate, but every operation that leaves the authentication layer
//! passes it through [`classify`] first and surfaces a [`CoreError`].

use std::time::Duration;

use keyward_core::error::{CoreError, FaultKind};
use keyward_core::signatures::FaultSignatures;
use keyward_core::types::Role;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The underlying HTTP request failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The call did not complete within its deadline.
    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered 2xx with a body we could not interpret.
    #[error("Unexpected backend response: {0}")]
    Decode(String),

    /// No credentials are configured for the requested role.
    #[error("Backend credentials for the {0} role are not configured")]
    NotConfigured(Role),
}

impl BackendError {
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            BackendError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Translate into the closed taxonomy using the given signatures.
    pub fn into_core(self, signatures: &FaultSignatures) -> CoreError {
        let kind = classify(&self, signatures);
        CoreError::from_fault(kind, self.to_string())
    }
}

/// Map a raw backend error onto a [`FaultKind`].
///
/// | Error                                   | Kind                     |
/// |-----------------------------------------|--------------------------|
/// | `NotConfigured`                         | `Configuration`          |
/// | `Timeout`, `Request`, `Decode`          | `Connectivity`           |
/// | 401/403/5xx with expired signature      | `CredentialExpired`      |
/// | 400/401/403/422 otherwise               | `AuthenticationRejected` |
/// | any other status                        | `Connectivity`           |
pub fn classify(err: &BackendError, signatures: &FaultSignatures) -> FaultKind {
    match err {
        BackendError::NotConfigured(_) => FaultKind::Configuration,
        BackendError::Timeout(_) | BackendError::Decode(_) => FaultKind::Connectivity,
        BackendError::Request(e) => match e.status().map(|s| s.as_u16()) {
            Some(401 | 403) => FaultKind::AuthenticationRejected,
            _ => FaultKind::Connectivity,
        },
        BackendError::Status { status, body } => {
            let expired = signatures.matches(body);
            match status {
                401 | 403 if expired => FaultKind::CredentialExpired,
                400 | 401 | 403 | 422 => FaultKind::AuthenticationRejected,
                500..=599 if expired => FaultKind::CredentialExpired,
                _ => FaultKind::Connectivity,
            }
        }
    }
}

impl From<BackendError> for CoreError {
    fn from(err: BackendError) -> Self {
        err.into_core(&FaultSignatures::default())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn status(status: u16, body: &str) -> BackendError {
        BackendError::Status {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn server_fault_with_expiry_signature_is_credential_expired() {
        let sigs = FaultSignatures::default();
        let err = status(500, r#"{"code":"PGRST301","message":"JWT expired"}"#);
        assert_eq!(classify(&err, &sigs), FaultKind::CredentialExpired);
    }

    #[test]
    fn plain_server_fault_is_connectivity() {
        let sigs = FaultSignatures::default();
        assert_eq!(
            classify(&status(503, "upstream unavailable"), &sigs),
            FaultKind::Connectivity
        );
    }

    #[test]
    fn unauthorized_without_signature_is_rejection() {
        let sigs = FaultSignatures::default();
        assert_eq!(
            classify(&status(401, r#"{"msg":"user not found"}"#), &sigs),
            FaultKind::AuthenticationRejected
        );
        assert_eq!(
            classify(&status(401, "JWT expired"), &sigs),
            FaultKind::CredentialExpired
        );
    }

    #[test]
    fn invalid_grant_is_rejection() {
        let sigs = FaultSignatures::default();
        assert_eq!(
            classify(
                &status(400, r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#),
                &sigs
            ),
            FaultKind::AuthenticationRejected
        );
        assert_eq!(classify(&status(404, "not found"), &sigs), FaultKind::Connectivity);
    }

    #[test]
    fn timeout_and_configuration() {
        let sigs = FaultSignatures::default();
        assert_eq!(
            classify(&BackendError::Timeout(Duration::from_secs(5)), &sigs),
            FaultKind::Connectivity
        );
        assert_eq!(
            classify(&BackendError::NotConfigured(Role::Elevated), &sigs),
            FaultKind::Configuration
        );
    }

    #[test]
    fn conversion_produces_matching_core_variant() {
        let core: CoreError = status(500, "jwt expired").into();
        assert_matches!(core, CoreError::CredentialExpired(_));

        let core: CoreError = BackendError::NotConfigured(Role::Standard).into();
        assert_matches!(core, CoreError::Configuration(_));
    }
}
