/// The closed set of fault kinds this subsystem reports.
///
/// Every failure that leaves the authentication layer is one of these;
/// backend- and driver-specific error types are translated at the crate
/// boundary and never escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Backend credentials are absent. Not retriable.
    Configuration,
    /// Timeout, network failure, or server-side fault talking to the backend.
    Connectivity,
    /// A connectivity fault whose signature says the handle's credential expired.
    CredentialExpired,
    /// The caller's credential or session was refused. Requires re-login.
    AuthenticationRejected,
    /// Session bookkeeping could not be read or written.
    Persistence,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Service unavailable: {0}")]
    Configuration(String),

    #[error("Backend unreachable: {0}")]
    Connectivity(String),

    #[error("Backend credential expired: {0}")]
    CredentialExpired(String),

    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    #[error("Session persistence failed: {0}")]
    Persistence(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Build the error variant corresponding to a classified fault.
    pub fn from_fault(kind: FaultKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            FaultKind::Configuration => CoreError::Configuration(message),
            FaultKind::Connectivity => CoreError::Connectivity(message),
            FaultKind::CredentialExpired => CoreError::CredentialExpired(message),
            FaultKind::AuthenticationRejected => CoreError::AuthenticationRejected(message),
            FaultKind::Persistence => CoreError::Persistence(message),
        }
    }

    /// The fault kind of this error, if it belongs to the backend taxonomy.
    ///
    /// Route-level variants (`NotFound`, `Validation`, ...) return `None`.
    pub fn kind(&self) -> Option<FaultKind> {
        match self {
            CoreError::Configuration(_) => Some(FaultKind::Configuration),
            CoreError::Connectivity(_) => Some(FaultKind::Connectivity),
            CoreError::CredentialExpired(_) => Some(FaultKind::CredentialExpired),
            CoreError::AuthenticationRejected(_) => Some(FaultKind::AuthenticationRejected),
            CoreError::Persistence(_) => Some(FaultKind::Persistence),
            _ => None,
        }
    }

    /// Connectivity faults (including expired credentials) may be retried;
    /// nothing else is.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind(),
            Some(FaultKind::Connectivity | FaultKind::CredentialExpired)
        )
    }
}
