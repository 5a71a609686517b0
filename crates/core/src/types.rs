use std::fmt;

use serde::{Deserialize, Serialize};

/// Session rows are keyed by UUID v4.
pub type SessionId = uuid::Uuid;

/// User ids are issued by the identity backend (UUID subject claims).
pub type UserId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Privilege tier of a backend handle.
///
/// `Standard` handles carry the public (anonymous) key and are used for
/// identity verification; `Elevated` handles carry the service key and are
/// used for profile reads and administrative operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Standard,
    Elevated,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Standard, Role::Elevated];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Standard => "standard",
            Role::Elevated => "elevated",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
