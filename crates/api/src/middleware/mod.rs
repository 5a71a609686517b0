//! Authentication and authorization middleware extractors.
//!
//! - [`auth::AuthIdentity`] -- Authenticates the Bearer token end to end.
//! - [`rbac::RequireAdmin`] -- Requires the `ADMIN` role.

pub mod auth;
pub mod rbac;
