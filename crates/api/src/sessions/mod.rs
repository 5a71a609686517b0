//! Session registry: create, validate, rotate, revoke and clean up
//! per-login session records.

pub mod registry;

pub use registry::{NewLogin, SessionRegistry};
