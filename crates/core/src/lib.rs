//! Shared domain types for the keyward authentication layer.
//!
//! This crate has no I/O. It defines the closed error taxonomy that every
//! other crate translates into, the environment-driven configuration, and
//! the small pure helpers (token hashing, fault signatures, user-agent
//! parsing) used on both sides of the backend boundary.

pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod hashing;
pub mod roles;
pub mod signatures;
pub mod types;
