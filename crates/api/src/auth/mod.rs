//! Authentication primitives.
//!
//! - [`identity`] -- `get_current_identity`: backend verification, session
//!   validation and profile lookup composed into one check.

pub mod identity;
