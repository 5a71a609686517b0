//! Row structs and DTOs.

pub mod session;
