//! Well-known user role names as stored in the `users.role` column.

pub const ROLE_ADMIN: &str = "ADMIN";
pub const ROLE_MANAGER: &str = "MANAGER";
pub const ROLE_COLLABORATOR: &str = "COLLABORATOR";
