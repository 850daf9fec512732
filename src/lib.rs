//! Todo API — a small CRUD service over libSQL.

pub mod config;
pub mod error;
pub mod rate_limit;
pub mod server;
pub mod store;
pub mod todos;
