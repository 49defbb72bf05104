//! SQLite storage backed by sqlx.

pub mod execution;
pub mod pool;
