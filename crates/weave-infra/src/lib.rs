//! Infrastructure implementations for Weave.
//!
//! Concrete adapters for the ports defined in `weave-core`: a SQLite
//! execution store and the TOML config loader.

pub mod config;
pub mod sqlite;
