//! Shared domain types for Weave.
//!
//! Workflow definitions, execution records, the condition AST, value paths,
//! engine events and configuration. Everything here is plain data with serde
//! support; behavior lives in `weave-core`.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod condition;
pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod path;
pub mod workflow;
