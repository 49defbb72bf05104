//! Agent boundary: the tool-executor contract and agent resolution.
//!
//! - `executor` -- `ToolExecutor` trait, `ToolCallError`, closure adapter
//! - `box_executor` -- object-safe `BoxToolExecutor` wrapper
//! - `registry` -- `AgentResolver` trait and the injected `AgentRegistry`

pub mod box_executor;
pub mod executor;
pub mod registry;

pub use box_executor::BoxToolExecutor;
pub use executor::{FnToolExecutor, ToolCallError, ToolExecutor};
pub use registry::{AgentRegistry, AgentResolver};
