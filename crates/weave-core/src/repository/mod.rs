//! Storage ports for execution state.
//!
//! `execution` defines the `ExecutionStore` trait; `memory` provides an
//! in-process implementation. `weave-infra` implements the trait on SQLite.

pub mod execution;
pub mod memory;

pub use execution::ExecutionStore;
pub use memory::InMemoryExecutionStore;
