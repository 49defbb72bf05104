//! Workflow engine core: definitions, graph scheduling and step execution.
//!
//! - `definition` -- YAML parsing, validation, filesystem load/save
//! - `dag` -- entry steps, cycle detection, levels and the compiled plan
//! - `reference` -- `$`-reference resolution for step inputs
//! - `condition` -- condition expression parser and evaluator
//! - `retry` -- attempt limits and exponential backoff
//! - `checkpoint` -- step journal and execution snapshots
//! - `scheduler` -- ready-set computation
//! - `step_runner` -- runs one step: gate, tool call, retries, bookkeeping
//! - `orchestrator` -- runs, pauses, resumes and looks up executions
//! - `builder` -- fluent authoring API

pub mod builder;
pub mod checkpoint;
pub mod condition;
pub mod dag;
pub mod definition;
pub mod handle;
pub mod orchestrator;
pub mod reference;
pub mod retry;
pub mod scheduler;
pub mod step_runner;

pub use builder::{StepBuilder, WorkflowBuilder};
pub use dag::ExecutionPlan;
pub use definition::WorkflowError;
pub use orchestrator::{Orchestrator, OrchestratorError, ReviewDecision, RunRequest};
