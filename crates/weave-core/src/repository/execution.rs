//! Execution store trait definition.
//!
//! Two entity families:
//! - **Transitions:** an append-only journal of step state changes.
//! - **Executions:** full `WorkflowExecution` snapshots, upserted by id.
//!
//! Uses native async fn in traits (Rust 2024 edition, no async_trait macro).

use std::future::Future;

use uuid::Uuid;
use weave_types::error::RepositoryError;
use weave_types::execution::{StepTransition, WorkflowExecution};

pub trait ExecutionStore: Send + Sync {
    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Append a step transition. Entries are never updated or removed.
    fn append_transition(
        &self,
        transition: &StepTransition,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// All transitions for an execution, in the order they were appended.
    fn list_transitions(
        &self,
        execution_id: &Uuid,
    ) -> impl Future<Output = Result<Vec<StepTransition>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Insert or replace an execution snapshot.
    fn save_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn load_execution(
        &self,
        execution_id: &Uuid,
    ) -> impl Future<Output = Result<Option<WorkflowExecution>, RepositoryError>> + Send;

    /// List executions newest first, optionally scoped to one organization.
    fn list_executions(
        &self,
        organization_id: Option<&str>,
    ) -> impl Future<Output = Result<Vec<WorkflowExecution>, RepositoryError>> + Send;
}
