//! Durable checkpoints for workflow execution state.
//!
//! Wraps an [`ExecutionStore`] with the two operations the engine needs:
//! appending step transitions to the journal, and saving or restoring full
//! execution snapshots so a paused run can be resumed after a restart.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;
use weave_types::execution::{StepStatus, StepTransition, WorkflowExecution};

use crate::repository::execution::ExecutionStore;

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Generic over `S: ExecutionStore` so it works with the SQLite store or the
/// in-memory one.
pub struct CheckpointManager<S: ExecutionStore> {
    store: S,
}

impl<S: ExecutionStore> CheckpointManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Step journal
    // -----------------------------------------------------------------------

    /// Append one step state change to the journal.
    pub async fn record(
        &self,
        execution_id: Uuid,
        step_id: &str,
        status: StepStatus,
        attempt: u32,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), CheckpointError> {
        let transition = StepTransition {
            execution_id,
            step_id: step_id.to_string(),
            status,
            attempt,
            output: output.cloned(),
            error: error.map(str::to_string),
            recorded_at: Utc::now(),
        };

        self.store
            .append_transition(&transition)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(
            execution_id = %execution_id,
            step_id,
            status = status.as_str(),
            attempt,
            "checkpointed step transition"
        );
        Ok(())
    }

    /// The journal for an execution, oldest first.
    pub async fn transitions(&self, execution_id: Uuid) -> Result<Vec<StepTransition>, CheckpointError> {
        self.store
            .list_transitions(&execution_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub async fn save_snapshot(&self, execution: &WorkflowExecution) -> Result<(), CheckpointError> {
        self.store
            .save_execution(execution)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(
            execution_id = %execution.id,
            status = execution.status.as_str(),
            "checkpointed execution snapshot"
        );
        Ok(())
    }

    /// Load a persisted snapshot.
    pub async fn restore(&self, execution_id: Uuid) -> Result<WorkflowExecution, CheckpointError> {
        self.store
            .load_execution(&execution_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?
            .ok_or(CheckpointError::ExecutionNotFound(execution_id))
    }

    pub async fn list(&self, organization_id: Option<&str>) -> Result<Vec<WorkflowExecution>, CheckpointError> {
        self.store
            .list_executions(organization_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint repository error: {0}")]
    Repository(String),

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
