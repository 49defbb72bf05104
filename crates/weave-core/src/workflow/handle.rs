//! Shared handle to one live execution.

use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;
use weave_types::execution::WorkflowExecution;

use super::dag::ExecutionPlan;

/// An execution plus the compiled plan it runs.
///
/// All bookkeeping on `state` happens under its mutex. Tool calls are made
/// with the lock released.
#[derive(Debug)]
pub struct ExecutionHandle {
    pub id: Uuid,
    pub plan: Arc<ExecutionPlan>,
    pub state: Mutex<WorkflowExecution>,
}

impl ExecutionHandle {
    pub fn new(plan: Arc<ExecutionPlan>, execution: WorkflowExecution) -> Self {
        Self {
            id: execution.id,
            plan,
            state: Mutex::new(execution),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.plan.workflow().id
    }

    /// Clone of the current state.
    pub async fn snapshot(&self) -> WorkflowExecution {
        self.state.lock().await.clone()
    }
}
