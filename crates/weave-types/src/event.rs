//! Events emitted by the engine while a workflow runs.
//!
//! Published on the core event bus. Notification sinks subscribe and filter
//! on the `type` tag (`workflow_complete`, `workflow_failed`,
//! `human_review_required`, ...).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        workflow_id: String,
        execution_id: Uuid,
    },
    StepStarted {
        workflow_id: String,
        execution_id: Uuid,
        step_id: String,
        attempt: u32,
    },
    StepCompleted {
        workflow_id: String,
        execution_id: Uuid,
        step_id: String,
        duration_ms: u64,
    },
    StepFailed {
        workflow_id: String,
        execution_id: Uuid,
        step_id: String,
        error: String,
        will_retry: bool,
    },
    StepSkipped {
        workflow_id: String,
        execution_id: Uuid,
        step_id: String,
    },
    HumanReviewRequired {
        workflow_id: String,
        execution_id: Uuid,
        step_id: String,
        step_name: String,
    },
    WorkflowComplete {
        workflow_id: String,
        execution_id: Uuid,
        channels: Vec<String>,
    },
    WorkflowFailed {
        workflow_id: String,
        execution_id: Uuid,
        error: String,
        channels: Vec<String>,
    },
    WorkflowCancelled {
        workflow_id: String,
        execution_id: Uuid,
    },
}

impl WorkflowEvent {
    pub fn execution_id(&self) -> Uuid {
        match self {
            WorkflowEvent::WorkflowStarted { execution_id, .. }
            | WorkflowEvent::StepStarted { execution_id, .. }
            | WorkflowEvent::StepCompleted { execution_id, .. }
            | WorkflowEvent::StepFailed { execution_id, .. }
            | WorkflowEvent::StepSkipped { execution_id, .. }
            | WorkflowEvent::HumanReviewRequired { execution_id, .. }
            | WorkflowEvent::WorkflowComplete { execution_id, .. }
            | WorkflowEvent::WorkflowFailed { execution_id, .. }
            | WorkflowEvent::WorkflowCancelled { execution_id, .. } => *execution_id,
        }
    }
}
