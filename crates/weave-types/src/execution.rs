//! Execution state for a single workflow run.
//!
//! A [`WorkflowExecution`] is the mutable record the orchestrator threads
//! through a run: shared context, raw step results, per-step bookkeeping and
//! the run-level [`ExecutionStatus`] state machine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Run-level status.
///
/// `Pending -> Running -> {Paused <-> Running} -> {Completed | Failed | Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Paused, Running)
                | (Paused, Cancelled)
                | (Paused, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "paused" => Ok(ExecutionStatus::Paused),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            other => Err(format!("unknown execution status: '{other}'")),
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling status of one step within a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    /// Condition evaluated false.
    Skipped,
    Failed,
    AwaitingReview,
    /// Review step whose decision was a rejection.
    Rejected,
    /// Parallel step beyond the per-round limit that was not executed.
    Dropped,
    /// Never became eligible: no predecessor completed successfully.
    Pruned,
}

impl StepStatus {
    /// Settled steps will not change status again within this run.
    pub fn is_settled(&self) -> bool {
        !matches!(
            self,
            StepStatus::Pending | StepStatus::Running | StepStatus::AwaitingReview
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Skipped => "skipped",
            StepStatus::Failed => "failed",
            StepStatus::AwaitingReview => "awaiting_review",
            StepStatus::Rejected => "rejected",
            StepStatus::Dropped => "dropped",
            StepStatus::Pruned => "pruned",
        }
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "running" => Ok(StepStatus::Running),
            "completed" => Ok(StepStatus::Completed),
            "skipped" => Ok(StepStatus::Skipped),
            "failed" => Ok(StepStatus::Failed),
            "awaiting_review" => Ok(StepStatus::AwaitingReview),
            "rejected" => Ok(StepStatus::Rejected),
            "dropped" => Ok(StepStatus::Dropped),
            "pruned" => Ok(StepStatus::Pruned),
            other => Err(format!("unknown step status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecution
// ---------------------------------------------------------------------------

/// Failure record for a step that exhausted its attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// One run of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// UUIDv7 execution id.
    pub id: Uuid,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    /// Default context, caller input and each completed step's output.
    pub context: Map<String, Value>,
    /// Raw tool results keyed by step id.
    #[serde(default)]
    pub step_results: HashMap<String, Value>,
    /// Steps currently in flight.
    #[serde(default)]
    pub current_steps: Vec<String>,
    /// Completed or skipped steps, in completion order.
    #[serde(default)]
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub failed_steps: HashMap<String, StepFailure>,
    /// Scheduling status per step; absent means pending.
    #[serde(default)]
    pub step_statuses: HashMap<String, StepStatus>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Step id awaiting a human decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_review: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<String>,
    /// Tenant the run belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// Terminal error message for failed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowExecution {
    /// Create a pending execution with the given starting context.
    pub fn new(workflow_id: impl Into<String>, context: Map<String, Value>) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Pending,
            context,
            step_results: HashMap::new(),
            current_steps: Vec::new(),
            completed_steps: Vec::new(),
            failed_steps: HashMap::new(),
            step_statuses: HashMap::new(),
            started_at: Utc::now(),
            completed_at: None,
            pending_review: None,
            review_notes: None,
            initiated_by: None,
            organization_id: None,
            error: None,
        }
    }

    /// Move to `next` if the state machine allows it. Returns whether the
    /// status changed. Terminal statuses stamp `completed_at`.
    pub fn transition(&mut self, next: ExecutionStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        true
    }

    pub fn step_status(&self, step_id: &str) -> StepStatus {
        self.step_statuses.get(step_id).copied().unwrap_or_default()
    }

    pub fn set_step_status(&mut self, step_id: &str, status: StepStatus) {
        self.step_statuses.insert(step_id.to_string(), status);
    }

    /// Result of the most recently completed step that produced one.
    pub fn previous_step_result(&self) -> Option<&Value> {
        self.completed_steps
            .iter()
            .rev()
            .find_map(|id| self.step_results.get(id))
    }
}

// ---------------------------------------------------------------------------
// Step outcomes
// ---------------------------------------------------------------------------

/// Outcome of running one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecutionResult {
    pub step_id: String,
    pub success: bool,
    /// Tool result, or a marker object for skipped/review steps.
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Tool attempts made; zero when no tool was invoked.
    pub attempts: u32,
}

/// Append-only journal entry for a step state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTransition {
    pub execution_id: Uuid,
    pub step_id: String,
    pub status: StepStatus,
    /// 1-based attempt number; zero for transitions outside the retry loop.
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}
