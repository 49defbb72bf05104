//! Executes a single step of a live execution.
//!
//! `StepRunner::execute_step` gates the step on its condition, pauses the run
//! for human review steps, and otherwise resolves the agent, builds the tool
//! input from the step's bindings and calls the tool under a timeout with
//! retries. Bookkeeping happens under the execution lock; the tool call does
//! not. Every state change is appended to the step journal and published on
//! the event bus.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};
use tokio::time::Instant;
use uuid::Uuid;
use weave_types::config::EngineConfig;
use weave_types::event::WorkflowEvent;
use weave_types::execution::{ExecutionStatus, StepExecutionResult, StepFailure, StepStatus};
use weave_types::workflow::FailurePolicy;

use crate::agent::executor::reported_error;
use crate::agent::registry::AgentResolver;
use crate::event::bus::EventBus;
use crate::repository::execution::ExecutionStore;

use super::checkpoint::CheckpointManager;
use super::condition::evaluate;
use super::dag::PlannedStep;
use super::handle::ExecutionHandle;
use super::reference::{EvalScope, resolve_inputs};
use super::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Why a step attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// The resolver has no agent under this id. Never retried.
    #[error("agent '{0}' not found")]
    AgentNotFound(String),

    #[error("step timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The executor returned an error or a result carrying `"error"`.
    #[error("{0}")]
    Tool(String),
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

/// What the lock-held gate decided for a step.
enum Dispatch {
    Skip,
    Review,
    /// The run could not pause (another review is pending, or it is no
    /// longer running); the step stays pending.
    Deferred(ExecutionStatus),
    Run(Value),
}

pub struct StepRunner<S: ExecutionStore> {
    resolver: Arc<dyn AgentResolver>,
    checkpoint: Arc<CheckpointManager<S>>,
    event_bus: EventBus,
    config: EngineConfig,
}

impl<S: ExecutionStore> StepRunner<S> {
    pub fn new(
        resolver: Arc<dyn AgentResolver>,
        checkpoint: Arc<CheckpointManager<S>>,
        event_bus: EventBus,
        config: EngineConfig,
    ) -> Self {
        Self {
            resolver,
            checkpoint,
            event_bus,
            config,
        }
    }

    pub async fn execute_step(&self, step_id: &str, handle: &ExecutionHandle) -> StepExecutionResult {
        let Some(planned) = handle.plan.step(step_id) else {
            return StepExecutionResult {
                step_id: step_id.to_string(),
                success: false,
                output: Value::Null,
                error: Some(format!("unknown step '{step_id}'")),
                attempts: 0,
            };
        };

        match self.gate(planned, handle).await {
            Dispatch::Skip => self.skipped(planned, handle).await,
            Dispatch::Review => self.review_requested(planned, handle).await,
            Dispatch::Deferred(status) => StepExecutionResult {
                step_id: step_id.to_string(),
                success: false,
                output: Value::Null,
                error: Some(format!("execution is {status}; step deferred")),
                attempts: 0,
            },
            Dispatch::Run(input) => self.run_tool(planned, handle, input).await,
        }
    }

    /// Evaluate the condition and claim the step, all under one lock.
    async fn gate(&self, planned: &PlannedStep, handle: &ExecutionHandle) -> Dispatch {
        let step_id = planned.step.id.as_str();
        let mut state = handle.state.lock().await;

        let condition_met = planned
            .condition
            .as_ref()
            .is_none_or(|condition| evaluate(condition, &EvalScope::from_execution(&state)));
        if !condition_met {
            state.set_step_status(step_id, StepStatus::Skipped);
            state.completed_steps.push(step_id.to_string());
            return Dispatch::Skip;
        }

        if planned.step.is_human_review() {
            if !state.transition(ExecutionStatus::Paused) {
                return Dispatch::Deferred(state.status);
            }
            state.pending_review = Some(step_id.to_string());
            state.set_step_status(step_id, StepStatus::AwaitingReview);
            return Dispatch::Review;
        }

        state.current_steps.push(step_id.to_string());
        state.set_step_status(step_id, StepStatus::Running);
        let input = resolve_inputs(&planned.inputs, &EvalScope::from_execution(&state));
        Dispatch::Run(Value::Object(input))
    }

    async fn skipped(&self, planned: &PlannedStep, handle: &ExecutionHandle) -> StepExecutionResult {
        let step_id = planned.step.id.as_str();
        self.journal(handle.id, step_id, StepStatus::Skipped, 0, None, None)
            .await;
        self.event_bus.publish(WorkflowEvent::StepSkipped {
            workflow_id: handle.workflow_id().to_string(),
            execution_id: handle.id,
            step_id: step_id.to_string(),
        });
        tracing::debug!(execution_id = %handle.id, step_id, "condition not met, step skipped");

        StepExecutionResult {
            step_id: step_id.to_string(),
            success: true,
            output: json!({"skipped": true, "reason": "Condition not met"}),
            error: None,
            attempts: 0,
        }
    }

    async fn review_requested(&self, planned: &PlannedStep, handle: &ExecutionHandle) -> StepExecutionResult {
        let step_id = planned.step.id.as_str();
        self.journal(handle.id, step_id, StepStatus::AwaitingReview, 0, None, None)
            .await;
        self.event_bus.publish(WorkflowEvent::HumanReviewRequired {
            workflow_id: handle.workflow_id().to_string(),
            execution_id: handle.id,
            step_id: step_id.to_string(),
            step_name: planned.step.name.clone(),
        });
        tracing::info!(execution_id = %handle.id, step_id, "execution paused for human review");

        StepExecutionResult {
            step_id: step_id.to_string(),
            success: true,
            output: json!({"awaiting_review": true}),
            error: None,
            attempts: 0,
        }
    }

    async fn run_tool(&self, planned: &PlannedStep, handle: &ExecutionHandle, input: Value) -> StepExecutionResult {
        let step = &planned.step;

        let Some(executor) = self.resolver.resolve(&step.agent) else {
            let err = StepError::AgentNotFound(step.agent.clone());
            return self.finalize_failure(planned, handle, err, 0).await;
        };

        let policy = RetryPolicy::for_step(step, &self.config);
        let timeout = Duration::from_secs(
            step.timeout_seconds
                .unwrap_or(self.config.default_step_timeout_secs),
        );
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.event_bus.publish(WorkflowEvent::StepStarted {
                workflow_id: handle.workflow_id().to_string(),
                execution_id: handle.id,
                step_id: step.id.clone(),
                attempt,
            });
            self.journal(handle.id, &step.id, StepStatus::Running, attempt, None, None)
                .await;

            let outcome = match tokio::time::timeout(timeout, executor.execute_tool(&step.tool, input.clone())).await {
                Err(_elapsed) => Err(StepError::Timeout {
                    seconds: timeout.as_secs(),
                }),
                Ok(Err(e)) => Err(StepError::Tool(e.to_string())),
                Ok(Ok(result)) => match reported_error(&result) {
                    Some(message) => Err(StepError::Tool(message)),
                    None => Ok(result),
                },
            };

            match outcome {
                Ok(result) => {
                    let elapsed = started.elapsed();
                    return self
                        .finalize_success(planned, handle, result, attempt, elapsed)
                        .await;
                }
                Err(err) if policy.should_retry(attempt) => {
                    let delay = policy.delay_for(attempt - 1);
                    tracing::warn!(
                        execution_id = %handle.id,
                        step_id = step.id.as_str(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "step attempt failed, retrying"
                    );
                    self.event_bus.publish(WorkflowEvent::StepFailed {
                        workflow_id: handle.workflow_id().to_string(),
                        execution_id: handle.id,
                        step_id: step.id.clone(),
                        error: err.to_string(),
                        will_retry: true,
                    });
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return self.finalize_failure(planned, handle, err, attempt).await,
            }
        }
    }

    async fn finalize_success(
        &self,
        planned: &PlannedStep,
        handle: &ExecutionHandle,
        result: Value,
        attempts: u32,
        elapsed: Duration,
    ) -> StepExecutionResult {
        let step = &planned.step;
        {
            let mut state = handle.state.lock().await;
            state.step_results.insert(step.id.clone(), result.clone());
            state.context.insert(step.output_key(), result.clone());
            state.completed_steps.push(step.id.clone());
            state.current_steps.retain(|s| s != &step.id);
            state.set_step_status(&step.id, StepStatus::Completed);
        }

        self.journal(handle.id, &step.id, StepStatus::Completed, attempts, Some(&result), None)
            .await;
        self.event_bus.publish(WorkflowEvent::StepCompleted {
            workflow_id: handle.workflow_id().to_string(),
            execution_id: handle.id,
            step_id: step.id.clone(),
            duration_ms: elapsed.as_millis() as u64,
        });
        tracing::debug!(
            execution_id = %handle.id,
            step_id = step.id.as_str(),
            attempts,
            "step completed"
        );

        StepExecutionResult {
            step_id: step.id.clone(),
            success: true,
            output: result,
            error: None,
            attempts,
        }
    }

    async fn finalize_failure(
        &self,
        planned: &PlannedStep,
        handle: &ExecutionHandle,
        err: StepError,
        attempts: u32,
    ) -> StepExecutionResult {
        let step = &planned.step;
        let message = err.to_string();
        {
            let mut state = handle.state.lock().await;
            state.failed_steps.insert(
                step.id.clone(),
                StepFailure {
                    error: message.clone(),
                    failed_at: Utc::now(),
                },
            );
            state.current_steps.retain(|s| s != &step.id);
            state.set_step_status(&step.id, StepStatus::Failed);
            if step.on_failure == FailurePolicy::Stop && state.transition(ExecutionStatus::Failed) {
                state.error = Some(format!("step '{}' failed: {message}", step.id));
            }
        }

        self.journal(handle.id, &step.id, StepStatus::Failed, attempts, None, Some(&message))
            .await;
        self.event_bus.publish(WorkflowEvent::StepFailed {
            workflow_id: handle.workflow_id().to_string(),
            execution_id: handle.id,
            step_id: step.id.clone(),
            error: message.clone(),
            will_retry: false,
        });
        tracing::warn!(
            execution_id = %handle.id,
            step_id = step.id.as_str(),
            attempts,
            on_failure = ?step.on_failure,
            error = %message,
            "step failed"
        );

        StepExecutionResult {
            step_id: step.id.clone(),
            success: false,
            output: Value::Null,
            error: Some(message),
            attempts,
        }
    }

    /// Journal failures are logged; they never fail the step.
    async fn journal(
        &self,
        execution_id: Uuid,
        step_id: &str,
        status: StepStatus,
        attempt: u32,
        output: Option<&Value>,
        error: Option<&str>,
    ) {
        if let Err(e) = self
            .checkpoint
            .record(execution_id, step_id, status, attempt, output, error)
            .await
        {
            tracing::warn!(execution_id = %execution_id, step_id, error = %e, "failed to journal step transition");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
