//! Workflow orchestrator: runs executions over the step graph.
//!
//! # Execution flow
//!
//! 1. Compile the workflow into an [`ExecutionPlan`], check required inputs
//!    and roles, and register a running [`ExecutionHandle`].
//! 2. Repeatedly compute the ready set (see [`compute_ready`]) and run one
//!    round: parallel steps together on a `JoinSet`, capped per round, then
//!    the remaining steps one at a time in declared order.
//! 3. A failed step whose policy is `skip_to` has its target dispatched
//!    immediately, ahead of the rest of the round.
//! 4. When nothing is ready, or the run leaves `running`, finish: settle the
//!    final status, notify, and persist the snapshot.
//!
//! Human review steps pause the run. `resume_workflow` either cancels it or
//! records the approval and continues scheduling from where it stopped.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use uuid::Uuid;
use weave_types::config::{EngineConfig, ParallelOverflow};
use weave_types::event::WorkflowEvent;
use weave_types::execution::{
    ExecutionStatus, StepExecutionResult, StepFailure, StepStatus, StepTransition, WorkflowExecution,
};
use weave_types::workflow::{FailurePolicy, Workflow};

use crate::agent::registry::AgentResolver;
use crate::event::bus::EventBus;
use crate::repository::execution::ExecutionStore;

use super::checkpoint::{CheckpointError, CheckpointManager};
use super::dag::ExecutionPlan;
use super::definition::WorkflowError;
use super::handle::ExecutionHandle;
use super::scheduler::compute_ready;
use super::step_runner::StepRunner;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Caller-supplied parameters for a new run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Input context, merged over the workflow's `default_context`.
    pub context: Map<String, Value>,
    pub initiated_by: Option<String>,
    pub organization_id: Option<String>,
    /// Roles held by the caller, checked against `allowed_roles`.
    pub roles: Vec<String>,
}

impl RunRequest {
    pub fn with_context(context: Map<String, Value>) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<S: ExecutionStore + 'static> {
    config: EngineConfig,
    runner: Arc<StepRunner<S>>,
    checkpoint: Arc<CheckpointManager<S>>,
    event_bus: EventBus,
    /// Live and recently finished executions.
    executions: DashMap<Uuid, Arc<ExecutionHandle>>,
    /// Compiled plans by workflow id, for resuming restored executions.
    workflows: DashMap<String, Arc<ExecutionPlan>>,
}

impl<S: ExecutionStore + 'static> Orchestrator<S> {
    pub fn new(store: S, resolver: Arc<dyn AgentResolver>, config: EngineConfig) -> Self {
        let event_bus = EventBus::new(config.event_bus_capacity);
        let checkpoint = Arc::new(CheckpointManager::new(store));
        let runner = Arc::new(StepRunner::new(
            resolver,
            Arc::clone(&checkpoint),
            event_bus.clone(),
            config.clone(),
        ));

        Self {
            config,
            runner,
            checkpoint,
            event_bus,
            executions: DashMap::new(),
            workflows: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.event_bus.subscribe()
    }

    /// Compile and remember a workflow so executions of it can be resumed
    /// after they were restored from the store.
    pub fn register_workflow(&self, workflow: Workflow) -> Result<(), OrchestratorError> {
        let plan = ExecutionPlan::compile(workflow)?;
        self.workflows
            .insert(plan.workflow().id.clone(), Arc::new(plan));
        Ok(())
    }

    /// Ids of registered workflows, sorted.
    pub fn workflow_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workflows.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    // -----------------------------------------------------------------------
    // Running
    // -----------------------------------------------------------------------

    /// Start and drive a run to completion, failure or a review pause.
    ///
    /// Returns the final snapshot. A step failure under `stop` is reported
    /// through the snapshot's status; only validation problems and
    /// unexpected errors (workflow timeout, a panicked step) are `Err`.
    pub async fn run_workflow(
        &self,
        workflow: Workflow,
        request: RunRequest,
    ) -> Result<WorkflowExecution, OrchestratorError> {
        let plan = Arc::new(ExecutionPlan::compile(workflow)?);
        let definition = plan.workflow();

        let missing: Vec<String> = definition
            .required_inputs
            .iter()
            .filter(|key| !request.context.contains_key(key.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(OrchestratorError::MissingInputs(missing));
        }

        if !definition.allowed_roles.is_empty()
            && !request
                .roles
                .iter()
                .any(|role| definition.allowed_roles.contains(role))
        {
            return Err(OrchestratorError::Unauthorized {
                workflow_id: definition.id.clone(),
            });
        }

        let mut context = definition.default_context.clone();
        context.extend(request.context);

        let mut execution = WorkflowExecution::new(definition.id.clone(), context);
        execution.initiated_by = request.initiated_by;
        execution.organization_id = request.organization_id;
        execution.transition(ExecutionStatus::Running);

        self.workflows
            .insert(definition.id.clone(), Arc::clone(&plan));
        let handle = Arc::new(ExecutionHandle::new(plan, execution));
        self.executions.insert(handle.id, Arc::clone(&handle));

        self.event_bus.publish(WorkflowEvent::WorkflowStarted {
            workflow_id: handle.workflow_id().to_string(),
            execution_id: handle.id,
        });
        tracing::info!(
            execution_id = %handle.id,
            workflow = handle.workflow_id(),
            "starting workflow execution"
        );

        self.drive(&handle).await
    }

    /// Continue a paused execution with a reviewer's decision.
    pub async fn resume_workflow(
        &self,
        execution_id: Uuid,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<WorkflowExecution, OrchestratorError> {
        let handle = self.handle_for_resume(execution_id).await?;

        let review_step = {
            let mut state = handle.state.lock().await;
            if state.status != ExecutionStatus::Paused {
                return Err(OrchestratorError::InvalidResumeState {
                    execution_id,
                    status: state.status,
                });
            }

            let step_id = state.pending_review.take();
            state.review_notes = notes.clone();

            match decision {
                ReviewDecision::Reject => {
                    if let Some(id) = &step_id {
                        state.set_step_status(id, StepStatus::Rejected);
                    }
                    state.transition(ExecutionStatus::Cancelled);
                }
                ReviewDecision::Approve => {
                    if let Some(id) = &step_id {
                        let result = json!({"approved": true, "notes": notes});
                        let output_key = handle
                            .plan
                            .step(id)
                            .map(|p| p.step.output_key())
                            .unwrap_or_else(|| format!("{id}_result"));
                        state.step_results.insert(id.clone(), result.clone());
                        state.context.insert(output_key, result);
                        state.completed_steps.push(id.clone());
                        state.set_step_status(id, StepStatus::Completed);
                    }
                    state.transition(ExecutionStatus::Running);
                }
            }
            step_id
        };

        match decision {
            ReviewDecision::Reject => {
                if let Some(id) = &review_step {
                    self.journal(handle.id, id, StepStatus::Rejected, None, notes.as_deref())
                        .await;
                }
                self.event_bus.publish(WorkflowEvent::WorkflowCancelled {
                    workflow_id: handle.workflow_id().to_string(),
                    execution_id,
                });
                tracing::info!(execution_id = %execution_id, "review rejected, execution cancelled");

                let snapshot = handle.snapshot().await;
                self.checkpoint.save_snapshot(&snapshot).await?;
                Ok(snapshot)
            }
            ReviewDecision::Approve => {
                if let Some(id) = &review_step {
                    let output = json!({"approved": true, "notes": notes});
                    self.journal(handle.id, id, StepStatus::Completed, Some(&output), None)
                        .await;
                }
                tracing::info!(execution_id = %execution_id, "review approved, resuming execution");
                self.drive(&handle).await
            }
        }
    }

    async fn handle_for_resume(&self, execution_id: Uuid) -> Result<Arc<ExecutionHandle>, OrchestratorError> {
        if let Some(handle) = self.executions.get(&execution_id) {
            return Ok(Arc::clone(handle.value()));
        }

        let execution = self.restore(execution_id).await?;
        let plan = self
            .workflows
            .get(&execution.workflow_id)
            .map(|p| Arc::clone(p.value()))
            .ok_or_else(|| OrchestratorError::WorkflowNotRegistered(execution.workflow_id.clone()))?;

        // A concurrent resume may have restored the same execution while we
        // awaited the store; every caller must share one handle and its lock.
        let handle = self
            .executions
            .entry(execution_id)
            .or_insert_with(|| Arc::new(ExecutionHandle::new(plan, execution)));
        Ok(Arc::clone(handle.value()))
    }

    /// Schedule under the workflow timeout, then settle the outcome.
    async fn drive(&self, handle: &Arc<ExecutionHandle>) -> Result<WorkflowExecution, OrchestratorError> {
        let seconds = handle
            .plan
            .workflow()
            .timeout_seconds
            .unwrap_or(self.config.default_workflow_timeout_secs);

        let outcome = match tokio::time::timeout(Duration::from_secs(seconds), self.schedule(handle)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(OrchestratorError::WorkflowTimeout { seconds }),
        };

        self.finish(handle, outcome).await
    }

    async fn schedule(&self, handle: &Arc<ExecutionHandle>) -> Result<(), OrchestratorError> {
        loop {
            let readiness = {
                let mut state = handle.state.lock().await;
                if state.status != ExecutionStatus::Running {
                    return Ok(());
                }
                let readiness = compute_ready(&handle.plan, &state);
                for id in &readiness.pruned {
                    state.set_step_status(id, StepStatus::Pruned);
                }
                readiness
            };

            for id in &readiness.pruned {
                tracing::debug!(execution_id = %handle.id, step_id = id.as_str(), "step pruned");
                self.journal(handle.id, id, StepStatus::Pruned, None, None)
                    .await;
            }

            if readiness.is_idle() {
                return Ok(());
            }
            self.run_round(handle, readiness.ready).await?;
        }
    }

    /// Run one ready set: parallel members together, then the rest in order.
    async fn run_round(&self, handle: &Arc<ExecutionHandle>, ready: Vec<String>) -> Result<(), OrchestratorError> {
        let (mut launched, sequential): (Vec<String>, Vec<String>) = ready
            .into_iter()
            .partition(|id| handle.plan.step(id).is_some_and(|p| p.step.is_parallel()));

        let cap = handle.plan.max_parallel(&self.config);
        let overflow = if launched.len() > cap {
            launched.split_off(cap)
        } else {
            Vec::new()
        };
        if !overflow.is_empty() {
            self.handle_overflow(handle, &overflow).await;
        }

        let mut queue: VecDeque<String> = VecDeque::new();

        if !launched.is_empty() {
            tracing::debug!(
                execution_id = %handle.id,
                steps = launched.len(),
                "launching parallel group"
            );

            let mut join_set = JoinSet::new();
            for step_id in launched {
                let runner = Arc::clone(&self.runner);
                let handle = Arc::clone(handle);
                join_set.spawn(async move { runner.execute_step(&step_id, &handle).await });
            }

            // Every member settles before the round moves on, even when a
            // sibling panicked.
            let mut results = Vec::new();
            let mut panicked = None;
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(result) => results.push(result),
                    Err(e) => {
                        tracing::error!(execution_id = %handle.id, error = %e, "parallel step task panicked");
                        panicked.get_or_insert_with(|| e.to_string());
                    }
                }
            }
            if let Some(message) = panicked {
                return Err(OrchestratorError::StepPanicked(message));
            }
            for result in &results {
                if let Some(target) = self.skip_target(handle, result).await {
                    queue.push_back(target);
                }
            }
        }

        queue.extend(sequential);

        while let Some(step_id) = queue.pop_front() {
            {
                let state = handle.state.lock().await;
                if state.status != ExecutionStatus::Running {
                    break;
                }
                if state.step_status(&step_id) != StepStatus::Pending {
                    continue;
                }
            }

            let result = self.runner.execute_step(&step_id, handle).await;
            if let Some(target) = self.skip_target(handle, &result).await {
                queue.push_front(target);
            }
        }

        Ok(())
    }

    async fn handle_overflow(&self, handle: &ExecutionHandle, overflow: &[String]) {
        match self.config.parallel_overflow {
            ParallelOverflow::Queue => {
                tracing::debug!(
                    execution_id = %handle.id,
                    deferred = overflow.len(),
                    "parallel limit reached, deferring steps to next round"
                );
            }
            ParallelOverflow::Drop => {
                {
                    let mut state = handle.state.lock().await;
                    for id in overflow {
                        state.set_step_status(id, StepStatus::Dropped);
                    }
                }
                for id in overflow {
                    self.journal(handle.id, id, StepStatus::Dropped, None, None)
                        .await;
                }
                tracing::warn!(
                    execution_id = %handle.id,
                    dropped = ?overflow,
                    "parallel limit reached, dropping steps"
                );
            }
        }
    }

    /// The `skip_to_step` of a step that just failed under `skip_to`.
    async fn skip_target(&self, handle: &ExecutionHandle, result: &StepExecutionResult) -> Option<String> {
        if result.success {
            return None;
        }
        let planned = handle.plan.step(&result.step_id)?;
        if planned.step.on_failure != FailurePolicy::SkipTo {
            return None;
        }
        let state = handle.state.lock().await;
        if state.step_status(&result.step_id) != StepStatus::Failed {
            return None;
        }
        planned.step.skip_to_step.clone()
    }

    /// Settle the final status, notify and persist.
    async fn finish(
        &self,
        handle: &ExecutionHandle,
        outcome: Result<(), OrchestratorError>,
    ) -> Result<WorkflowExecution, OrchestratorError> {
        let snapshot = {
            let mut state = handle.state.lock().await;
            match &outcome {
                Ok(()) => {
                    if state.status == ExecutionStatus::Running {
                        state.transition(ExecutionStatus::Completed);
                    }
                }
                Err(err) => {
                    let message = err.to_string();
                    for id in std::mem::take(&mut state.current_steps) {
                        state.set_step_status(&id, StepStatus::Failed);
                        state.failed_steps.insert(
                            id,
                            StepFailure {
                                error: message.clone(),
                                failed_at: Utc::now(),
                            },
                        );
                    }
                    state.error = Some(message);
                    state.transition(ExecutionStatus::Failed);
                }
            }
            state.clone()
        };

        let workflow = handle.plan.workflow();
        match snapshot.status {
            ExecutionStatus::Completed => {
                tracing::info!(
                    execution_id = %snapshot.id,
                    completed = snapshot.completed_steps.len(),
                    failed = snapshot.failed_steps.len(),
                    "workflow execution completed"
                );
                if workflow.notify_on_complete {
                    self.event_bus.publish(WorkflowEvent::WorkflowComplete {
                        workflow_id: workflow.id.clone(),
                        execution_id: snapshot.id,
                        channels: workflow.notification_channels.clone(),
                    });
                }
            }
            ExecutionStatus::Failed => {
                let error = snapshot.error.clone().unwrap_or_default();
                tracing::warn!(execution_id = %snapshot.id, error = error.as_str(), "workflow execution failed");
                if workflow.notify_on_failure {
                    self.event_bus.publish(WorkflowEvent::WorkflowFailed {
                        workflow_id: workflow.id.clone(),
                        execution_id: snapshot.id,
                        error,
                        channels: workflow.notification_channels.clone(),
                    });
                }
            }
            ExecutionStatus::Paused => {
                tracing::info!(
                    execution_id = %snapshot.id,
                    step_id = snapshot.pending_review.as_deref().unwrap_or_default(),
                    "workflow execution paused"
                );
            }
            _ => {}
        }

        if let Err(e) = self.checkpoint.save_snapshot(&snapshot).await {
            if outcome.is_ok() {
                return Err(e.into());
            }
            tracing::warn!(execution_id = %snapshot.id, error = %e, "failed to persist execution snapshot");
        }

        outcome.map(|()| snapshot)
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// Current state of an execution, from memory or the store.
    pub async fn get_execution(&self, execution_id: Uuid) -> Result<WorkflowExecution, OrchestratorError> {
        let live = self
            .executions
            .get(&execution_id)
            .map(|h| Arc::clone(h.value()));
        match live {
            Some(handle) => Ok(handle.snapshot().await),
            None => self.restore(execution_id).await,
        }
    }

    /// Executions newest first, optionally scoped to one organization.
    pub async fn list_executions(
        &self,
        organization_id: Option<&str>,
    ) -> Result<Vec<WorkflowExecution>, OrchestratorError> {
        let mut found = self.checkpoint.list(organization_id).await?;

        let live: Vec<Arc<ExecutionHandle>> = self
            .executions
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        for handle in live {
            let snapshot = handle.snapshot().await;
            if organization_id.is_some() && snapshot.organization_id.as_deref() != organization_id {
                continue;
            }
            match found.iter_mut().find(|e| e.id == snapshot.id) {
                Some(existing) => *existing = snapshot,
                None => found.push(snapshot),
            }
        }

        found.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    /// The step journal for an execution, oldest first.
    pub async fn step_log(&self, execution_id: Uuid) -> Result<Vec<StepTransition>, OrchestratorError> {
        Ok(self.checkpoint.transitions(execution_id).await?)
    }

    async fn restore(&self, execution_id: Uuid) -> Result<WorkflowExecution, OrchestratorError> {
        self.checkpoint
            .restore(execution_id)
            .await
            .map_err(|e| match e {
                CheckpointError::ExecutionNotFound(id) => OrchestratorError::ExecutionNotFound(id),
                other => OrchestratorError::Checkpoint(other),
            })
    }

    async fn journal(
        &self,
        execution_id: Uuid,
        step_id: &str,
        status: StepStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) {
        if let Err(e) = self
            .checkpoint
            .record(execution_id, step_id, status, 0, output, error)
            .await
        {
            tracing::warn!(execution_id = %execution_id, step_id, error = %e, "failed to journal step transition");
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("workflow validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("missing required inputs: {}", .0.join(", "))]
    MissingInputs(Vec<String>),

    #[error("caller is not allowed to run workflow '{workflow_id}'")]
    Unauthorized { workflow_id: String },

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("execution {execution_id} cannot be resumed while {status}")]
    InvalidResumeState {
        execution_id: Uuid,
        status: ExecutionStatus,
    },

    #[error("workflow '{0}' is not registered")]
    WorkflowNotRegistered(String),

    #[error("workflow timed out after {seconds}s")]
    WorkflowTimeout { seconds: u64 },

    #[error("step task panicked: {0}")]
    StepPanicked(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

impl From<WorkflowError> for OrchestratorError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(errors) => OrchestratorError::Validation(errors),
            other => OrchestratorError::Validation(vec![other.to_string()]),
        }
    }
}
