//! Fluent authoring API for workflows.
//!
//! ```ignore
//! let workflow = WorkflowBuilder::new("triage", "Ticket triage")
//!     .required_input("ticket")
//!     .add_step(StepBuilder::new("classify", "nlp", "classify").input("text", "$context.ticket.body"))
//!     .add_human_review("approve", "Approve routing")
//!     .add_step(StepBuilder::new("route", "router", "assign").on_failure(FailurePolicy::Continue))
//!     .connect("classify", "approve")
//!     .connect("approve", "route")
//!     .build()?;
//! ```

use std::collections::HashMap;

use serde_json::{Map, Value};
use weave_types::condition::StepCondition;
use weave_types::workflow::{FailurePolicy, Step, StepType, Trigger, Workflow};

use super::definition::{WorkflowError, validate};

// ---------------------------------------------------------------------------
// StepBuilder
// ---------------------------------------------------------------------------

pub struct StepBuilder {
    step: Step,
}

impl StepBuilder {
    pub fn new(id: impl Into<String>, agent: impl Into<String>, tool: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            step: Step {
                name: id.clone(),
                id,
                agent: agent.into(),
                tool: tool.into(),
                input_mapping: HashMap::new(),
                output_key: None,
                step_type: StepType::Sequential,
                condition: None,
                timeout_seconds: None,
                retry_count: None,
                on_failure: FailurePolicy::Stop,
                skip_to_step: None,
                next_steps: Vec::new(),
                description: None,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.step.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.step.description = Some(description.into());
        self
    }

    /// Map an input key to a literal or a `$`-reference string.
    pub fn input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.step.input_mapping.insert(key.into(), value.into());
        self
    }

    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        self.step.output_key = Some(key.into());
        self
    }

    pub fn step_type(mut self, step_type: StepType) -> Self {
        self.step.step_type = step_type;
        self
    }

    pub fn parallel(self) -> Self {
        self.step_type(StepType::Parallel)
    }

    pub fn condition(mut self, condition: impl Into<StepCondition>) -> Self {
        self.step.condition = Some(condition.into());
        self
    }

    pub fn retry_count(mut self, attempts: u32) -> Self {
        self.step.retry_count = Some(attempts);
        self
    }

    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.step.timeout_seconds = Some(seconds);
        self
    }

    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.step.on_failure = policy;
        self
    }

    /// Shorthand for `on_failure(SkipTo)` with a target.
    pub fn skip_to(mut self, step_id: impl Into<String>) -> Self {
        self.step.on_failure = FailurePolicy::SkipTo;
        self.step.skip_to_step = Some(step_id.into());
        self
    }

    pub fn next(mut self, step_id: impl Into<String>) -> Self {
        self.step.next_steps.push(step_id.into());
        self
    }

    pub fn build(self) -> Step {
        self.step
    }
}

// ---------------------------------------------------------------------------
// WorkflowBuilder
// ---------------------------------------------------------------------------

pub struct WorkflowBuilder {
    workflow: Workflow,
    /// Problems found while connecting, reported by `build`.
    dangling: Vec<String>,
}

impl WorkflowBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            workflow: Workflow {
                id: id.into(),
                name: name.into(),
                description: None,
                steps: Vec::new(),
                trigger: Trigger::Manual,
                version: "1.0.0".to_string(),
                category: None,
                tags: Vec::new(),
                timeout_seconds: None,
                max_parallel_steps: None,
                default_context: Map::new(),
                required_inputs: Vec::new(),
                allowed_roles: Vec::new(),
                notify_on_complete: true,
                notify_on_failure: true,
                notification_channels: Vec::new(),
            },
            dangling: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.workflow.description = Some(description.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.workflow.version = version.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.workflow.category = Some(category.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.workflow.tags.push(tag.into());
        self
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.workflow.trigger = trigger;
        self
    }

    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.workflow.timeout_seconds = Some(seconds);
        self
    }

    pub fn max_parallel_steps(mut self, max: usize) -> Self {
        self.workflow.max_parallel_steps = Some(max);
        self
    }

    pub fn default_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.workflow
            .default_context
            .insert(key.into(), value.into());
        self
    }

    pub fn required_input(mut self, key: impl Into<String>) -> Self {
        self.workflow.required_inputs.push(key.into());
        self
    }

    pub fn allowed_role(mut self, role: impl Into<String>) -> Self {
        self.workflow.allowed_roles.push(role.into());
        self
    }

    pub fn notify_on_complete(mut self, enabled: bool) -> Self {
        self.workflow.notify_on_complete = enabled;
        self
    }

    pub fn notify_on_failure(mut self, enabled: bool) -> Self {
        self.workflow.notify_on_failure = enabled;
        self
    }

    pub fn notification_channel(mut self, channel: impl Into<String>) -> Self {
        self.workflow
            .notification_channels
            .push(channel.into());
        self
    }

    pub fn add_step(mut self, step: StepBuilder) -> Self {
        self.workflow.steps.push(step.build());
        self
    }

    /// Add a human review step. It calls no tool; approval records
    /// `{approved, notes}` under `review_{id}`.
    pub fn add_human_review(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let step = StepBuilder::new(id.clone(), "human", "review")
            .name(name)
            .step_type(StepType::HumanReview)
            .output_key(format!("review_{id}"));
        self.workflow.steps.push(step.build());
        self
    }

    /// Add an edge. Unknown `from` ids are reported by `build`.
    pub fn connect(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        match self.workflow.steps.iter_mut().find(|s| s.id == from) {
            Some(step) => {
                if !step.next_steps.contains(&to) {
                    step.next_steps.push(to);
                }
            }
            None => self.dangling.push(format!("connect: unknown step '{from}'")),
        }
        self
    }

    /// Validate and return the workflow. All problems are reported together.
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        let mut errors = self.dangling;
        errors.extend(validate(&self.workflow).errors);
        if errors.is_empty() {
            Ok(self.workflow)
        } else {
            Err(WorkflowError::Validation(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::dag::execution_levels;
    use serde_json::json;

    fn pipeline() -> WorkflowBuilder {
        WorkflowBuilder::new("triage", "Ticket triage")
            .required_input("ticket")
            .notification_channel("ops")
            .add_step(StepBuilder::new("classify", "nlp", "classify").input("text", "$context.ticket.body"))
            .add_human_review("approve", "Approve routing")
            .add_step(
                StepBuilder::new("route", "router", "assign")
                    .condition("results.classify.label != 'spam'")
                    .on_failure(FailurePolicy::Continue),
            )
            .connect("classify", "approve")
            .connect("approve", "route")
    }

    #[test]
    fn builds_valid_workflow() {
        let workflow = pipeline().build().unwrap();
        assert_eq!(workflow.steps.len(), 3);
        assert_eq!(workflow.required_inputs, vec!["ticket"]);
        assert_eq!(workflow.steps[0].next_steps, vec!["approve"]);
        assert_eq!(workflow.steps[0].input_mapping["text"], json!("$context.ticket.body"));

        let review = workflow.step("approve").unwrap();
        assert!(review.is_human_review());
        assert_eq!(review.output_key(), "review_approve");

        let levels = execution_levels(&workflow).unwrap();
        assert_eq!(levels.len(), 3);
    }

    #[test]
    fn connect_is_idempotent() {
        let workflow = pipeline().connect("classify", "approve").build().unwrap();
        assert_eq!(workflow.steps[0].next_steps, vec!["approve"]);
    }

    #[test]
    fn build_reports_all_problems() {
        let err = WorkflowBuilder::new("bad", "Bad")
            .add_step(StepBuilder::new("a", "x", "y").skip_to("nowhere"))
            .add_step(StepBuilder::new("a", "x", "y"))
            .connect("ghost", "a")
            .build()
            .unwrap_err();

        let WorkflowError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.iter().any(|e| e.contains("ghost")));
        assert!(errors.iter().any(|e| e.contains("duplicate step id")));
        assert!(errors.iter().any(|e| e.contains("nowhere")));
    }

    #[test]
    fn empty_workflow_is_rejected() {
        assert!(WorkflowBuilder::new("empty", "Empty").build().is_err());
    }

    #[test]
    fn cycle_is_rejected() {
        let err = WorkflowBuilder::new("loop", "Loop")
            .add_step(StepBuilder::new("a", "x", "y"))
            .add_step(StepBuilder::new("b", "x", "y"))
            .connect("a", "b")
            .connect("b", "a")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn step_builder_setters() {
        let step = StepBuilder::new("s", "agent", "tool")
            .name("Step")
            .parallel()
            .retry_count(5)
            .timeout_seconds(9)
            .output_key("out")
            .next("t")
            .build();
        assert!(step.is_parallel());
        assert_eq!(step.retry_count, Some(5));
        assert_eq!(step.timeout_seconds, Some(9));
        assert_eq!(step.output_key(), "out");
        assert_eq!(step.next_steps, vec!["t"]);
        assert_eq!(step.name, "Step");
    }
}
