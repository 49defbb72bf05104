//! Workflow definition types.
//!
//! A [`Workflow`] is an immutable, declarative graph of [`Step`]s. Edges are
//! expressed by each step's `next_steps`. YAML files, the builder API and JSON
//! payloads all convert to and from these structs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::condition::StepCondition;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// The canonical workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Stable identifier, used to look the definition up on resume.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Steps in declared order. Declared order drives sequential dispatch.
    pub steps: Vec<Step>,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Overall run timeout. Falls back to the engine default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Parallel steps launched per scheduling round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel_steps: Option<usize>,
    /// Seed values merged beneath the caller's input context.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub default_context: serde_json::Map<String, serde_json::Value>,
    /// Keys that must be present in the caller-supplied context.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_inputs: Vec<String>,
    /// Roles permitted to run the workflow. Empty means anyone.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_roles: Vec<String>,
    #[serde(default = "default_true")]
    pub notify_on_complete: bool,
    #[serde(default = "default_true")]
    pub notify_on_failure: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notification_channels: Vec<String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_true() -> bool {
    true
}

impl Workflow {
    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// What starts a workflow. Descriptive only; the engine never fires triggers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    #[default]
    Manual,
    Schedule {
        cron: String,
    },
    Event {
        name: String,
    },
    Webhook {
        path: String,
    },
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One unit of work: a tool invocation on an agent plus routing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    /// Opaque agent id resolved by the agent resolver.
    #[serde(default)]
    pub agent: String,
    /// Tool (operation) name on the agent.
    #[serde(default)]
    pub tool: String,
    /// Target key -> literal value or `$`-reference string.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub input_mapping: HashMap<String, serde_json::Value>,
    /// Context key the result is stored under. See [`Step::output_key`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    #[serde(default)]
    pub step_type: StepType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<StepCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Total attempts. Falls back to the engine default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_to_step: Option<String>,
    /// Successor step ids; the graph's edges.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Step {
    /// The context key this step writes to: explicit `output_key`, or
    /// `"{agent}_{tool}_result"`.
    pub fn output_key(&self) -> String {
        self.output_key
            .clone()
            .unwrap_or_else(|| format!("{}_{}_result", self.agent, self.tool))
    }

    pub fn is_parallel(&self) -> bool {
        self.step_type == StepType::Parallel
    }

    pub fn is_human_review(&self) -> bool {
        self.step_type == StepType::HumanReview
    }
}

/// How a step is dispatched.
///
/// `Conditional` and `Loop` are dispatched like `Sequential`; their gating
/// is expressed through the step's condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    #[default]
    Sequential,
    Parallel,
    Conditional,
    Loop,
    HumanReview,
}

/// What happens after a step exhausts its attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and keep going.
    Continue,
    /// Fail the whole execution.
    #[default]
    Stop,
    /// Run `skip_to_step` next.
    SkipTo,
}
