//! Workflow definition parsing, validation, and filesystem operations.
//!
//! Converts between YAML files and the `Workflow` model, validates structural
//! constraints (unique ids, resolvable edges, well-formed references and
//! conditions, acyclicity), and discovers workflow files on disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use weave_types::workflow::{FailurePolicy, Workflow};

use super::condition::compile_condition;
use super::dag::find_cycle;
use super::reference::InputBinding;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or validating a workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// One or more structural problems. Every problem found is listed.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Outcome of [`validate`]: the full list of structural errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<(), WorkflowError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::Validation(self.errors))
        }
    }
}

/// Validate a workflow, collecting every error rather than stopping at the
/// first.
///
/// Checks:
/// - At least one step exists
/// - Step ids are non-empty and unique
/// - Every `next_steps` and `skip_to_step` entry names a declared step
/// - `on_failure: skip_to` comes with a `skip_to_step`
/// - Tool steps name an agent and a tool
/// - `$`-references in input mappings are well-formed
/// - Conditions parse
/// - Timeouts and the parallel limit are positive when set
/// - The `next_steps` graph has no cycle (only checked once edges resolve)
pub fn validate(workflow: &Workflow) -> ValidationReport {
    let mut errors = Vec::new();

    if workflow.steps.is_empty() {
        errors.push("workflow must have at least one step".to_string());
    }

    if workflow.max_parallel_steps == Some(0) {
        errors.push("max_parallel_steps must be >= 1".to_string());
    }
    if workflow.timeout_seconds == Some(0) {
        errors.push("workflow timeout must be > 0".to_string());
    }

    let mut ids = HashSet::new();
    for (position, step) in workflow.steps.iter().enumerate() {
        if step.id.is_empty() {
            errors.push(format!("step at position {position} has an empty id"));
        } else if !ids.insert(step.id.as_str()) {
            errors.push(format!("duplicate step id: '{}'", step.id));
        }
    }

    let mut edges_resolve = true;
    for step in &workflow.steps {
        for next in &step.next_steps {
            if !ids.contains(next.as_str()) {
                edges_resolve = false;
                errors.push(format!(
                    "step '{}' references unknown next step '{}'",
                    step.id, next
                ));
            }
        }

        match (&step.skip_to_step, step.on_failure) {
            (Some(target), _) if !ids.contains(target.as_str()) => {
                errors.push(format!(
                    "step '{}' skips to unknown step '{}'",
                    step.id, target
                ));
            }
            (None, FailurePolicy::SkipTo) => {
                errors.push(format!(
                    "step '{}' uses on_failure skip_to without a skip_to_step",
                    step.id
                ));
            }
            _ => {}
        }

        if !step.is_human_review() && (step.agent.is_empty() || step.tool.is_empty()) {
            errors.push(format!("step '{}' must name an agent and a tool", step.id));
        }

        if step.timeout_seconds == Some(0) {
            errors.push(format!("step '{}' timeout must be > 0", step.id));
        }

        let mut keys: Vec<&String> = step.input_mapping.keys().collect();
        keys.sort();
        for key in keys {
            if let Err(e) = InputBinding::parse(&step.input_mapping[key]) {
                errors.push(format!("step '{}' input '{}': {e}", step.id, key));
            }
        }

        if let Some(condition) = &step.condition {
            if let Err(e) = compile_condition(condition) {
                errors.push(format!("step '{}' condition: {e}", step.id));
            }
        }
    }

    if edges_resolve && ids.len() == workflow.steps.len() {
        if let Some(step_id) = find_cycle(workflow) {
            errors.push(format!("cycle detected involving step '{step_id}'"));
        }
    }

    ValidationReport { errors }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `Workflow`.
pub fn parse_workflow_yaml(yaml: &str) -> Result<Workflow, WorkflowError> {
    let workflow: Workflow =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::Parse(e.to_string()))?;
    validate(&workflow).into_result()?;
    Ok(workflow)
}

/// Serialize a `Workflow` to a YAML string.
pub fn serialize_workflow_yaml(workflow: &Workflow) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(workflow).map_err(|e| WorkflowError::Parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a workflow definition from a YAML file.
pub fn load_workflow_file(path: &Path) -> Result<Workflow, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow_yaml(&content)
}

/// Save a workflow definition to a YAML file, creating parent directories.
pub fn save_workflow_file(path: &Path, workflow: &Workflow) -> Result<(), WorkflowError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serialize_workflow_yaml(workflow)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Discover all workflow YAML files under `base_dir`, recursively.
///
/// Files that fail to parse or validate are skipped with a warning.
pub fn discover_workflows(base_dir: &Path) -> Result<Vec<(PathBuf, Workflow)>, WorkflowError> {
    let mut results = Vec::new();
    if !base_dir.exists() {
        return Ok(results);
    }
    discover_recursive(base_dir, &mut results)?;
    results.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(results)
}

fn discover_recursive(
    dir: &Path,
    results: &mut Vec<(PathBuf, Workflow)>,
) -> Result<(), WorkflowError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            discover_recursive(&path, results)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml")
        {
            match load_workflow_file(&path) {
                Ok(workflow) => results.push((path, workflow)),
                Err(e) => {
                    tracing::warn!(?path, error = %e, "skipping invalid workflow file");
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
