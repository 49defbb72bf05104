//! CLI workflow-file subcommands: validate, plan, run and resume.

use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use weave_core::workflow::dag::execution_levels;
use weave_core::workflow::definition::load_workflow_file;
use weave_core::workflow::{OrchestratorError, ReviewDecision, RunRequest, WorkflowError};
use weave_types::event::WorkflowEvent;
use weave_types::execution::{ExecutionStatus, WorkflowExecution};
use weave_types::workflow::{FailurePolicy, StepType, Workflow};

use super::execution::{parse_execution_id, print_execution};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

pub fn handle_validate(file: &Path, json: bool) -> Result<()> {
    match load_workflow_file(file) {
        Ok(workflow) => {
            if json {
                let out = serde_json::json!({
                    "valid": true,
                    "id": workflow.id,
                    "name": workflow.name,
                    "steps": workflow.steps.len(),
                    "errors": [],
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!();
                println!(
                    "  {} Workflow '{}' is valid",
                    style("✓").green().bold(),
                    style(&workflow.name).cyan()
                );
                println!("  ID: {}", workflow.id);
                println!("  Steps: {}", workflow.steps.len());
                println!();
            }
            Ok(())
        }
        Err(WorkflowError::Validation(errors)) => {
            if json {
                let out = serde_json::json!({ "valid": false, "errors": errors });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!();
                println!(
                    "  {} {} has {} problem(s):",
                    style("✗").red().bold(),
                    file.display(),
                    errors.len()
                );
                for error in &errors {
                    println!("    - {error}");
                }
                println!();
            }
            bail!("workflow validation failed")
        }
        Err(other) => {
            Err(other).with_context(|| format!("Failed to load workflow '{}'", file.display()))
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

pub fn handle_plan(file: &Path, json: bool) -> Result<()> {
    let workflow = load(file)?;
    let levels = execution_levels(&workflow)?;

    if json {
        let out: Vec<Vec<&str>> = levels
            .iter()
            .map(|level| level.iter().map(|s| s.id.as_str()).collect())
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "workflow_id": workflow.id,
                "levels": out,
            }))?
        );
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Level").fg(Color::Cyan),
            Cell::new("Step"),
            Cell::new("Type"),
            Cell::new("Agent / Tool"),
            Cell::new("On failure"),
            Cell::new("Next"),
        ]);

    for (depth, level) in levels.iter().enumerate() {
        for step in level {
            let target = if step.is_human_review() {
                "-".to_string()
            } else {
                format!("{}/{}", step.agent, step.tool)
            };
            let next = if step.next_steps.is_empty() {
                "-".to_string()
            } else {
                step.next_steps.join(", ")
            };
            table.add_row(vec![
                Cell::new(depth),
                Cell::new(&step.id),
                Cell::new(step_type_label(step.step_type)),
                Cell::new(target),
                Cell::new(failure_label(step.on_failure)),
                Cell::new(next),
            ]);
        }
    }

    println!();
    println!(
        "  Plan for workflow '{}' ({} levels)",
        style(&workflow.name).cyan(),
        levels.len()
    );
    println!();
    println!("{table}");
    println!();

    Ok(())
}

fn step_type_label(step_type: StepType) -> &'static str {
    match step_type {
        StepType::Sequential => "sequential",
        StepType::Parallel => "parallel",
        StepType::Conditional => "conditional",
        StepType::Loop => "loop",
        StepType::HumanReview => "human_review",
    }
}

fn failure_label(policy: FailurePolicy) -> &'static str {
    match policy {
        FailurePolicy::Continue => "continue",
        FailurePolicy::Stop => "stop",
        FailurePolicy::SkipTo => "skip_to",
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub struct RunArgs {
    pub context: Option<String>,
    pub org: Option<String>,
    pub user: Option<String>,
    pub roles: Vec<String>,
}

pub async fn handle_run(
    state: &AppState,
    file: &Path,
    args: RunArgs,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let workflow = load(file)?;
    let request = RunRequest {
        context: parse_context(args.context.as_deref())?,
        initiated_by: args.user,
        organization_id: args.org,
        roles: args.roles,
    };

    let events = state.orchestrator.subscribe();
    let run = state.orchestrator.run_workflow(workflow, request);
    let execution = with_progress(run, events, !json && !quiet).await?;

    report(&execution, file, json)
}

/// Parse `--context` into a JSON object. Absent means empty.
fn parse_context(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw).context("Invalid JSON in --context")? {
        Value::Object(map) => Ok(map),
        other => bail!("--context must be a JSON object, got {other}"),
    }
}

// ---------------------------------------------------------------------------
// Resume
// ---------------------------------------------------------------------------

pub async fn handle_resume(
    state: &AppState,
    file: &Path,
    execution_id: &str,
    decision: ReviewDecision,
    notes: Option<String>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let id = parse_execution_id(execution_id)?;
    let workflow = load(file)?;
    state.orchestrator.register_workflow(workflow)?;

    let events = state.orchestrator.subscribe();
    let resume = state.orchestrator.resume_workflow(id, decision, notes);
    let execution = match with_progress(resume, events, !json && !quiet).await {
        Ok(execution) => execution,
        Err(OrchestratorError::WorkflowNotRegistered(workflow_id)) => bail!(
            "Execution {id} belongs to workflow '{workflow_id}', not the one in {}",
            file.display()
        ),
        Err(e) => return Err(e.into()),
    };

    report(&execution, file, json)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load(file: &Path) -> Result<Workflow> {
    load_workflow_file(file).with_context(|| format!("Failed to load workflow '{}'", file.display()))
}

/// Print the final snapshot; a failed run exits non-zero.
fn report(execution: &WorkflowExecution, file: &Path, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(execution)?);
    } else {
        print_execution(execution, Some(&file.display().to_string()));
    }

    if execution.status == ExecutionStatus::Failed {
        bail!(
            "{}",
            execution
                .error
                .clone()
                .unwrap_or_else(|| "workflow failed".to_string())
        );
    }
    Ok(())
}

/// Drive `run` to completion while printing step events as they arrive.
async fn with_progress<F>(
    run: F,
    mut events: broadcast::Receiver<WorkflowEvent>,
    show: bool,
) -> Result<WorkflowExecution, OrchestratorError>
where
    F: Future<Output = Result<WorkflowExecution, OrchestratorError>>,
{
    tokio::pin!(run);
    loop {
        tokio::select! {
            result = &mut run => {
                // Flush whatever was published before the run returned.
                while let Ok(event) = events.try_recv() {
                    if show {
                        print_event(&event);
                    }
                }
                return result;
            }
            event = events.recv() => match event {
                Ok(event) if show => print_event(&event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "progress display lagged behind events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return run.await;
                }
            },
        }
    }
}

fn print_event(event: &WorkflowEvent) {
    match event {
        WorkflowEvent::StepStarted { step_id, attempt, .. } => {
            if *attempt > 1 {
                println!("  {} {step_id} (attempt {attempt})", style("→").blue());
            } else {
                println!("  {} {step_id}", style("→").blue());
            }
        }
        WorkflowEvent::StepCompleted {
            step_id,
            duration_ms,
            ..
        } => {
            println!(
                "  {} {step_id} {}",
                style("✓").green(),
                style(format!("{duration_ms}ms")).dim()
            );
        }
        WorkflowEvent::StepFailed {
            step_id,
            error,
            will_retry,
            ..
        } => {
            let suffix = if *will_retry { " (retrying)" } else { "" };
            println!(
                "  {} {step_id}: {}{suffix}",
                style("✗").red(),
                style(error).red()
            );
        }
        WorkflowEvent::StepSkipped { step_id, .. } => {
            println!("  {} {step_id} skipped", style("-").dim());
        }
        WorkflowEvent::HumanReviewRequired {
            step_id, step_name, ..
        } => {
            println!(
                "  {} {step_id} awaiting review: {}",
                style("?").magenta().bold(),
                step_name
            );
        }
        WorkflowEvent::WorkflowStarted { .. }
        | WorkflowEvent::WorkflowComplete { .. }
        | WorkflowEvent::WorkflowFailed { .. }
        | WorkflowEvent::WorkflowCancelled { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_context_accepts_object() {
        let map = parse_context(Some(r#"{"topic": "rust", "limit": 3}"#)).unwrap();
        assert_eq!(map["topic"], "rust");
        assert_eq!(map["limit"], 3);
    }

    #[test]
    fn parse_context_absent_is_empty() {
        assert!(parse_context(None).unwrap().is_empty());
    }

    #[test]
    fn parse_context_rejects_non_object() {
        let err = parse_context(Some("[1, 2]")).unwrap_err();
        assert!(err.to_string().contains("JSON object"));

        assert!(parse_context(Some("{not json")).is_err());
    }

    #[test]
    fn validate_reports_problems() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(
            &path,
            r#"
id: bad
name: Bad
steps:
  - id: a
    name: A
    agent: builtin
    tool: echo
    next_steps: [missing]
"#,
        )
        .unwrap();

        assert!(handle_validate(&path, true).is_err());
    }

    #[test]
    fn validate_and_plan_accept_good_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("good.yaml");
        std::fs::write(
            &path,
            r#"
id: good
name: Good
steps:
  - id: fetch
    name: Fetch
    agent: builtin
    tool: echo
    next_steps: [summarize]
  - id: summarize
    name: Summarize
    agent: builtin
    tool: echo
"#,
        )
        .unwrap();

        handle_validate(&path, true).unwrap();
        handle_plan(&path, true).unwrap();
    }
}
