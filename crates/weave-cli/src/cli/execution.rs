//! CLI execution inspection subcommands: status, logs and list.
//!
//! Also hosts the shared rendering helpers used after `run` and `resume`.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use weave_types::execution::{ExecutionStatus, StepStatus, StepTransition, WorkflowExecution};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

pub async fn handle_status(state: &AppState, execution_id: &str, json: bool) -> Result<()> {
    let id = parse_execution_id(execution_id)?;
    let execution = state.orchestrator.get_execution(id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&execution)?);
        return Ok(());
    }

    print_execution(&execution, None);
    Ok(())
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

pub async fn handle_logs(state: &AppState, execution_id: &str, json: bool) -> Result<()> {
    let id = parse_execution_id(execution_id)?;
    // Surfaces "not found" instead of an empty log for unknown ids.
    state.orchestrator.get_execution(id).await?;
    let log = state.orchestrator.step_log(id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&log)?);
        return Ok(());
    }

    if log.is_empty() {
        println!();
        println!("  No step transitions for execution '{}'.", short_id(&id));
        println!();
        return Ok(());
    }

    println!();
    println!("  Step log for execution '{}'", style(short_id(&id)).cyan());
    println!();
    println!("{}", transitions_table(&log));
    println!();

    Ok(())
}

fn transitions_table(log: &[StepTransition]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Time").fg(Color::Cyan),
            Cell::new("Step"),
            Cell::new("Status"),
            Cell::new("Attempt"),
            Cell::new("Error"),
        ]);

    for t in log {
        let attempt = if t.attempt == 0 {
            "-".to_string()
        } else {
            t.attempt.to_string()
        };
        let error = t
            .error
            .as_ref()
            .map(|e| e.chars().take(60).collect::<String>())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(t.recorded_at.format("%H:%M:%S%.3f").to_string()),
            Cell::new(&t.step_id),
            step_status_cell(t.status),
            Cell::new(attempt),
            Cell::new(error),
        ]);
    }

    table
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

pub async fn handle_list(state: &AppState, org: Option<&str>, json: bool) -> Result<()> {
    let executions = state.orchestrator.list_executions(org).await?;

    if json {
        let out: Vec<_> = executions
            .iter()
            .map(|e| {
                serde_json::json!({
                    "id": e.id.to_string(),
                    "workflow_id": e.workflow_id,
                    "status": e.status,
                    "organization_id": e.organization_id,
                    "started_at": e.started_at.to_rfc3339(),
                    "completed_at": e.completed_at.map(|t| t.to_rfc3339()),
                    "error": e.error,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!();
        println!("  No executions recorded.");
        println!("  Start one with: {}", style("weave run <file.yaml>").dim());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Execution").fg(Color::Cyan),
            Cell::new("Workflow"),
            Cell::new("Status"),
            Cell::new("Organization"),
            Cell::new("Started"),
            Cell::new("Completed"),
        ]);

    for e in &executions {
        let completed = e
            .completed_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(short_id(&e.id)),
            Cell::new(&e.workflow_id),
            status_cell(e.status),
            Cell::new(e.organization_id.as_deref().unwrap_or("-")),
            Cell::new(e.started_at.format("%Y-%m-%d %H:%M").to_string()),
            Cell::new(completed),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Shared rendering
// ---------------------------------------------------------------------------

/// Print a styled execution summary. `resume_file` adds a resume hint for
/// paused executions.
pub(crate) fn print_execution(execution: &WorkflowExecution, resume_file: Option<&str>) {
    println!();
    println!(
        "  {} {}",
        style("Execution").bold(),
        style(execution.id).cyan()
    );
    println!("  Workflow: {}", style(&execution.workflow_id).cyan());
    println!("  Status: {}", styled_status(execution.status));
    if let Some(org) = &execution.organization_id {
        println!("  Organization: {org}");
    }
    if let Some(user) = &execution.initiated_by {
        println!("  Initiated by: {user}");
    }
    println!(
        "  Started: {}",
        execution.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(completed) = execution.completed_at {
        println!("  Completed: {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }

    if !execution.completed_steps.is_empty() {
        println!("  Completed steps: {}", execution.completed_steps.join(", "));
    }

    let mut failed: Vec<_> = execution.failed_steps.iter().collect();
    failed.sort_by(|a, b| a.1.failed_at.cmp(&b.1.failed_at));
    for (step_id, failure) in failed {
        println!(
            "  {} {}: {}",
            style("x").red().bold(),
            step_id,
            style(&failure.error).red()
        );
    }

    if let Some(step_id) = &execution.pending_review {
        println!(
            "  Awaiting review at step '{}'",
            style(step_id).magenta()
        );
        let file = resume_file.unwrap_or("<file.yaml>");
        println!(
            "  Continue with: {}",
            style(format!(
                "weave resume {file} {} --approve|--reject",
                execution.id
            ))
            .dim()
        );
    }
    if let Some(notes) = &execution.review_notes {
        println!("  Review notes: {notes}");
    }
    if let Some(err) = &execution.error {
        println!("  Error: {}", style(err).red());
    }
    println!();
}

pub(crate) fn parse_execution_id(raw: &str) -> Result<Uuid> {
    raw.parse()
        .with_context(|| format!("Invalid execution ID: '{raw}'"))
}

pub(crate) fn short_id(id: &Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

fn styled_status(status: ExecutionStatus) -> console::StyledObject<&'static str> {
    let text = status.as_str();
    match status {
        ExecutionStatus::Pending => style(text).yellow(),
        ExecutionStatus::Running => style(text).blue(),
        ExecutionStatus::Paused => style(text).magenta(),
        ExecutionStatus::Completed => style(text).green(),
        ExecutionStatus::Failed => style(text).red(),
        ExecutionStatus::Cancelled => style(text).yellow().dim(),
    }
}

fn status_cell(status: ExecutionStatus) -> Cell {
    let cell = Cell::new(status.as_str());
    match status {
        ExecutionStatus::Pending => cell.fg(Color::Yellow),
        ExecutionStatus::Running => cell.fg(Color::Blue),
        ExecutionStatus::Paused => cell.fg(Color::Magenta),
        ExecutionStatus::Completed => cell.fg(Color::Green),
        ExecutionStatus::Failed => cell.fg(Color::Red),
        ExecutionStatus::Cancelled => cell.fg(Color::DarkYellow),
    }
}

fn step_status_cell(status: StepStatus) -> Cell {
    let cell = Cell::new(status.as_str());
    match status {
        StepStatus::Completed => cell.fg(Color::Green),
        StepStatus::Failed | StepStatus::Rejected => cell.fg(Color::Red),
        StepStatus::Running => cell.fg(Color::Blue),
        StepStatus::AwaitingReview => cell.fg(Color::Magenta),
        StepStatus::Skipped | StepStatus::Dropped | StepStatus::Pruned => cell.fg(Color::DarkGrey),
        StepStatus::Pending => cell,
    }
}
