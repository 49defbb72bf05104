//! CLI command definitions for the `weave` binary.
//!
//! Uses clap derive macros for argument parsing. Workflow-file commands
//! (`validate`, `plan`, `run`, `resume`) take a YAML path; execution
//! commands (`status`, `logs`, `list`) read from the execution store.

pub mod execution;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Run agent-tool workflows defined in YAML.
#[derive(Parser)]
#[command(name = "weave", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export tracing spans via OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "WEAVE_OTEL")]
    pub otel: bool,

    /// Engine config file (defaults to `$WEAVE_DATA_DIR/weave.toml`).
    #[arg(long, global = true, env = "WEAVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database URL (defaults to `sqlite://$WEAVE_DATA_DIR/weave.db`).
    #[arg(long, global = true, env = "WEAVE_DATABASE_URL")]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check a workflow file and report every problem found.
    Validate {
        /// Path to the workflow YAML file.
        file: PathBuf,
    },

    /// Show the execution levels of a workflow.
    Plan {
        /// Path to the workflow YAML file.
        file: PathBuf,
    },

    /// Execute a workflow until it completes, fails or pauses for review.
    Run {
        /// Path to the workflow YAML file.
        file: PathBuf,

        /// Input context as a JSON object.
        #[arg(long)]
        context: Option<String>,

        /// Organization the run belongs to.
        #[arg(long)]
        org: Option<String>,

        /// User starting the run.
        #[arg(long)]
        user: Option<String>,

        /// Role held by the caller (repeatable).
        #[arg(long = "role")]
        roles: Vec<String>,
    },

    /// Continue an execution paused at a human review step.
    Resume {
        /// Path to the workflow YAML file the execution was started from.
        file: PathBuf,

        /// Execution UUID.
        execution_id: String,

        /// Approve the review and continue.
        #[arg(long, conflicts_with = "reject", required_unless_present = "reject")]
        approve: bool,

        /// Reject the review and cancel the execution.
        #[arg(long)]
        reject: bool,

        /// Reviewer notes stored with the decision.
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show the state of an execution.
    Status {
        /// Execution UUID.
        execution_id: String,
    },

    /// Show the step transition log of an execution.
    Logs {
        /// Execution UUID.
        execution_id: String,
    },

    /// List executions, newest first.
    #[command(alias = "ls")]
    List {
        /// Only show executions of this organization.
        #[arg(long)]
        org: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_repeated_roles() {
        let cli = Cli::try_parse_from([
            "weave", "run", "flow.yaml", "--context", "{\"topic\":\"rust\"}", "--role", "admin",
            "--role", "ops", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::Run { file, context, roles, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(file, PathBuf::from("flow.yaml"));
        assert_eq!(context.as_deref(), Some("{\"topic\":\"rust\"}"));
        assert_eq!(roles, vec!["admin", "ops"]);
    }

    #[test]
    fn resume_requires_a_decision() {
        assert!(Cli::try_parse_from(["weave", "resume", "flow.yaml", "abc"]).is_err());
        assert!(
            Cli::try_parse_from(["weave", "resume", "flow.yaml", "abc", "--approve", "--reject"])
                .is_err()
        );

        let cli = Cli::try_parse_from([
            "weave", "resume", "flow.yaml", "abc", "--reject", "--notes", "off-topic",
        ])
        .unwrap();
        let Commands::Resume { approve, reject, notes, .. } = cli.command else {
            panic!("expected resume");
        };
        assert!(!approve);
        assert!(reject);
        assert_eq!(notes.as_deref(), Some("off-topic"));
    }
}
