//! Weave CLI entry point.
//!
//! Binary name: `weave`
//!
//! Parses CLI arguments, sets up tracing, and dispatches to the command
//! handlers. File-only commands (`validate`, `plan`) skip database setup.

mod builtin;
mod cli;
mod state;

use clap::Parser;
use weave_core::workflow::ReviewDecision;
use weave_observe::{LogFormat, TracingOptions, filter_for_verbosity};

use cli::workflow::RunArgs;
use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let tracing_opts = TracingOptions {
        default_filter: filter_for_verbosity(cli.verbose, cli.quiet).to_string(),
        format: if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
        enable_otel: cli.otel,
    };
    weave_observe::init_tracing(&tracing_opts)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    weave_observe::shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let json = cli.json;
    let quiet = cli.quiet;
    let open = || AppState::init(cli.config.as_deref(), cli.db.as_deref());

    match cli.command {
        Commands::Validate { file } => cli::workflow::handle_validate(&file, json),

        Commands::Plan { file } => cli::workflow::handle_plan(&file, json),

        Commands::Run {
            file,
            context,
            org,
            user,
            roles,
        } => {
            let state = open().await?;
            let args = RunArgs {
                context,
                org,
                user,
                roles,
            };
            cli::workflow::handle_run(&state, &file, args, json, quiet).await
        }

        Commands::Resume {
            file,
            execution_id,
            approve,
            notes,
            ..
        } => {
            let state = open().await?;
            let decision = if approve {
                ReviewDecision::Approve
            } else {
                ReviewDecision::Reject
            };
            cli::workflow::handle_resume(&state, &file, &execution_id, decision, notes, json, quiet)
                .await
        }

        Commands::Status { execution_id } => {
            let state = open().await?;
            cli::execution::handle_status(&state, &execution_id, json).await
        }

        Commands::Logs { execution_id } => {
            let state = open().await?;
            cli::execution::handle_logs(&state, &execution_id, json).await
        }

        Commands::List { org } => {
            let state = open().await?;
            cli::execution::handle_list(&state, org.as_deref(), json).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_commands_dispatch_without_a_database() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hello.yaml");
        std::fs::write(
            &file,
            "id: hello\nname: Hello\nsteps:\n  - id: greet\n    name: Greet\n    agent: builtin\n    tool: echo\n",
        )
        .unwrap();
        // Unopenable on purpose: reaching AppState::init would fail.
        let db = "sqlite:///nonexistent-dir/weave.db";
        let path = file.to_str().unwrap();

        for command in ["validate", "plan"] {
            let cli = Cli::parse_from(["weave", "--json", "--db", db, command, path]);
            dispatch(cli).await.unwrap();
        }
    }
}
