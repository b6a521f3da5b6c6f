//! Medallion CLI entry point.
//!
//! Binary name: `medallion`
//!
//! Parses CLI arguments, sets up tracing, opens the knowledge graph when the
//! command needs it, then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;

use cli::{AgentCommand, Cli, Commands, KgCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    medallion_observe::tracing_setup::init_tracing(cli.verbose, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    medallion_observe::tracing_setup::shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    // Validation is purely offline.
    if let Commands::Validate { file } = &cli.command {
        return cli::workflow::handle_validate(file, cli.json);
    }

    let state = AppState::init(cli.config.as_deref()).await?;

    let result = match cli.command {
        Commands::Run { file, var, run_id } => {
            cli::workflow::handle_run(&state, &file, &var, run_id, cli.json).await
        }
        Commands::Validate { .. } => unreachable!("handled above"),
        Commands::Agent { action } => match action {
            AgentCommand::Add { file } => cli::agent::handle_add(&state, &file, cli.json).await,
            AgentCommand::Show { agent } => {
                cli::agent::handle_show(&state, &agent, cli.json).await
            }
            AgentCommand::List => cli::agent::handle_list(&state, cli.json).await,
        },
        Commands::Kg { action } => match action {
            KgCommand::Query { query } => cli::kg::handle_query(&state, &query, cli.json).await,
            KgCommand::Inspect => cli::kg::handle_inspect(&state, cli.json).await,
        },
        Commands::Trace { run_id } => cli::trace::handle_trace(&state, run_id, cli.json).await,
    };

    state.close().await;
    result
}
