//! CLI command definitions for the `medallion` binary.
//!
//! Uses clap derive macros for argument parsing. Output is styled text by
//! default and JSON with `--json`.

pub mod agent;
pub mod kg;
pub mod trace;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Run multi-agent workflows and inspect the knowledge graph they produce.
#[derive(Parser)]
#[command(name = "medallion", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides it.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file to use instead of `<data dir>/config.toml`.
    #[arg(long, global = true, env = "MEDALLION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a workflow definition.
    Run {
        /// Path to the workflow YAML file.
        file: PathBuf,

        /// Template variable as key=value (repeatable). JSON values are parsed.
        #[arg(long = "var", value_name = "KEY=VALUE")]
        var: Vec<String>,

        /// Use this run id instead of a generated one.
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Check a workflow definition without running it.
    Validate {
        /// Path to the workflow YAML file.
        file: PathBuf,
    },

    /// Register and inspect agents.
    Agent {
        #[command(subcommand)]
        action: AgentCommand,
    },

    /// Query the knowledge graph.
    Kg {
        #[command(subcommand)]
        action: KgCommand,
    },

    /// Show a run with its spans and artifacts.
    Trace {
        /// Run id (defaults to the most recent run).
        #[arg(long)]
        run_id: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AgentCommand {
    /// Register an agent from a YAML definition.
    Add {
        /// Path to the agent YAML file.
        file: PathBuf,
    },

    /// Show an agent by id or name.
    Show {
        /// Agent id or name.
        agent: String,
    },

    /// List registered agents.
    #[command(alias = "ls")]
    List,
}

#[derive(Subcommand)]
pub enum KgCommand {
    /// Run a MATCH pattern or a native SELECT.
    Query {
        /// e.g. `MATCH (c:Claim) WHERE c.agent_id = "planner" RETURN c`
        query: String,
    },

    /// Count the records behind every graph label.
    Inspect,
}

/// Render a JSON cell for table output.
pub(crate) fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "-".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Shorten long text for a table cell.
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let mut out: String = single_line.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_vars() {
        let cli = Cli::try_parse_from([
            "medallion",
            "run",
            "research.yaml",
            "--var",
            "topic=rust",
            "--var",
            "depth=3",
            "--run-id",
            "run-1",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run { file, var, run_id } => {
                assert_eq!(file, PathBuf::from("research.yaml"));
                assert_eq!(var, vec!["topic=rust", "depth=3"]);
                assert_eq!(run_id.as_deref(), Some("run-1"));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_kg_query_and_verbosity() {
        let cli = Cli::try_parse_from([
            "medallion",
            "-vv",
            "kg",
            "query",
            "MATCH (a:Agent) RETURN a",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Kg {
                action: KgCommand::Query { .. }
            }
        ));
    }

    #[test]
    fn test_display_value_and_truncate() {
        assert_eq!(display_value(&json!(null)), "-");
        assert_eq!(display_value(&json!("x")), "x");
        assert_eq!(display_value(&json!(0.5)), "0.5");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line one\nline two", 8), "line ...");
    }
}
