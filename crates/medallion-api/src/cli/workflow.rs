//! `medallion run` and `medallion validate`.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use medallion_core::workflow::dag::{get_step_dependencies, scan_order, validate_dag};
use medallion_core::workflow::definition::{WorkflowError, load_workflow_file};
use medallion_core::workflow::executor::ExecuteOptions;
use medallion_types::graph::RunStatus;
use medallion_types::workflow::{ExecutionResult, StepStatus};

use super::truncate;
use crate::state::AppState;

/// Parse repeated `--var key=value` flags. Values that parse as JSON keep
/// their type; anything else is taken as a plain string.
pub fn parse_vars(raw: &[String]) -> Result<BTreeMap<String, Value>> {
    let mut vars = BTreeMap::new();
    for item in raw {
        let Some((key, value)) = item.split_once('=') else {
            bail!("invalid --var '{item}': expected KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("invalid --var '{item}': key must not be empty");
        }
        let value =
            serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()));
        vars.insert(key.to_string(), value);
    }
    Ok(vars)
}

fn load_definition(file: &Path) -> Result<medallion_types::workflow::WorkflowDefinition> {
    load_workflow_file(file).map_err(|e| match e {
        WorkflowError::ParseError(msg) => anyhow::anyhow!("Failed to parse workflow YAML: {msg}"),
        WorkflowError::ValidationError(msg) => anyhow::anyhow!("Workflow validation failed: {msg}"),
        other => anyhow::anyhow!("Failed to load workflow {}: {other}", file.display()),
    })
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

pub fn handle_validate(file: &Path, json: bool) -> Result<()> {
    let def = load_definition(file)?;
    let dag_check = validate_dag(&def.steps);
    let order = scan_order(&def.steps);

    if json {
        let steps: Vec<_> = def
            .steps
            .iter()
            .map(|s| {
                serde_json::json!({
                    "name": s.name,
                    "agent": s.agent,
                    "depends_on": s.depends_on,
                    "all_dependencies": get_step_dependencies(&s.name, &def.steps),
                })
            })
            .collect();
        let out = serde_json::json!({
            "name": def.name,
            "valid": dag_check.is_ok(),
            "error": dag_check.as_ref().err().map(|e| e.to_string()),
            "order": order,
            "steps": steps,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  Workflow '{}' ({} steps)",
            style(&def.name).cyan(),
            def.steps.len()
        );
        println!("  Order: {}", order.join(" -> "));
        match &dag_check {
            Ok(()) => println!("  {} Dependencies form a DAG", style("✓").green()),
            Err(e) => println!("  {} {e}", style("✗").red()),
        }
        println!();
    }

    dag_check.with_context(|| format!("workflow '{}' would stall", def.name))
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub async fn handle_run(
    state: &AppState,
    file: &Path,
    raw_vars: &[String],
    run_id: Option<String>,
    json: bool,
) -> Result<()> {
    let def = load_definition(file)?;
    let variables = parse_vars(raw_vars)?;
    let executor = state.executor()?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            interrupt.cancel();
        }
    });

    let outcome = executor
        .execute(&def, variables, ExecuteOptions { run_id }, &cancel)
        .await;
    watcher.abort();

    let close_failures = executor.providers().close_all().await;
    if close_failures > 0 {
        tracing::debug!(close_failures, "providers closed with errors");
    }

    let stats = executor.stats();
    if stats.artifact_write_failures > 0 || stats.span_write_failures > 0 {
        tracing::warn!(
            artifact_failures = stats.artifact_write_failures,
            span_failures = stats.span_write_failures,
            "some run records could not be written"
        );
    }

    match outcome {
        Ok(result) => print_result(&result, json),
        Err(err) => {
            if let Some(partial) = err.partial_result() {
                print_result(partial, json)?;
            }
            Err(err.into())
        }
    }
}

fn print_result(result: &ExecutionResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    let status = match result.status {
        RunStatus::Completed => style(result.status.to_string()).green(),
        RunStatus::Failed => style(result.status.to_string()).red(),
        RunStatus::Running => style(result.status.to_string()).yellow(),
    };

    println!();
    println!(
        "  Run {} of '{}': {} in {} ms",
        style(&result.run_id).cyan(),
        result.workflow_name,
        status,
        result.duration_ms
    );

    if !result.execution_order.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Step").fg(Color::Cyan),
                Cell::new("Agent"),
                Cell::new("Status"),
                Cell::new("Duration"),
                Cell::new("Output"),
            ]);

        for name in &result.execution_order {
            let Some(step) = result.steps.get(name) else {
                continue;
            };
            let status_cell = match step.status {
                StepStatus::Completed => Cell::new("completed").fg(Color::Green),
                StepStatus::Failed => Cell::new("failed").fg(Color::Red),
            };
            let output = step.error.as_deref().unwrap_or(&step.output);
            table.add_row(vec![
                Cell::new(&step.name),
                Cell::new(&step.agent),
                status_cell,
                Cell::new(format!("{} ms", step.duration_ms)),
                Cell::new(truncate(output, 60)),
            ]);
        }

        println!();
        println!("{table}");
    }

    if let Some(error) = &result.error {
        println!();
        println!("  {} {error}", style("Error:").red().bold());
    } else if let Some(last) = result.execution_order.last() {
        if let Some(step) = result.steps.get(last) {
            println!();
            println!("  {}", style(format!("── {last} ──")).dim());
            println!("{}", step.output);
        }
    }
    println!();

    Ok(())
}
