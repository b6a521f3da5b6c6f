//! `medallion trace`: a run with its spans and artifacts.

use anyhow::{Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use medallion_core::repository::graph::GraphRepository;
use medallion_types::graph::{Span, SpanStatus};

use super::truncate;
use crate::state::AppState;

/// Spans in display order with their nesting depth (roots first, children
/// under their parent, siblings by start time).
pub fn span_tree(spans: &[Span]) -> Vec<(usize, &Span)> {
    fn visit<'a>(
        parent: Option<&str>,
        depth: usize,
        spans: &'a [Span],
        out: &mut Vec<(usize, &'a Span)>,
    ) {
        for span in spans
            .iter()
            .filter(|s| s.parent_span_id.as_deref() == parent)
        {
            out.push((depth, span));
            visit(Some(span.id.as_str()), depth + 1, spans, out);
        }
    }

    let mut out = Vec::with_capacity(spans.len());
    visit(None, 0, spans, &mut out);

    // Orphans whose parent is missing still get listed.
    for span in spans {
        if !out.iter().any(|(_, s)| s.id == span.id) {
            out.push((0, span));
        }
    }
    out
}

pub async fn handle_trace(state: &AppState, run_id: Option<String>, json: bool) -> Result<()> {
    let run = match run_id {
        Some(id) => state.repo.get_run(&id).await?,
        None => match state.repo.list_runs(1).await?.into_iter().next() {
            Some(run) => run,
            None => bail!("No runs recorded yet"),
        },
    };
    let spans = state.repo.list_spans(&run.id).await?;
    let artifacts = state.repo.list_artifacts(&run.id).await?;

    if json {
        let out = serde_json::json!({
            "run": run,
            "spans": spans,
            "artifacts": artifacts,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} ({})",
        style("Run").bold(),
        style(&run.id).cyan(),
        run.workflow_name
    );
    println!("  Status:   {}", run.status);
    println!("  Started:  {}", run.started_at.to_rfc3339());
    if let Some(completed) = run.completed_at {
        println!("  Finished: {}", completed.to_rfc3339());
    }
    if let Some(ms) = run.duration_ms {
        println!("  Duration: {ms} ms");
    }
    if let Some(err) = &run.error_message {
        println!("  {} {err}", style("Error:").red().bold());
    }

    if !spans.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Span").fg(Color::Cyan),
                Cell::new("Status"),
                Cell::new("Duration"),
                Cell::new("Tokens"),
            ]);
        for (depth, span) in span_tree(&spans) {
            let status = match span.status {
                SpanStatus::Ok => Cell::new("ok").fg(Color::Green),
                SpanStatus::Error => Cell::new("error").fg(Color::Red),
                SpanStatus::Running => Cell::new("running").fg(Color::Yellow),
            };
            let duration = span
                .duration_ms
                .map(|ms| format!("{ms} ms"))
                .unwrap_or_else(|| "-".to_string());
            let tokens = span
                .metadata
                .get("tokens_used")
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            table.add_row(vec![
                Cell::new(format!("{}{}", "  ".repeat(depth), span.name)),
                status,
                Cell::new(duration),
                Cell::new(tokens),
            ]);
        }
        println!();
        println!("{table}");
    }

    if !artifacts.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Step").fg(Color::Cyan),
                Cell::new("Agent"),
                Cell::new("Content"),
            ]);
        for artifact in &artifacts {
            table.add_row(vec![
                Cell::new(&artifact.step_name),
                Cell::new(&artifact.agent_id),
                Cell::new(truncate(&artifact.content, 60)),
            ]);
        }
        println!();
        println!("{table}");
    }
    println!();

    Ok(())
}
