//! `medallion kg` subcommands: pattern queries and graph inspection.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;

use medallion_core::query::translator::{QueryShape, translate};
use medallion_core::repository::graph::GraphRepository;
use medallion_types::graph::{Entity, QueryRows};

use super::{display_value, truncate};
use crate::state::AppState;

/// Translate and run a query, returning the rows and the translation shape.
async fn run_query(state: &AppState, query: &str) -> Result<(QueryRows, QueryShape)> {
    let translated = translate(query)?;
    tracing::debug!(sql = %translated, "translated query");

    let rows = state
        .repo
        .query(&translated.sql, &translated.args)
        .await
        .with_context(|| format!("query failed: {}", translated.sql))?;
    Ok((rows, translated.shape))
}

pub async fn handle_query(state: &AppState, query: &str, json: bool) -> Result<()> {
    let (rows, shape) = run_query(state, query).await?;

    if json {
        let out = match shape {
            QueryShape::Count(_) => rows
                .rows
                .first()
                .and_then(|r| r.first())
                .cloned()
                .unwrap_or(Value::from(0)),
            _ => Value::from(
                rows.to_objects()
                    .into_iter()
                    .map(Value::Object)
                    .collect::<Vec<_>>(),
            ),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!();
        println!("  No results.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            rows.columns
                .iter()
                .map(|c| Cell::new(c).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    for row in &rows.rows {
        table.add_row(
            row.iter()
                .map(|v| Cell::new(truncate(&display_value(v), 48)))
                .collect::<Vec<_>>(),
        );
    }

    println!();
    println!("{table}");
    println!("  {} row(s)", rows.len());
    println!();

    Ok(())
}

/// Row count for every queryable entity, in [`Entity::ALL`] order.
async fn entity_counts<R: GraphRepository>(repo: &R) -> Result<Vec<(Entity, i64)>> {
    let mut counts = Vec::with_capacity(Entity::ALL.len());
    for entity in Entity::ALL {
        let n = repo
            .count(entity)
            .await
            .with_context(|| format!("failed to count {entity} rows"))?;
        counts.push((entity, n));
    }
    Ok(counts)
}

pub async fn handle_inspect(state: &AppState, json: bool) -> Result<()> {
    let counts = entity_counts(state.repo.as_ref()).await?;
    let recent = state.repo.list_runs(5).await?;

    if json {
        let entities: serde_json::Map<String, Value> = counts
            .iter()
            .map(|(e, n)| (e.to_string(), Value::from(*n)))
            .collect();
        let out = serde_json::json!({
            "entities": entities,
            "recent_runs": recent,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  {}", style("── Knowledge graph ──").dim());
    for (entity, n) in &counts {
        println!("  {:<10} {}", format!("{entity}:"), style(n).bold());
    }
    println!();

    if !recent.is_empty() {
        println!("  {}", style("── Recent runs ──").dim());
        for run in &recent {
            println!(
                "  {}  {:<10} {}  {}",
                style(&run.id).cyan(),
                run.status,
                run.started_at.format("%Y-%m-%d %H:%M"),
                run.workflow_name
            );
        }
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use medallion_infra::sqlite::graph::SqliteGraphRepository;
    use medallion_infra::sqlite::pool::DatabasePool;
    use medallion_types::graph::Agent;

    #[tokio::test]
    async fn test_entity_counts_reads_store() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("kg.db").display());
        let repo = SqliteGraphRepository::new(DatabasePool::new(&url).await.unwrap());

        let now = Utc::now();
        for (id, name) in [("agent-1", "planner"), ("agent-2", "writer")] {
            repo.create_agent(&Agent {
                id: id.to_string(),
                name: name.to_string(),
                agent_type: "worker".to_string(),
                description: String::new(),
                model_provider: "ollama".to_string(),
                model_name: "llama3".to_string(),
                system_prompt: String::new(),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        }

        let counts = entity_counts(&repo).await.unwrap();
        assert_eq!(
            counts,
            vec![
                (Entity::Agent, 2),
                (Entity::Run, 0),
                (Entity::Artifact, 0),
                (Entity::Claim, 0),
            ]
        );
    }
}
