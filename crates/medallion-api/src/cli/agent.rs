//! `medallion agent` subcommands.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use medallion_core::repository::graph::GraphRepository;
use medallion_infra::agents::load_agent_file;
use medallion_types::error::RepositoryError;
use medallion_types::graph::Agent;

use super::truncate;
use crate::state::AppState;

pub async fn handle_add(state: &AppState, file: &Path, json: bool) -> Result<()> {
    let agent = load_agent_file(file).await?.into_agent();

    state
        .repo
        .create_agent(&agent)
        .await
        .with_context(|| format!("Failed to register agent '{}'", agent.name))?;

    if !state.config.providers.contains_key(&agent.model_provider) {
        tracing::warn!(
            agent = %agent.name,
            provider = %agent.model_provider,
            "agent refers to a provider that is not configured"
        );
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&agent)?);
    } else {
        println!();
        println!(
            "  {} Registered agent '{}'",
            style("*").green().bold(),
            style(&agent.name).cyan()
        );
        println!("  ID:       {}", agent.id);
        println!("  Provider: {} ({})", agent.model_provider, agent.model_name);
        println!();
    }

    Ok(())
}

/// Look an agent up by id, then by name.
async fn find_agent(state: &AppState, key: &str) -> Result<Agent> {
    match state.repo.get_agent(key).await {
        Ok(agent) => Ok(agent),
        Err(e) if e.is_not_found() => state
            .repo
            .get_agent_by_name(key)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound { .. } => anyhow::anyhow!("No agent with id or name '{key}'"),
                other => other.into(),
            }),
        Err(e) => Err(e.into()),
    }
}

pub async fn handle_show(state: &AppState, key: &str, json: bool) -> Result<()> {
    let agent = find_agent(state, key).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&agent)?);
        return Ok(());
    }

    println!();
    println!("  {} {}", style("Agent:").bold(), style(&agent.name).cyan());
    println!("  ID:          {}", agent.id);
    println!("  Type:        {}", agent.agent_type);
    if !agent.description.is_empty() {
        println!("  Description: {}", agent.description);
    }
    println!("  Provider:    {}", agent.model_provider);
    println!("  Model:       {}", agent.model_name);
    println!("  Created:     {}", agent.created_at.format("%Y-%m-%d %H:%M"));
    if !agent.system_prompt.is_empty() {
        println!();
        println!("  {}", style("── System prompt ──").dim());
        for line in agent.system_prompt.lines() {
            println!("  {line}");
        }
    }
    println!();

    Ok(())
}

pub async fn handle_list(state: &AppState, json: bool) -> Result<()> {
    let agents = state.repo.list_agents().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&agents)?);
        return Ok(());
    }

    if agents.is_empty() {
        println!();
        println!("  No agents registered.");
        println!(
            "  Register one with: {}",
            style("medallion agent add <agent.yaml>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("ID"),
            Cell::new("Type"),
            Cell::new("Provider"),
            Cell::new("Model"),
            Cell::new("Description"),
        ]);
    for a in &agents {
        table.add_row(vec![
            Cell::new(&a.name),
            Cell::new(&a.id),
            Cell::new(&a.agent_type),
            Cell::new(&a.model_provider),
            Cell::new(&a.model_name),
            Cell::new(truncate(&a.description, 40)),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}
