//! SQLite knowledge-graph repository implementation.
//!
//! Implements `GraphRepository` from `medallion-core` using sqlx with split
//! read/write pools. Writes go through the single-connection writer; reads and
//! passthrough queries use the read-only pool.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;

use medallion_core::repository::graph::GraphRepository;
use medallion_types::error::RepositoryError;
use medallion_types::graph::{
    Agent, Artifact, Claim, Entity, QueryRows, Relationship, Run, RunStatus, Span, SpanStatus,
};

use super::pool::DatabasePool;
use super::rows::{
    AgentRow, ArtifactRow, ClaimRow, RelationshipRow, RunRow, SpanRow, bind_value, decode_rows,
    format_datetime, parse_datetime, row_error, to_json, write_error,
};

/// SQLite-backed implementation of `GraphRepository`.
pub struct SqliteGraphRepository {
    pool: DatabasePool,
}

impl SqliteGraphRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

const AGENT_COLUMNS: &str =
    "id, name, type, description, model_provider, model_name, system_prompt, created_at, updated_at";

impl GraphRepository for SqliteGraphRepository {
    // -- Agents ---------------------------------------------------------------

    async fn create_agent(&self, agent: &Agent) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO agents
               (id, name, type, description, model_provider, model_name, system_prompt, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(&agent.agent_type)
        .bind(&agent.description)
        .bind(&agent.model_provider)
        .bind(&agent.model_name)
        .bind(&agent.system_prompt)
        .bind(format_datetime(&agent.created_at))
        .bind(format_datetime(&agent.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| write_error(e, &format!("agent '{}'", agent.id)))?;

        Ok(())
    }

    async fn get_agent(&self, id: &str) -> Result<Agent, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(row_error)?;

        match row {
            Some(row) => AgentRow::from_row(&row).map_err(row_error)?.into_agent(),
            None => Err(RepositoryError::not_found("agent", id)),
        }
    }

    async fn get_agent_by_name(&self, name: &str) -> Result<Agent, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE name = ? ORDER BY created_at ASC, rowid ASC LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(row_error)?;

        match row {
            Some(row) => AgentRow::from_row(&row).map_err(row_error)?.into_agent(),
            None => Err(RepositoryError::not_found("agent", name)),
        }
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY name ASC, id ASC"))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(row_error)?;

        let mut agents = Vec::with_capacity(rows.len());
        for row in &rows {
            agents.push(AgentRow::from_row(row).map_err(row_error)?.into_agent()?);
        }
        Ok(agents)
    }

    // -- Runs -----------------------------------------------------------------

    async fn create_run(&self, run: &Run) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO runs
               (id, workflow_name, status, input_data, output_data, started_at,
                completed_at, duration_ms, error_message, metadata)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&run.id)
        .bind(&run.workflow_name)
        .bind(run.status.as_str())
        .bind(to_json(&run.input_data))
        .bind(to_json(&run.output_data))
        .bind(format_datetime(&run.started_at))
        .bind(run.completed_at.as_ref().map(format_datetime))
        .bind(run.duration_ms)
        .bind(&run.error_message)
        .bind(to_json(&run.metadata))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| write_error(e, &format!("run '{}'", run.id)))?;

        Ok(())
    }

    async fn get_run(&self, id: &str) -> Result<Run, RepositoryError> {
        let row = sqlx::query("SELECT * FROM runs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(row_error)?;

        match row {
            Some(row) => RunRow::from_row(&row).map_err(row_error)?.into_run(),
            None => Err(RepositoryError::not_found("run", id)),
        }
    }

    async fn list_runs(&self, limit: i64) -> Result<Vec<Run>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM runs ORDER BY started_at DESC, rowid DESC LIMIT ?")
            .bind(limit.max(0))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(row_error)?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in &rows {
            runs.push(RunRow::from_row(row).map_err(row_error)?.into_run()?);
        }
        Ok(runs)
    }

    async fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        output_data: &Value,
        error_message: Option<&str>,
    ) -> Result<(), RepositoryError> {
        if !status.is_terminal() {
            return Err(RepositoryError::Conflict(format!(
                "run '{run_id}' can only move to a terminal status, not '{status}'"
            )));
        }

        // The writer is a single connection, so this read sees the latest state.
        let row = sqlx::query("SELECT status, started_at FROM runs WHERE id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(row_error)?
            .ok_or_else(|| RepositoryError::not_found("run", run_id))?;

        let current: String = row.try_get("status").map_err(row_error)?;
        if current != RunStatus::Running.as_str() {
            return Err(RepositoryError::Conflict(format!(
                "run '{run_id}' is already {current}"
            )));
        }

        let started_at: String = row.try_get("started_at").map_err(row_error)?;
        let started_at = parse_datetime(&started_at)?;
        let completed_at = Utc::now().max(started_at);
        let duration_ms = (completed_at - started_at).num_milliseconds();

        let result = sqlx::query(
            r#"UPDATE runs
               SET status = ?, output_data = ?, error_message = ?, completed_at = ?, duration_ms = ?
               WHERE id = ? AND status = 'running'"#,
        )
        .bind(status.as_str())
        .bind(to_json(output_data))
        .bind(error_message)
        .bind(format_datetime(&completed_at))
        .bind(duration_ms)
        .bind(run_id)
        .execute(&self.pool.writer)
        .await
        .map_err(row_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "run '{run_id}' left running state concurrently"
            )));
        }

        tracing::debug!(run_id, status = %status, duration_ms, "run status updated");
        Ok(())
    }

    // -- Artifacts ------------------------------------------------------------

    async fn create_artifact(&self, artifact: &Artifact) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO artifacts
               (id, run_id, step_name, agent_id, content, content_type, metadata, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&artifact.id)
        .bind(&artifact.run_id)
        .bind(&artifact.step_name)
        .bind(&artifact.agent_id)
        .bind(&artifact.content)
        .bind(&artifact.content_type)
        .bind(to_json(&artifact.metadata))
        .bind(format_datetime(&artifact.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| write_error(e, &format!("artifact '{}'", artifact.id)))?;

        Ok(())
    }

    async fn list_artifacts(&self, run_id: &str) -> Result<Vec<Artifact>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM artifacts WHERE run_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(row_error)?;

        let mut artifacts = Vec::with_capacity(rows.len());
        for row in &rows {
            artifacts.push(ArtifactRow::from_row(row).map_err(row_error)?.into_artifact()?);
        }
        Ok(artifacts)
    }

    // -- Claims ---------------------------------------------------------------

    async fn create_claim(&self, claim: &Claim) -> Result<(), RepositoryError> {
        if !claim.has_valid_confidence() {
            return Err(RepositoryError::Query(format!(
                "claim '{}' confidence {} is outside [0, 1]",
                claim.id, claim.confidence
            )));
        }

        sqlx::query(
            r#"INSERT INTO claims (id, agent_id, run_id, content, confidence, metadata, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&claim.id)
        .bind(&claim.agent_id)
        .bind(&claim.run_id)
        .bind(&claim.content)
        .bind(claim.confidence)
        .bind(to_json(&claim.metadata))
        .bind(format_datetime(&claim.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| write_error(e, &format!("claim '{}'", claim.id)))?;

        Ok(())
    }

    async fn list_claims(&self, run_id: &str) -> Result<Vec<Claim>, RepositoryError> {
        let rows =
            sqlx::query("SELECT * FROM claims WHERE run_id = ? ORDER BY created_at ASC, rowid ASC")
                .bind(run_id)
                .fetch_all(&self.pool.reader)
                .await
                .map_err(row_error)?;

        let mut claims = Vec::with_capacity(rows.len());
        for row in &rows {
            claims.push(ClaimRow::from_row(row).map_err(row_error)?.into_claim()?);
        }
        Ok(claims)
    }

    // -- Spans ----------------------------------------------------------------

    async fn create_span(&self, span: &Span) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO spans
               (id, run_id, parent_span_id, name, start_time, end_time, duration_ms, status, metadata)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&span.id)
        .bind(&span.run_id)
        .bind(&span.parent_span_id)
        .bind(&span.name)
        .bind(format_datetime(&span.start_time))
        .bind(span.end_time.as_ref().map(format_datetime))
        .bind(span.duration_ms)
        .bind(span.status.as_str())
        .bind(to_json(&span.metadata))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| write_error(e, &format!("span '{}'", span.id)))?;

        Ok(())
    }

    async fn update_span(
        &self,
        id: &str,
        end_time: DateTime<Utc>,
        status: SpanStatus,
        metadata: &Value,
    ) -> Result<(), RepositoryError> {
        let start_time: String = sqlx::query("SELECT start_time FROM spans WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(row_error)?
            .ok_or_else(|| RepositoryError::not_found("span", id))?
            .try_get("start_time")
            .map_err(row_error)?;
        let duration_ms = (end_time - parse_datetime(&start_time)?)
            .num_milliseconds()
            .max(0);

        sqlx::query(
            "UPDATE spans SET end_time = ?, duration_ms = ?, status = ?, metadata = ? WHERE id = ?",
        )
        .bind(format_datetime(&end_time))
        .bind(duration_ms)
        .bind(status.as_str())
        .bind(to_json(metadata))
        .bind(id)
        .execute(&self.pool.writer)
        .await
        .map_err(row_error)?;

        Ok(())
    }

    async fn list_spans(&self, run_id: &str) -> Result<Vec<Span>, RepositoryError> {
        let rows =
            sqlx::query("SELECT * FROM spans WHERE run_id = ? ORDER BY start_time ASC, rowid ASC")
                .bind(run_id)
                .fetch_all(&self.pool.reader)
                .await
                .map_err(row_error)?;

        let mut spans = Vec::with_capacity(rows.len());
        for row in &rows {
            spans.push(SpanRow::from_row(row).map_err(row_error)?.into_span()?);
        }
        Ok(spans)
    }

    // -- Relationships --------------------------------------------------------

    async fn create_relationship(
        &self,
        relationship: &Relationship,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO relationships
               (id, source_type, source_id, target_type, target_id, relationship_type, metadata, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&relationship.id)
        .bind(&relationship.source_type)
        .bind(&relationship.source_id)
        .bind(&relationship.target_type)
        .bind(&relationship.target_id)
        .bind(&relationship.relationship_type)
        .bind(to_json(&relationship.metadata))
        .bind(format_datetime(&relationship.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| write_error(e, &format!("relationship '{}'", relationship.id)))?;

        Ok(())
    }

    async fn list_relationships(
        &self,
        source_type: &str,
        source_id: &str,
    ) -> Result<Vec<Relationship>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM relationships WHERE source_type = ? AND source_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(source_type)
        .bind(source_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(row_error)?;

        let mut relationships = Vec::with_capacity(rows.len());
        for row in &rows {
            relationships.push(
                RelationshipRow::from_row(row)
                    .map_err(row_error)?
                    .into_relationship()?,
            );
        }
        Ok(relationships)
    }

    // -- Inspection -----------------------------------------------------------

    async fn count(&self, entity: Entity) -> Result<i64, RepositoryError> {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", entity.table()))
            .fetch_one(&self.pool.reader)
            .await
            .map_err(row_error)?;
        Ok(n)
    }

    async fn query(&self, sql: &str, args: &[Value]) -> Result<QueryRows, RepositoryError> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = bind_value(query, arg);
        }

        let rows = query
            .fetch_all(&self.pool.reader)
            .await
            .map_err(row_error)?;

        tracing::debug!(rows = rows.len(), "passthrough query executed");
        decode_rows(&rows)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
