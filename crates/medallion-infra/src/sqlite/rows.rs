//! Row decoding and value binding shared by the SQLite graph repository.
//!
//! Timestamps are stored as RFC 3339 text and JSON columns as serialized text;
//! each `*Row` struct reads the raw columns and converts them into the domain
//! type, reporting malformed data as `RepositoryError::Query`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use medallion_types::error::RepositoryError;
use medallion_types::graph::{
    Agent, Artifact, Claim, QueryRows, Relationship, Run, RunStatus, Span, SpanStatus,
};

pub(crate) type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width UTC form so text ordering matches time ordering.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_json(s: &str, column: &str) -> Result<Value, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid {column} JSON: {e}")))
}

pub(crate) fn to_json(value: &Value) -> String {
    value.to_string()
}

pub(crate) fn row_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

/// Map a write error, turning primary-key/unique violations into `Conflict`.
pub(crate) fn write_error(e: sqlx::Error, what: &str) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(format!("{what} already exists"))
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            RepositoryError::Query(format!("{what} references a missing record: {db}"))
        }
        _ => RepositoryError::Query(e.to_string()),
    }
}

/// Bind one JSON scalar as a positional argument.
pub(crate) fn bind_value<'q>(query: SqliteQuery<'q>, value: &'q Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.as_str()),
        other => query.bind(other.to_string()),
    }
}

/// Decode an arbitrary result set into column names plus JSON values, using
/// each cell's storage class.
pub(crate) fn decode_rows(rows: &[SqliteRow]) -> Result<QueryRows, RepositoryError> {
    let columns: Vec<String> = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let mut decoded = Vec::with_capacity(rows.len());
    for row in rows {
        let mut cells = Vec::with_capacity(columns.len());
        for idx in 0..row.len() {
            cells.push(decode_cell(row, idx).map_err(row_error)?);
        }
        decoded.push(cells);
    }

    Ok(QueryRows {
        columns,
        rows: decoded,
    })
}

fn decode_cell(row: &SqliteRow, idx: usize) -> Result<Value, sqlx::Error> {
    let storage = {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        raw.type_info().name().to_string()
    };

    Ok(match storage.as_str() {
        "INTEGER" => Value::from(row.try_get_unchecked::<i64, _>(idx)?),
        "REAL" => Value::from(row.try_get_unchecked::<f64, _>(idx)?),
        "BLOB" => Value::String(format!(
            "<{} bytes>",
            row.try_get_unchecked::<Vec<u8>, _>(idx)?.len()
        )),
        _ => Value::String(row.try_get_unchecked::<String, _>(idx)?),
    })
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

pub(crate) struct AgentRow {
    id: String,
    name: String,
    agent_type: String,
    description: String,
    model_provider: String,
    model_name: String,
    system_prompt: String,
    created_at: String,
    updated_at: String,
}

impl AgentRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            agent_type: row.try_get("type")?,
            description: row.try_get("description")?,
            model_provider: row.try_get("model_provider")?,
            model_name: row.try_get("model_name")?,
            system_prompt: row.try_get("system_prompt")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    pub(crate) fn into_agent(self) -> Result<Agent, RepositoryError> {
        Ok(Agent {
            id: self.id,
            name: self.name,
            agent_type: self.agent_type,
            description: self.description,
            model_provider: self.model_provider,
            model_name: self.model_name,
            system_prompt: self.system_prompt,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

pub(crate) struct RunRow {
    id: String,
    workflow_name: String,
    status: String,
    input_data: String,
    output_data: String,
    started_at: String,
    completed_at: Option<String>,
    duration_ms: Option<i64>,
    error_message: Option<String>,
    metadata: String,
}

impl RunRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_name: row.try_get("workflow_name")?,
            status: row.try_get("status")?,
            input_data: row.try_get("input_data")?,
            output_data: row.try_get("output_data")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            duration_ms: row.try_get("duration_ms")?,
            error_message: row.try_get("error_message")?,
            metadata: row.try_get("metadata")?,
        })
    }

    pub(crate) fn into_run(self) -> Result<Run, RepositoryError> {
        let status: RunStatus = self.status.parse().map_err(RepositoryError::Query)?;
        Ok(Run {
            id: self.id,
            workflow_name: self.workflow_name,
            status,
            input_data: parse_json(&self.input_data, "input_data")?,
            output_data: parse_json(&self.output_data, "output_data")?,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            duration_ms: self.duration_ms,
            error_message: self.error_message,
            metadata: parse_json(&self.metadata, "metadata")?,
        })
    }
}

pub(crate) struct ArtifactRow {
    id: String,
    run_id: String,
    step_name: String,
    agent_id: String,
    content: String,
    content_type: String,
    metadata: String,
    created_at: String,
}

impl ArtifactRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            run_id: row.try_get("run_id")?,
            step_name: row.try_get("step_name")?,
            agent_id: row.try_get("agent_id")?,
            content: row.try_get("content")?,
            content_type: row.try_get("content_type")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }

    pub(crate) fn into_artifact(self) -> Result<Artifact, RepositoryError> {
        Ok(Artifact {
            id: self.id,
            run_id: self.run_id,
            step_name: self.step_name,
            agent_id: self.agent_id,
            content: self.content,
            content_type: self.content_type,
            metadata: parse_json(&self.metadata, "metadata")?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

pub(crate) struct ClaimRow {
    id: String,
    agent_id: String,
    run_id: String,
    content: String,
    confidence: f64,
    metadata: String,
    created_at: String,
}

impl ClaimRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            agent_id: row.try_get("agent_id")?,
            run_id: row.try_get("run_id")?,
            content: row.try_get("content")?,
            confidence: row.try_get("confidence")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }

    pub(crate) fn into_claim(self) -> Result<Claim, RepositoryError> {
        Ok(Claim {
            id: self.id,
            agent_id: self.agent_id,
            run_id: self.run_id,
            content: self.content,
            confidence: self.confidence,
            metadata: parse_json(&self.metadata, "metadata")?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

pub(crate) struct SpanRow {
    id: String,
    run_id: String,
    parent_span_id: Option<String>,
    name: String,
    start_time: String,
    end_time: Option<String>,
    duration_ms: Option<i64>,
    status: String,
    metadata: String,
}

impl SpanRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            run_id: row.try_get("run_id")?,
            parent_span_id: row.try_get("parent_span_id")?,
            name: row.try_get("name")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            duration_ms: row.try_get("duration_ms")?,
            status: row.try_get("status")?,
            metadata: row.try_get("metadata")?,
        })
    }

    pub(crate) fn into_span(self) -> Result<Span, RepositoryError> {
        let status: SpanStatus = self.status.parse().map_err(RepositoryError::Query)?;
        Ok(Span {
            id: self.id,
            run_id: self.run_id,
            parent_span_id: self.parent_span_id,
            name: self.name,
            start_time: parse_datetime(&self.start_time)?,
            end_time: self.end_time.as_deref().map(parse_datetime).transpose()?,
            duration_ms: self.duration_ms,
            status,
            metadata: parse_json(&self.metadata, "metadata")?,
        })
    }
}

pub(crate) struct RelationshipRow {
    id: String,
    source_type: String,
    source_id: String,
    target_type: String,
    target_id: String,
    relationship_type: String,
    metadata: String,
    created_at: String,
}

impl RelationshipRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            source_type: row.try_get("source_type")?,
            source_id: row.try_get("source_id")?,
            target_type: row.try_get("target_type")?,
            target_id: row.try_get("target_id")?,
            relationship_type: row.try_get("relationship_type")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }

    pub(crate) fn into_relationship(self) -> Result<Relationship, RepositoryError> {
        Ok(Relationship {
            id: self.id,
            source_type: self.source_type,
            source_id: self.source_id,
            target_type: self.target_type,
            target_id: self.target_id,
            relationship_type: self.relationship_type,
            metadata: parse_json(&self.metadata, "metadata")?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}
