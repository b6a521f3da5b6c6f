//! Knowledge-graph entities persisted by the store.
//!
//! The store is the single source of truth for workflow state: agents are
//! registered ahead of time, runs and artifacts are written by the executor,
//! claims are asserted by agents, and spans record traced units of work.
//! Relationships are a generic typed edge between any two of these.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Generate a time-ordered, globally unique id with the given prefix
/// (e.g. `run_0190f3...`).
pub fn prefixed_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::now_v7().simple())
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// A named role bound to a provider and a system prompt.
///
/// Created at configuration time and read-only while workflows execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// Role tag, e.g. `planner` or `worker`.
    #[serde(rename = "type")]
    pub agent_type: String,
    #[serde(default)]
    pub description: String,
    /// Name of the provider registration this agent generates through.
    pub model_provider: String,
    pub model_name: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Lifecycle status of a workflow run.
///
/// The only legal transitions are `Running -> Completed` and `Running -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Whether no further transition is allowed out of this status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("invalid run status: '{other}'")),
        }
    }
}

/// One execution of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub workflow_name: String,
    pub status: RunStatus,
    /// Caller-supplied variables, as JSON.
    #[serde(default)]
    pub input_data: Value,
    /// Aggregate output, set on the terminal transition.
    #[serde(default)]
    pub output_data: Value,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl Run {
    /// A fresh `running` run starting now.
    pub fn start(id: String, workflow_name: String, input_data: Value, metadata: Value) -> Self {
        Self {
            id,
            workflow_name,
            status: RunStatus::Running,
            input_data,
            output_data: Value::Null,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            error_message: None,
            metadata,
        }
    }
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// Default content type for generated step output.
pub const TEXT_PLAIN: &str = "text/plain";

/// The persisted output of one successfully executed step. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub run_id: String,
    pub step_name: String,
    pub agent_id: String,
    pub content: String,
    pub content_type: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

/// A proposition asserted by an agent during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    pub agent_id: String,
    pub run_id: String,
    pub content: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Claim {
    /// Whether `confidence` lies in the closed unit interval.
    pub fn has_valid_confidence(&self) -> bool {
        (0.0..=1.0).contains(&self.confidence)
    }
}

// ---------------------------------------------------------------------------
// Span
// ---------------------------------------------------------------------------

/// Status of a traced unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Running,
    Ok,
    Error,
}

impl SpanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Running => "running",
            SpanStatus::Ok => "ok",
            SpanStatus::Error => "error",
        }
    }
}

impl fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SpanStatus::Running),
            "ok" => Ok(SpanStatus::Ok),
            "error" => Ok(SpanStatus::Error),
            other => Err(format!("invalid span status: '{other}'")),
        }
    }
}

/// A tracing record. Opened when a unit of work starts and closed with an
/// end time and status when it finishes. `metadata` may carry token counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: String,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub status: SpanStatus,
    #[serde(default)]
    pub metadata: Value,
}

impl Span {
    /// Open a new span starting now.
    pub fn open(run_id: &str, parent_span_id: Option<String>, name: impl Into<String>) -> Self {
        Self {
            id: prefixed_id("span"),
            run_id: run_id.to_string(),
            parent_span_id,
            name: name.into(),
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            status: SpanStatus::Running,
            metadata: Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Relationship
// ---------------------------------------------------------------------------

/// A typed edge between two graph records, e.g. `agent:planner -CREATED-> claim:c1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub source_type: String,
    pub source_id: String,
    pub target_type: String,
    pub target_id: String,
    pub relationship_type: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Entity labels
// ---------------------------------------------------------------------------

/// The graph labels addressable by pattern queries, each backed by one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Entity {
    Claim,
    Agent,
    Run,
    Artifact,
}

impl Entity {
    pub const ALL: [Entity; 4] = [Entity::Agent, Entity::Run, Entity::Artifact, Entity::Claim];

    /// Backing table name.
    pub fn table(&self) -> &'static str {
        match self {
            Entity::Claim => "claims",
            Entity::Agent => "agents",
            Entity::Run => "runs",
            Entity::Artifact => "artifacts",
        }
    }

    /// Columns a `WHERE` clause may reference.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Entity::Claim => &[
                "id",
                "agent_id",
                "run_id",
                "content",
                "confidence",
                "metadata",
                "created_at",
            ],
            Entity::Agent => &[
                "id",
                "name",
                "type",
                "description",
                "model_provider",
                "model_name",
                "system_prompt",
                "created_at",
                "updated_at",
            ],
            Entity::Run => &[
                "id",
                "workflow_name",
                "status",
                "input_data",
                "output_data",
                "started_at",
                "completed_at",
                "duration_ms",
                "error_message",
                "metadata",
            ],
            Entity::Artifact => &[
                "id",
                "run_id",
                "step_name",
                "agent_id",
                "content",
                "content_type",
                "metadata",
                "created_at",
            ],
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Entity::Claim => "Claim",
            Entity::Agent => "Agent",
            Entity::Run => "Run",
            Entity::Artifact => "Artifact",
        };
        f.write_str(label)
    }
}

impl FromStr for Entity {
    type Err = String;

    /// Labels are matched exactly (`Claim`, not `claim`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Claim" => Ok(Entity::Claim),
            "Agent" => Ok(Entity::Agent),
            "Run" => Ok(Entity::Run),
            "Artifact" => Ok(Entity::Artifact),
            other => Err(format!("unsupported entity label: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw query results
// ---------------------------------------------------------------------------

/// Rows returned by the store's passthrough query, decoded to JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryRows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_objects(&self) -> Vec<serde_json::Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}
