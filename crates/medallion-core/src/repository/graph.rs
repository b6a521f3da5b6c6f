//! Knowledge-graph repository trait definition.

use chrono::{DateTime, Utc};
use serde_json::Value;

use medallion_types::error::RepositoryError;
use medallion_types::graph::{
    Agent, Artifact, Claim, Entity, QueryRows, Relationship, Run, RunStatus, Span, SpanStatus,
};

/// Repository trait for the persistent knowledge graph.
///
/// Single source of truth for workflow state: agents, runs, step artifacts,
/// claims, tracing spans and typed relationships. Every write is durable
/// before the returned future resolves. Nothing is retried here; callers
/// decide how to handle transient failure.
///
/// Implementations live in medallion-infra (e.g., SqliteGraphRepository).
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait GraphRepository: Send + Sync {
    // -- Agents ---------------------------------------------------------------

    /// Insert an agent. Fails with `Conflict` if the id already exists.
    fn create_agent(
        &self,
        agent: &Agent,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an agent by id. Fails with `NotFound` when absent.
    fn get_agent(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Agent, RepositoryError>> + Send;

    /// Get an agent by its (non-unique) name; the oldest match wins.
    fn get_agent_by_name(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Agent, RepositoryError>> + Send;

    /// All agents, ordered by name.
    fn list_agents(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Agent>, RepositoryError>> + Send;

    // -- Runs -----------------------------------------------------------------

    fn create_run(
        &self,
        run: &Run,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_run(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Run, RepositoryError>> + Send;

    /// Most recent runs first.
    fn list_runs(
        &self,
        limit: i64,
    ) -> impl std::future::Future<Output = Result<Vec<Run>, RepositoryError>> + Send;

    /// Move a `running` run to a terminal status.
    ///
    /// Sets `completed_at` to now (never earlier than `started_at`) and
    /// recomputes `duration_ms`. A run that is already terminal is left
    /// untouched and the call fails with `Conflict`.
    fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        output_data: &Value,
        error_message: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    // -- Artifacts ------------------------------------------------------------

    fn create_artifact(
        &self,
        artifact: &Artifact,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Artifacts of one run in creation order.
    fn list_artifacts(
        &self,
        run_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Artifact>, RepositoryError>> + Send;

    // -- Claims ---------------------------------------------------------------

    fn create_claim(
        &self,
        claim: &Claim,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn list_claims(
        &self,
        run_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Claim>, RepositoryError>> + Send;

    // -- Spans ----------------------------------------------------------------

    fn create_span(
        &self,
        span: &Span,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Close a span: set its end time, status and metadata; duration is
    /// derived from the stored start time.
    fn update_span(
        &self,
        id: &str,
        end_time: DateTime<Utc>,
        status: SpanStatus,
        metadata: &Value,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Spans of one run ordered by start time.
    fn list_spans(
        &self,
        run_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Span>, RepositoryError>> + Send;

    // -- Relationships --------------------------------------------------------

    fn create_relationship(
        &self,
        relationship: &Relationship,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Outgoing edges of one record.
    fn list_relationships(
        &self,
        source_type: &str,
        source_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Relationship>, RepositoryError>> + Send;

    // -- Inspection -----------------------------------------------------------

    /// Number of rows backing an entity label.
    fn count(
        &self,
        entity: Entity,
    ) -> impl std::future::Future<Output = Result<i64, RepositoryError>> + Send;

    /// Passthrough read-only query with positional `?` arguments.
    ///
    /// Arguments are JSON scalars (string, number, bool, null).
    fn query(
        &self,
        sql: &str,
        args: &[Value],
    ) -> impl std::future::Future<Output = Result<QueryRows, RepositoryError>> + Send;
}
