//! In-memory `GraphRepository` used by executor and translator tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde_json::Value;

use medallion_types::error::RepositoryError;
use medallion_types::graph::{
    Agent, Artifact, Claim, Entity, QueryRows, Relationship, Run, RunStatus, Span, SpanStatus,
};

use super::graph::GraphRepository;

#[derive(Default)]
struct State {
    agents: Vec<Agent>,
    runs: Vec<Run>,
    artifacts: Vec<Artifact>,
    claims: Vec<Claim>,
    spans: Vec<Span>,
    relationships: Vec<Relationship>,
}

#[derive(Default)]
pub(crate) struct InMemoryGraphRepository {
    state: Mutex<State>,
    pub fail_artifacts: AtomicBool,
    pub fail_spans: AtomicBool,
}

impl InMemoryGraphRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agents(agents: Vec<Agent>) -> Self {
        let repo = Self::new();
        repo.state.lock().unwrap().agents = agents;
        repo
    }

    pub fn fail_artifact_writes(&self) {
        self.fail_artifacts.store(true, Ordering::SeqCst);
    }

    pub fn runs(&self) -> Vec<Run> {
        self.state.lock().unwrap().runs.clone()
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.state.lock().unwrap().artifacts.clone()
    }

    pub fn spans(&self) -> Vec<Span> {
        self.state.lock().unwrap().spans.clone()
    }
}

impl GraphRepository for InMemoryGraphRepository {
    async fn create_agent(&self, agent: &Agent) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        if state.agents.iter().any(|a| a.id == agent.id) {
            return Err(RepositoryError::Conflict(format!(
                "agent '{}' already exists",
                agent.id
            )));
        }
        state.agents.push(agent.clone());
        Ok(())
    }

    async fn get_agent(&self, id: &str) -> Result<Agent, RepositoryError> {
        let state = self.state.lock().unwrap();
        state
            .agents
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("agent", id))
    }

    async fn get_agent_by_name(&self, name: &str) -> Result<Agent, RepositoryError> {
        let state = self.state.lock().unwrap();
        state
            .agents
            .iter()
            .find(|a| a.name == name)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("agent", name))
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, RepositoryError> {
        Ok(self.state.lock().unwrap().agents.clone())
    }

    async fn create_run(&self, run: &Run) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        if state.runs.iter().any(|r| r.id == run.id) {
            return Err(RepositoryError::Conflict(format!(
                "run '{}' already exists",
                run.id
            )));
        }
        state.runs.push(run.clone());
        Ok(())
    }

    async fn get_run(&self, id: &str) -> Result<Run, RepositoryError> {
        let state = self.state.lock().unwrap();
        state
            .runs
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("run", id))
    }

    async fn list_runs(&self, limit: i64) -> Result<Vec<Run>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .runs
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        output_data: &Value,
        error_message: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or_else(|| RepositoryError::not_found("run", run_id))?;
        if run.status != RunStatus::Running {
            return Err(RepositoryError::Conflict(format!(
                "run '{run_id}' is already {}",
                run.status
            )));
        }
        let completed_at = Utc::now().max(run.started_at);
        run.status = status;
        run.output_data = output_data.clone();
        run.error_message = error_message.map(str::to_string);
        run.completed_at = Some(completed_at);
        run.duration_ms = Some((completed_at - run.started_at).num_milliseconds());
        Ok(())
    }

    async fn create_artifact(&self, artifact: &Artifact) -> Result<(), RepositoryError> {
        if self.fail_artifacts.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("disk I/O error".to_string()));
        }
        self.state.lock().unwrap().artifacts.push(artifact.clone());
        Ok(())
    }

    async fn list_artifacts(&self, run_id: &str) -> Result<Vec<Artifact>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .artifacts
            .iter()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn create_claim(&self, claim: &Claim) -> Result<(), RepositoryError> {
        self.state.lock().unwrap().claims.push(claim.clone());
        Ok(())
    }

    async fn list_claims(&self, run_id: &str) -> Result<Vec<Claim>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .claims
            .iter()
            .filter(|c| c.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn create_span(&self, span: &Span) -> Result<(), RepositoryError> {
        if self.fail_spans.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("disk I/O error".to_string()));
        }
        self.state.lock().unwrap().spans.push(span.clone());
        Ok(())
    }

    async fn update_span(
        &self,
        id: &str,
        end_time: DateTime<Utc>,
        status: SpanStatus,
        metadata: &Value,
    ) -> Result<(), RepositoryError> {
        if self.fail_spans.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("disk I/O error".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let span = state
            .spans
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| RepositoryError::not_found("span", id))?;
        span.end_time = Some(end_time);
        span.duration_ms = Some((end_time - span.start_time).num_milliseconds().max(0));
        span.status = status;
        span.metadata = metadata.clone();
        Ok(())
    }

    async fn list_spans(&self, run_id: &str) -> Result<Vec<Span>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .spans
            .iter()
            .filter(|s| s.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn create_relationship(
        &self,
        relationship: &Relationship,
    ) -> Result<(), RepositoryError> {
        self.state
            .lock()
            .unwrap()
            .relationships
            .push(relationship.clone());
        Ok(())
    }

    async fn list_relationships(
        &self,
        source_type: &str,
        source_id: &str,
    ) -> Result<Vec<Relationship>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .relationships
            .iter()
            .filter(|r| r.source_type == source_type && r.source_id == source_id)
            .cloned()
            .collect())
    }

    async fn count(&self, entity: Entity) -> Result<i64, RepositoryError> {
        let state = self.state.lock().unwrap();
        let n = match entity {
            Entity::Agent => state.agents.len(),
            Entity::Run => state.runs.len(),
            Entity::Artifact => state.artifacts.len(),
            Entity::Claim => state.claims.len(),
        };
        Ok(n as i64)
    }

    async fn query(&self, sql: &str, _args: &[Value]) -> Result<QueryRows, RepositoryError> {
        Err(RepositoryError::Query(format!(
            "raw queries are not supported in memory: {sql}"
        )))
    }
}
