//! Workflow executor: scan-based, one step at a time, persisted to the graph.
//!
//! The `DagExecutor` drives a `WorkflowDefinition` to a terminal state against
//! a `GraphRepository` and a fixed `ProviderRegistry`.
//!
//! # Execution flow
//!
//! 1. Create the `Run` row (`running`) before any step executes.
//! 2. Scan the not-yet-executed steps in declaration order; a step whose
//!    dependencies have all executed runs immediately, so later steps in the
//!    same pass already see it as executed.
//! 3. Each step: resolve agent -> render input -> look up provider ->
//!    generate (raced against cancellation) -> best-effort artifact.
//! 4. A pass that runs nothing while steps remain is a stall.
//! 5. The first step failure or a stall marks the run `failed`; otherwise it
//!    is marked `completed` with the step-name -> output map as its output.
//!
//! Run and step tracing spans are persisted alongside, best-effort like
//! artifacts. Best-effort write failures are logged and counted in
//! [`ExecutorStats`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use medallion_types::error::RepositoryError;
use medallion_types::graph::{
    Agent, Artifact, Run, RunStatus, Span, SpanStatus, TEXT_PLAIN, prefixed_id,
};
use medallion_types::llm::{GenerateRequest, GenerateResponse, GenerationDefaults, LlmError};
use medallion_types::workflow::{
    ExecutionResult, StepDefinition, StepResult, StepStatus, WorkflowDefinition,
};

use crate::llm::registry::ProviderRegistry;
use crate::repository::graph::GraphRepository;

use super::definition::{WorkflowError, validate_definition};
use super::template::{PlaceholderRenderer, TemplateBindings, TemplateRenderer};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a single step failed. Always names the step, and the agent/provider
/// where they are known.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("step '{step}': agent '{agent}' could not be resolved: {source}")]
    AgentLookup {
        step: String,
        agent: String,
        #[source]
        source: RepositoryError,
    },

    #[error("step '{step}': provider '{provider}' for agent '{agent}' is not registered")]
    ProviderNotRegistered {
        step: String,
        agent: String,
        provider: String,
    },

    #[error("step '{step}': generation failed (agent '{agent}', provider '{provider}'): {source}")]
    Generation {
        step: String,
        agent: String,
        provider: String,
        #[source]
        source: LlmError,
    },

    #[error("step '{step}' cancelled")]
    Cancelled { step: String },
}

impl StepError {
    pub fn step(&self) -> &str {
        match self {
            StepError::AgentLookup { step, .. }
            | StepError::ProviderNotRegistered { step, .. }
            | StepError::Generation { step, .. }
            | StepError::Cancelled { step } => step,
        }
    }
}

/// Run-level failures.
///
/// `Stalled` (bad dependency graph) and `StepFailed` (a step's own failure)
/// are distinct so callers can tell them apart. Both carry the partial
/// result gathered before the run stopped.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The definition is structurally invalid; no run was created.
    #[error("invalid workflow: {0}")]
    Definition(#[from] WorkflowError),

    /// The run row could not be created; no step executed.
    #[error("failed to create run '{run_id}': {source}")]
    RunSetup {
        run_id: String,
        #[source]
        source: RepositoryError,
    },

    #[error("workflow '{workflow}' stalled in run '{run_id}': {reason}")]
    Stalled {
        run_id: String,
        workflow: String,
        /// Steps that never became runnable, in declaration order.
        pending: Vec<String>,
        reason: String,
        result: Box<ExecutionResult>,
    },

    #[error("run '{run_id}' failed: {source}")]
    StepFailed {
        run_id: String,
        #[source]
        source: StepError,
        result: Box<ExecutionResult>,
    },

    /// Every step completed but the terminal status could not be written.
    #[error("run '{run_id}' completed but its status could not be recorded: {source}")]
    Persistence {
        run_id: String,
        #[source]
        source: RepositoryError,
        result: Box<ExecutionResult>,
    },
}

impl ExecutorError {
    pub fn run_id(&self) -> Option<&str> {
        match self {
            ExecutorError::Definition(_) => None,
            ExecutorError::RunSetup { run_id, .. }
            | ExecutorError::Stalled { run_id, .. }
            | ExecutorError::StepFailed { run_id, .. }
            | ExecutorError::Persistence { run_id, .. } => Some(run_id),
        }
    }

    /// What had been executed when the run stopped.
    pub fn partial_result(&self) -> Option<&ExecutionResult> {
        match self {
            ExecutorError::Stalled { result, .. }
            | ExecutorError::StepFailed { result, .. }
            | ExecutorError::Persistence { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn is_stall(&self) -> bool {
        matches!(self, ExecutorError::Stalled { .. })
    }
}

// ---------------------------------------------------------------------------
// Options and stats
// ---------------------------------------------------------------------------

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Caller-chosen run id; `run_<uuid v7>` when absent.
    pub run_id: Option<String>,
}

/// Counters shared by every run of one executor.
#[derive(Debug, Default)]
pub struct ExecutorStats {
    runs_started: AtomicU64,
    artifact_write_failures: AtomicU64,
    span_write_failures: AtomicU64,
}

/// Point-in-time copy of [`ExecutorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub runs_started: u64,
    pub artifact_write_failures: u64,
    pub span_write_failures: u64,
}

impl ExecutorStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            artifact_write_failures: self.artifact_write_failures.load(Ordering::Relaxed),
            span_write_failures: self.span_write_failures.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-run state
// ---------------------------------------------------------------------------

struct RunState {
    run_id: String,
    workflow_name: String,
    started_at: DateTime<Utc>,
    run_span_id: Option<String>,
    executed: HashSet<String>,
    execution_order: Vec<String>,
    steps: BTreeMap<String, StepResult>,
    outputs: HashMap<String, String>,
}

impl RunState {
    fn record_success(&mut self, result: StepResult) {
        self.executed.insert(result.name.clone());
        self.execution_order.push(result.name.clone());
        self.outputs.insert(result.name.clone(), result.output.clone());
        self.steps.insert(result.name.clone(), result);
    }

    /// Aggregate run output: step name -> output text, in execution order.
    fn output(&self) -> Map<String, Value> {
        self.execution_order
            .iter()
            .filter_map(|name| {
                self.outputs
                    .get(name)
                    .map(|out| (name.clone(), Value::String(out.clone())))
            })
            .collect()
    }

    fn into_result(self, status: RunStatus, error: Option<String>) -> ExecutionResult {
        let output = self.output();
        let completed_at = Utc::now().max(self.started_at);
        ExecutionResult {
            run_id: self.run_id,
            workflow_name: self.workflow_name,
            status,
            started_at: self.started_at,
            completed_at,
            duration_ms: (completed_at - self.started_at).num_milliseconds(),
            steps: self.steps,
            execution_order: self.execution_order,
            output,
            error,
        }
    }
}

// ---------------------------------------------------------------------------
// DagExecutor
// ---------------------------------------------------------------------------

/// Sequential dependency-ordered executor.
///
/// Generic over `R: GraphRepository` for storage flexibility. The provider
/// registry is fixed at construction; one executor may serve concurrent runs.
pub struct DagExecutor<R: GraphRepository> {
    repo: Arc<R>,
    providers: Arc<ProviderRegistry>,
    renderer: Arc<dyn TemplateRenderer>,
    generation: GenerationDefaults,
    stats: ExecutorStats,
}

impl<R: GraphRepository> DagExecutor<R> {
    pub fn new(repo: Arc<R>, providers: Arc<ProviderRegistry>) -> Self {
        Self {
            repo,
            providers,
            renderer: Arc::new(PlaceholderRenderer),
            generation: GenerationDefaults::default(),
            stats: ExecutorStats::default(),
        }
    }

    /// Replace the built-in placeholder renderer.
    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Sampling settings for every step request.
    pub fn with_generation_defaults(mut self, generation: GenerationDefaults) -> Self {
        self.generation = generation;
        self
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Execute a workflow from the beginning.
    ///
    /// `variables` override the definition's own `variables` for templating
    /// and are stored as the run's input data. `cancel` is checked before
    /// each step and raced against every provider call.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        variables: BTreeMap<String, Value>,
        options: ExecuteOptions,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutorError> {
        validate_definition(definition)?;

        let run_id = options.run_id.unwrap_or_else(|| prefixed_id("run"));
        let span = tracing::info_span!(
            "workflow_run",
            run_id = %run_id,
            workflow = %definition.name,
        );
        self.execute_run(definition, variables, run_id, cancel)
            .instrument(span)
            .await
    }

    async fn execute_run(
        &self,
        definition: &WorkflowDefinition,
        variables: BTreeMap<String, Value>,
        run_id: String,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutorError> {
        let mut bindings = definition.variables.clone();
        bindings.extend(variables.iter().map(|(k, v)| (k.clone(), v.clone())));

        let metadata = json!({
            "description": definition.description,
            "agents": definition.agents,
            "variables": definition.variables,
            "steps": definition.steps.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        });
        let run = Run::start(
            run_id.clone(),
            definition.name.clone(),
            Value::Object(variables.into_iter().collect()),
            metadata,
        );

        self.repo
            .create_run(&run)
            .await
            .map_err(|source| ExecutorError::RunSetup {
                run_id: run_id.clone(),
                source,
            })?;
        self.stats.runs_started.fetch_add(1, Ordering::Relaxed);

        tracing::info!(steps = definition.steps.len(), "starting workflow run");

        let run_span_id = self
            .open_span(Span::open(
                &run_id,
                None,
                format!("workflow.{}", definition.name),
            ))
            .await;

        let mut state = RunState {
            run_id,
            workflow_name: definition.name.clone(),
            started_at: run.started_at,
            run_span_id,
            executed: HashSet::new(),
            execution_order: Vec::with_capacity(definition.steps.len()),
            steps: BTreeMap::new(),
            outputs: HashMap::new(),
        };

        while state.executed.len() < definition.steps.len() {
            let mut progress = false;

            for step in &definition.steps {
                if state.executed.contains(&step.name) {
                    continue;
                }
                if !step.depends_on.iter().all(|d| state.executed.contains(d)) {
                    continue;
                }

                let started_at = Utc::now();
                let input = self.renderer.render(
                    &step.input,
                    &TemplateBindings {
                        variables: &bindings,
                        outputs: &state.outputs,
                    },
                );

                let step_span = tracing::info_span!(
                    "workflow_step",
                    step = %step.name,
                    agent = %step.agent,
                );
                let outcome = self
                    .run_step(&state, step, &input, cancel)
                    .instrument(step_span)
                    .await;

                match outcome {
                    Ok(result) => {
                        state.record_success(result);
                        progress = true;
                    }
                    Err(error) => {
                        let completed_at = Utc::now();
                        let mut metadata = Map::new();
                        if let Some(when) = &step.success_when {
                            metadata.insert("success_when".into(), Value::String(when.clone()));
                        }
                        state.steps.insert(
                            step.name.clone(),
                            StepResult {
                                name: step.name.clone(),
                                agent: step.agent.clone(),
                                status: StepStatus::Failed,
                                input,
                                output: String::new(),
                                started_at,
                                completed_at,
                                duration_ms: (completed_at - started_at).num_milliseconds(),
                                error: Some(error.to_string()),
                                metadata,
                            },
                        );
                        return Err(self.fail_run(state, error).await);
                    }
                }
            }

            if !progress {
                return Err(self.stall(definition, state).await);
            }
        }

        self.complete_run(state).await
    }

    // -- Step -----------------------------------------------------------------

    async fn run_step(
        &self,
        state: &RunState,
        step: &StepDefinition,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<StepResult, StepError> {
        let started_at = Utc::now();
        let span_id = self
            .open_span(Span::open(
                &state.run_id,
                state.run_span_id.clone(),
                format!("step.{}", step.name),
            ))
            .await;

        let outcome = self.generate(&state.run_id, step, input, cancel).await;
        let completed_at = Utc::now();

        let (agent, response) = match outcome {
            Ok(ok) => ok,
            Err(error) => {
                self.close_span(
                    span_id.as_deref(),
                    completed_at,
                    SpanStatus::Error,
                    json!({ "error": error.to_string() }),
                )
                .await;
                tracing::warn!(error = %error, "step failed");
                return Err(error);
            }
        };

        let mut metadata = Map::new();
        metadata.insert("tokens_used".into(), json!(response.tokens_used));
        metadata.insert("finish_reason".into(), json!(response.finish_reason));
        metadata.insert("agent_id".into(), json!(agent.id));
        metadata.insert("provider".into(), json!(agent.model_provider));
        metadata.insert("model".into(), json!(agent.model_name));
        if !response.metadata.is_empty() {
            metadata.insert("provider_metadata".into(), json!(response.metadata));
        }
        if let Some(when) = &step.success_when {
            metadata.insert("success_when".into(), Value::String(when.clone()));
        }

        if let Some(artifact_id) = self
            .persist_artifact(&state.run_id, step, &agent, &response, &metadata)
            .await
        {
            metadata.insert("artifact_id".into(), Value::String(artifact_id));
        }

        self.close_span(
            span_id.as_deref(),
            completed_at,
            SpanStatus::Ok,
            json!({
                "agent_id": agent.id,
                "tokens_used": response.tokens_used,
                "finish_reason": response.finish_reason,
            }),
        )
        .await;

        let duration_ms = (completed_at - started_at).num_milliseconds();
        tracing::info!(
            tokens_used = response.tokens_used,
            duration_ms,
            "step completed"
        );

        Ok(StepResult {
            name: step.name.clone(),
            agent: step.agent.clone(),
            status: StepStatus::Completed,
            input: input.to_string(),
            output: response.text,
            started_at,
            completed_at,
            duration_ms,
            error: None,
            metadata,
        })
    }

    /// Agent lookup, provider lookup and the (cancellable) provider call.
    async fn generate(
        &self,
        run_id: &str,
        step: &StepDefinition,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<(Agent, GenerateResponse), StepError> {
        if cancel.is_cancelled() {
            return Err(StepError::Cancelled {
                step: step.name.clone(),
            });
        }

        let agent = self
            .resolve_agent(&step.agent)
            .await
            .map_err(|source| StepError::AgentLookup {
                step: step.name.clone(),
                agent: step.agent.clone(),
                source,
            })?;

        let provider = self.providers.get(&agent.model_provider).ok_or_else(|| {
            StepError::ProviderNotRegistered {
                step: step.name.clone(),
                agent: agent.name.clone(),
                provider: agent.model_provider.clone(),
            }
        })?;

        let request = GenerateRequest {
            prompt: input.to_string(),
            system_prompt: agent.system_prompt.clone(),
            max_tokens: self.generation.max_tokens,
            temperature: self.generation.temperature,
            top_p: self.generation.top_p,
            stop: Vec::new(),
            metadata: BTreeMap::from([
                ("run_id".to_string(), run_id.to_string()),
                ("step".to_string(), step.name.clone()),
                ("agent_id".to_string(), agent.id.clone()),
            ]),
        };

        tracing::debug!(
            provider = %agent.model_provider,
            model = %agent.model_name,
            prompt_len = request.prompt.len(),
            "invoking provider"
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(StepError::Cancelled { step: step.name.clone() });
            }
            result = provider.generate(&request) => result,
        };

        let response = result.map_err(|source| StepError::Generation {
            step: step.name.clone(),
            agent: agent.name.clone(),
            provider: agent.model_provider.clone(),
            source,
        })?;

        Ok((agent, response))
    }

    /// A step's `agent` is an id first, a name second.
    async fn resolve_agent(&self, reference: &str) -> Result<Agent, RepositoryError> {
        match self.repo.get_agent(reference).await {
            Ok(agent) => Ok(agent),
            Err(e) if e.is_not_found() => self.repo.get_agent_by_name(reference).await,
            Err(e) => Err(e),
        }
    }

    // -- Best-effort writes ---------------------------------------------------

    async fn persist_artifact(
        &self,
        run_id: &str,
        step: &StepDefinition,
        agent: &Agent,
        response: &GenerateResponse,
        metadata: &Map<String, Value>,
    ) -> Option<String> {
        let artifact = Artifact {
            id: prefixed_id("art"),
            run_id: run_id.to_string(),
            step_name: step.name.clone(),
            agent_id: agent.id.clone(),
            content: response.text.clone(),
            content_type: TEXT_PLAIN.to_string(),
            metadata: Value::Object(metadata.clone()),
            created_at: Utc::now(),
        };

        match self.repo.create_artifact(&artifact).await {
            Ok(()) => Some(artifact.id),
            Err(e) => {
                self.stats
                    .artifact_write_failures
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "failed to persist artifact; step result kept");
                None
            }
        }
    }

    async fn open_span(&self, span: Span) -> Option<String> {
        match self.repo.create_span(&span).await {
            Ok(()) => Some(span.id),
            Err(e) => {
                self.stats.span_write_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(span = %span.name, error = %e, "failed to persist span");
                None
            }
        }
    }

    async fn close_span(
        &self,
        span_id: Option<&str>,
        end_time: DateTime<Utc>,
        status: SpanStatus,
        metadata: Value,
    ) {
        let Some(id) = span_id else { return };
        if let Err(e) = self.repo.update_span(id, end_time, status, &metadata).await {
            self.stats.span_write_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(span_id = id, error = %e, "failed to close span");
        }
    }

    // -- Terminal transitions -------------------------------------------------

    async fn complete_run(&self, state: RunState) -> Result<ExecutionResult, ExecutorError> {
        let output = Value::Object(state.output());
        let recorded = self
            .repo
            .update_run_status(&state.run_id, RunStatus::Completed, &output, None)
            .await;

        self.close_span(
            state.run_span_id.as_deref(),
            Utc::now(),
            SpanStatus::Ok,
            json!({ "steps_completed": state.execution_order.len() }),
        )
        .await;

        let result = state.into_result(RunStatus::Completed, None);
        match recorded {
            Ok(()) => {
                tracing::info!(duration_ms = result.duration_ms, "workflow run completed");
                Ok(result)
            }
            Err(source) => {
                tracing::error!(error = %source, "failed to record run completion");
                Err(ExecutorError::Persistence {
                    run_id: result.run_id.clone(),
                    source,
                    result: Box::new(result),
                })
            }
        }
    }

    async fn fail_run(&self, state: RunState, error: StepError) -> ExecutorError {
        let message = error.to_string();
        self.record_failure(&state, &message).await;
        tracing::warn!(step = error.step(), error = %message, "workflow run failed");

        let result = state.into_result(RunStatus::Failed, Some(message));
        ExecutorError::StepFailed {
            run_id: result.run_id.clone(),
            source: error,
            result: Box::new(result),
        }
    }

    async fn stall(&self, definition: &WorkflowDefinition, state: RunState) -> ExecutorError {
        let known: HashSet<&str> = definition.steps.iter().map(|s| s.name.as_str()).collect();
        let waiting: Vec<&StepDefinition> = definition
            .steps
            .iter()
            .filter(|s| !state.executed.contains(&s.name))
            .collect();

        let details: Vec<String> = waiting
            .iter()
            .map(|s| {
                let unmet: Vec<String> = s
                    .depends_on
                    .iter()
                    .filter(|d| !state.executed.contains(*d))
                    .map(|d| {
                        if known.contains(d.as_str()) {
                            format!("'{d}'")
                        } else {
                            format!("'{d}' (no such step)")
                        }
                    })
                    .collect();
                format!("'{}' waits on {}", s.name, unmet.join(", "))
            })
            .collect();
        let reason = format!(
            "no runnable step remains (cyclic or missing dependency): {}",
            details.join("; ")
        );
        let pending: Vec<String> = waiting.iter().map(|s| s.name.clone()).collect();

        let message = format!("workflow stalled: {reason}");
        self.record_failure(&state, &message).await;
        tracing::warn!(pending = ?pending, "workflow run stalled");

        let result = state.into_result(RunStatus::Failed, Some(message));
        ExecutorError::Stalled {
            run_id: result.run_id.clone(),
            workflow: definition.name.clone(),
            pending,
            reason,
            result: Box::new(result),
        }
    }

    /// Persist `failed` and close the run span. Write errors are logged only:
    /// the caller is already returning the more important error.
    async fn record_failure(&self, state: &RunState, message: &str) {
        let output = Value::Object(state.output());
        if let Err(e) = self
            .repo
            .update_run_status(&state.run_id, RunStatus::Failed, &output, Some(message))
            .await
        {
            tracing::error!(error = %e, "failed to record run failure");
        }

        self.close_span(
            state.run_span_id.as_deref(),
            Utc::now(),
            SpanStatus::Error,
            json!({
                "error": message,
                "steps_completed": state.execution_order.len(),
            }),
        )
        .await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::llm::box_provider::BoxLlmProvider;
    use crate::llm::provider::LlmProvider;
    use crate::repository::memory::InMemoryGraphRepository;
    use crate::workflow::definition::parse_workflow_yaml;
    use medallion_types::llm::ModelInfo;

    // --- Stub provider ---

    #[derive(Clone)]
    enum Behavior {
        /// First entry whose key prefixes the prompt supplies the output.
        Table(Vec<(String, String)>),
        Fail,
        Hang,
    }

    struct StubProvider {
        behavior: Behavior,
        calls: Arc<Mutex<Vec<GenerateRequest>>>,
    }

    impl LlmProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn model_info(&self) -> ModelInfo {
            ModelInfo {
                name: "stub-1".to_string(),
                provider: "stub".to_string(),
                max_tokens: 1000,
                context_size: 4096,
                supports_embeddings: false,
            }
        }

        async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
            self.calls.lock().unwrap().push(request.clone());
            match &self.behavior {
                Behavior::Table(table) => {
                    let text = table
                        .iter()
                        .find(|(prefix, _)| request.prompt.starts_with(prefix.as_str()))
                        .map(|(_, out)| out.clone())
                        .unwrap_or_else(|| format!("ECHO:{}", request.prompt));
                    Ok(GenerateResponse {
                        text,
                        tokens_used: 7,
                        finish_reason: "stop".to_string(),
                        metadata: BTreeMap::new(),
                    })
                }
                Behavior::Fail => Err(LlmError::Http {
                    status: 500,
                    body: "boom".to_string(),
                }),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Err(LlmError::Request("unreachable".to_string()))
                }
            }
        }

        async fn get_embedding(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            Err(LlmError::Unsupported("embeddings".to_string()))
        }
    }

    fn agent(id: &str, provider: &str) -> Agent {
        let now = Utc::now();
        Agent {
            id: id.to_string(),
            name: id.to_string(),
            agent_type: "worker".to_string(),
            description: String::new(),
            model_provider: provider.to_string(),
            model_name: "stub-1".to_string(),
            system_prompt: format!("You are {id}."),
            created_at: now,
            updated_at: now,
        }
    }

    fn research_table() -> Behavior {
        Behavior::Table(vec![
            ("Plan".to_string(), "PLAN_OUT".to_string()),
            ("Research".to_string(), "RESEARCH_OUT".to_string()),
            ("Write".to_string(), "WRITE_OUT".to_string()),
        ])
    }

    struct Harness {
        executor: DagExecutor<InMemoryGraphRepository>,
        repo: Arc<InMemoryGraphRepository>,
        calls: Arc<Mutex<Vec<GenerateRequest>>>,
    }

    fn harness(behavior: Behavior) -> Harness {
        let repo = Arc::new(InMemoryGraphRepository::with_agents(vec![
            agent("planner", "stub"),
            agent("researcher", "stub"),
            agent("writer", "stub"),
            agent("orphan", "missing-provider"),
        ]));
        let calls = Arc::new(Mutex::new(Vec::new()));
        let registry = ProviderRegistry::new().with(
            "stub",
            BoxLlmProvider::new(StubProvider {
                behavior,
                calls: Arc::clone(&calls),
            }),
        );
        Harness {
            executor: DagExecutor::new(Arc::clone(&repo), Arc::new(registry)),
            repo,
            calls,
        }
    }

    const RESEARCH_YAML: &str = r#"
name: research-report
variables:
  topic: rust async
steps:
  - name: plan
    agent: planner
    input: "Plan a report on {{.topic}}"
  - name: research
    agent: researcher
    input: "Research this plan: {{.plan.output}}"
    depends_on: [plan]
  - name: write
    agent: writer
    input: "Write up: {{.research.output}}"
    depends_on: [research]
    success_when: "len(output) > 0"
"#;

    async fn run(h: &Harness, yaml: &str) -> Result<ExecutionResult, ExecutorError> {
        let def = parse_workflow_yaml(yaml).unwrap();
        h.executor
            .execute(
                &def,
                BTreeMap::new(),
                ExecuteOptions::default(),
                &CancellationToken::new(),
            )
            .await
    }

    #[tokio::test]
    async fn plan_research_write_completes_in_order() {
        let h = harness(research_table());
        let result = run(&h, RESEARCH_YAML).await.unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.execution_order, vec!["plan", "research", "write"]);
        assert!(result.steps["research"].input.contains("PLAN_OUT"));
        assert!(result.steps["write"].input.contains("RESEARCH_OUT"));
        assert_eq!(result.steps["plan"].input, "Plan a report on rust async");
        assert_eq!(result.output["write"], json!("WRITE_OUT"));
        assert!(result.run_id.starts_with("run_"));
        assert!(result.completed_at >= result.started_at);

        // success_when is surfaced, never evaluated
        assert_eq!(
            result.steps["write"].metadata["success_when"],
            json!("len(output) > 0")
        );
        assert_eq!(result.steps["plan"].metadata["tokens_used"], json!(7));
        assert_eq!(result.steps["plan"].metadata["finish_reason"], json!("stop"));

        let runs = h.repo.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Completed);
        assert_eq!(runs[0].output_data["plan"], json!("PLAN_OUT"));
        assert!(runs[0].completed_at.unwrap() >= runs[0].started_at);

        let artifacts = h.repo.artifacts();
        assert_eq!(artifacts.len(), 3);
        assert_eq!(artifacts[0].step_name, "plan");
        assert_eq!(artifacts[0].agent_id, "planner");
        assert_eq!(artifacts[0].content, "PLAN_OUT");
        assert_eq!(artifacts[0].content_type, TEXT_PLAIN);
        assert!(artifacts.iter().all(|a| a.id.starts_with("art_")));
    }

    /// Leaves placeholders alone and tags each input with how many step
    /// outputs were visible when it was rendered.
    struct TaggingRenderer;

    impl TemplateRenderer for TaggingRenderer {
        fn render(&self, template: &str, bindings: &TemplateBindings<'_>) -> String {
            format!("[{}] {template}", bindings.outputs.len())
        }
    }

    #[tokio::test]
    async fn custom_renderer_replaces_placeholder_substitution() {
        let h = harness(research_table());
        let h = Harness {
            executor: h.executor.with_renderer(Arc::new(TaggingRenderer)),
            ..h
        };
        let result = run(&h, RESEARCH_YAML).await.unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.steps["plan"].input, "[0] Plan a report on {{.topic}}");
        assert_eq!(
            result.steps["research"].input,
            "[1] Research this plan: {{.plan.output}}"
        );
        assert_eq!(result.steps["write"].input, "[2] Write up: {{.research.output}}");

        let calls = h.calls.lock().unwrap();
        assert_eq!(calls[0].prompt, "[0] Plan a report on {{.topic}}");
    }

    #[tokio::test]
    async fn provider_receives_agent_system_prompt_and_defaults() {
        let h = harness(research_table());
        run(&h, RESEARCH_YAML).await.unwrap();

        let calls = h.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].system_prompt, "You are planner.");
        assert_eq!(calls[0].max_tokens, 1000);
        assert!((calls[0].temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(calls[1].metadata["step"], "research");
    }

    #[tokio::test]
    async fn caller_variables_override_definition_variables() {
        let h = harness(research_table());
        let def = parse_workflow_yaml(RESEARCH_YAML).unwrap();
        let vars = BTreeMap::from([("topic".to_string(), json!("databases"))]);
        let result = h
            .executor
            .execute(
                &def,
                vars,
                ExecuteOptions {
                    run_id: Some("run-fixed".to_string()),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.run_id, "run-fixed");
        assert_eq!(result.steps["plan"].input, "Plan a report on databases");
        assert_eq!(h.repo.runs()[0].input_data["topic"], json!("databases"));
    }

    #[tokio::test]
    async fn persists_run_and_step_spans() {
        let h = harness(research_table());
        let result = run(&h, RESEARCH_YAML).await.unwrap();

        let spans = h.repo.spans();
        assert_eq!(spans.len(), 4);
        let root = spans
            .iter()
            .find(|s| s.name == "workflow.research-report")
            .unwrap();
        assert!(root.parent_span_id.is_none());
        assert_eq!(root.status, SpanStatus::Ok);
        assert!(root.end_time.is_some());

        for name in ["step.plan", "step.research", "step.write"] {
            let span = spans.iter().find(|s| s.name == name).unwrap();
            assert_eq!(span.parent_span_id.as_deref(), Some(root.id.as_str()));
            assert_eq!(span.run_id, result.run_id);
            assert_eq!(span.status, SpanStatus::Ok);
            assert_eq!(span.metadata["tokens_used"], json!(7));
        }
    }

    #[tokio::test]
    async fn cycle_stalls_with_zero_steps_and_failed_run() {
        let h = harness(research_table());
        let yaml = r#"
name: cyclic
steps:
  - name: a
    agent: planner
    depends_on: [b]
  - name: b
    agent: planner
    depends_on: [a]
"#;
        let err = run(&h, yaml).await.unwrap_err();
        assert!(err.is_stall());
        match &err {
            ExecutorError::Stalled { pending, result, .. } => {
                assert_eq!(pending, &vec!["a".to_string(), "b".to_string()]);
                assert!(result.execution_order.is_empty());
                assert_eq!(result.status, RunStatus::Failed);
            }
            other => panic!("expected stall, got {other}"),
        }

        assert!(h.calls.lock().unwrap().is_empty());
        assert!(h.repo.artifacts().is_empty());
        let runs = h.repo.runs();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].error_message.as_deref().unwrap().contains("stalled"));
        assert!(runs[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn missing_dependency_stalls_after_runnable_steps() {
        let h = harness(research_table());
        let yaml = r#"
name: dangling
steps:
  - name: plan
    agent: planner
    input: "Plan it"
  - name: write
    agent: writer
    depends_on: [plan, review]
"#;
        let err = run(&h, yaml).await.unwrap_err();
        match &err {
            ExecutorError::Stalled {
                pending, reason, result, ..
            } => {
                assert_eq!(pending, &vec!["write".to_string()]);
                assert!(reason.contains("'review' (no such step)"));
                assert_eq!(result.execution_order, vec!["plan"]);
            }
            other => panic!("expected stall, got {other}"),
        }
        assert_eq!(h.repo.artifacts().len(), 1);
        assert_eq!(h.repo.runs()[0].status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn unregistered_provider_fails_run_with_names() {
        let h = harness(research_table());
        let yaml = r#"
name: orphaned
steps:
  - name: only
    agent: orphan
    input: "hi"
"#;
        let err = run(&h, yaml).await.unwrap_err();
        assert!(!err.is_stall());
        match &err {
            ExecutorError::StepFailed { source, result, .. } => {
                assert!(matches!(source, StepError::ProviderNotRegistered { .. }));
                assert_eq!(result.steps["only"].status, StepStatus::Failed);
            }
            other => panic!("expected step failure, got {other}"),
        }
        let msg = err.to_string();
        assert!(msg.contains("missing-provider"));
        assert!(msg.contains("orphan"));

        let runs = h.repo.runs();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("missing-provider"));
    }

    #[tokio::test]
    async fn unknown_agent_fails_step() {
        let h = harness(research_table());
        let yaml = "name: w\nsteps:\n  - name: s\n    agent: nobody\n    input: x\n";
        let err = run(&h, yaml).await.unwrap_err();
        match err {
            ExecutorError::StepFailed { source, .. } => match source {
                StepError::AgentLookup { agent, source, .. } => {
                    assert_eq!(agent, "nobody");
                    assert!(source.is_not_found());
                }
                other => panic!("unexpected step error: {other}"),
            },
            other => panic!("expected step failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn agent_resolved_by_name_when_id_differs() {
        let repo = Arc::new(InMemoryGraphRepository::new());
        let mut named = agent("agent-001", "stub");
        named.name = "planner".to_string();
        repo.create_agent(&named).await.unwrap();

        let calls = Arc::new(Mutex::new(Vec::new()));
        let registry = ProviderRegistry::new().with(
            "stub",
            BoxLlmProvider::new(StubProvider {
                behavior: research_table(),
                calls,
            }),
        );
        let executor = DagExecutor::new(Arc::clone(&repo), Arc::new(registry));
        let def = parse_workflow_yaml(
            "name: w\nsteps:\n  - name: plan\n    agent: planner\n    input: Plan\n",
        )
        .unwrap();
        let result = executor
            .execute(
                &def,
                BTreeMap::new(),
                ExecuteOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.steps["plan"].metadata["agent_id"], json!("agent-001"));
        assert_eq!(repo.artifacts()[0].agent_id, "agent-001");
    }

    #[tokio::test]
    async fn provider_error_aborts_run_without_running_later_steps() {
        let h = harness(Behavior::Fail);
        let err = run(&h, RESEARCH_YAML).await.unwrap_err();
        match &err {
            ExecutorError::StepFailed { source, result, .. } => {
                assert_eq!(source.step(), "plan");
                match source {
                    StepError::Generation { source, .. } => assert_eq!(source.status(), Some(500)),
                    other => panic!("unexpected step error: {other}"),
                }
                assert!(result.execution_order.is_empty());
                assert!(!result.steps.contains_key("research"));
            }
            other => panic!("expected step failure, got {other}"),
        }
        assert!(err.to_string().contains("boom"));
        assert_eq!(h.calls.lock().unwrap().len(), 1);
        assert_eq!(h.repo.runs()[0].status, RunStatus::Failed);

        let spans = h.repo.spans();
        let step_span = spans.iter().find(|s| s.name == "step.plan").unwrap();
        assert_eq!(step_span.status, SpanStatus::Error);
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_call() {
        let h = harness(Behavior::Hang);
        let def = parse_workflow_yaml(RESEARCH_YAML).unwrap();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            h.executor
                .execute(&def, BTreeMap::new(), ExecuteOptions::default(), &cancel),
        )
        .await
        .expect("cancellation should end the run promptly")
        .unwrap_err();

        match err {
            ExecutorError::StepFailed { source, .. } => {
                assert!(matches!(source, StepError::Cancelled { ref step } if step == "plan"));
            }
            other => panic!("expected cancellation, got {other}"),
        }
        assert_eq!(h.repo.runs()[0].status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_no_step() {
        let h = harness(research_table());
        let def = parse_workflow_yaml(RESEARCH_YAML).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = h
            .executor
            .execute(&def, BTreeMap::new(), ExecuteOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::StepFailed {
                source: StepError::Cancelled { .. },
                ..
            }
        ));
        assert!(h.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn artifact_failure_is_not_fatal_and_is_counted() {
        let h = harness(research_table());
        h.repo.fail_artifact_writes();

        let result = run(&h, RESEARCH_YAML).await.unwrap();
        assert_eq!(result.status, RunStatus::Completed);
        assert!(result
            .steps
            .values()
            .all(|s| s.status == StepStatus::Completed));
        assert!(!result.steps["plan"].metadata.contains_key("artifact_id"));
        assert!(h.repo.artifacts().is_empty());

        let stats = h.executor.stats();
        assert_eq!(stats.artifact_write_failures, 3);
        assert_eq!(stats.span_write_failures, 0);
        assert_eq!(stats.runs_started, 1);
    }

    #[tokio::test]
    async fn span_failure_is_not_fatal_and_is_counted() {
        let h = harness(research_table());
        h.repo.fail_spans.store(true, Ordering::SeqCst);

        let result = run(&h, RESEARCH_YAML).await.unwrap();
        assert_eq!(result.status, RunStatus::Completed);
        // 1 run span + 3 step spans failed to open; nothing to close.
        assert_eq!(h.executor.stats().span_write_failures, 4);
    }

    #[tokio::test]
    async fn identical_inputs_give_identical_runs() {
        let h = harness(research_table());
        let first = run(&h, RESEARCH_YAML).await.unwrap();
        let second = run(&h, RESEARCH_YAML).await.unwrap();

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(first.execution_order, second.execution_order);
        assert_eq!(first.output, second.output);
        for name in &first.execution_order {
            assert_eq!(first.steps[name].input, second.steps[name].input);
            assert_eq!(first.steps[name].output, second.steps[name].output);
        }

        let artifacts = h.repo.artifacts();
        let by_run = |run_id: &str| -> Vec<(String, String)> {
            artifacts
                .iter()
                .filter(|a| a.run_id == run_id)
                .map(|a| (a.step_name.clone(), a.content.clone()))
                .collect()
        };
        assert_eq!(by_run(&first.run_id), by_run(&second.run_id));
    }

    #[tokio::test]
    async fn same_pass_ties_follow_declaration_order() {
        let h = harness(research_table());
        let yaml = r#"
name: fan-out
steps:
  - name: root
    agent: planner
  - name: zeta
    agent: researcher
    depends_on: [root]
  - name: alpha
    agent: researcher
    depends_on: [root]
  - name: join
    agent: writer
    depends_on: [alpha, zeta]
    input: "{{.zeta.output}}|{{.alpha.output}}"
  - name: early
    agent: writer
    depends_on: [join]
"#;
        let result = run(&h, yaml).await.unwrap();
        assert_eq!(
            result.execution_order,
            vec!["root", "zeta", "alpha", "join", "early"]
        );
        assert_eq!(result.steps["join"].input, "ECHO:|ECHO:");
    }

    #[tokio::test]
    async fn dependency_declared_later_runs_in_second_pass() {
        let h = harness(research_table());
        let yaml = r#"
name: backwards
steps:
  - name: write
    agent: writer
    input: "Write up: {{.plan.output}}"
    depends_on: [plan]
  - name: plan
    agent: planner
    input: "Plan"
"#;
        let result = run(&h, yaml).await.unwrap();
        assert_eq!(result.execution_order, vec!["plan", "write"]);
        assert_eq!(result.steps["write"].input, "Write up: PLAN_OUT");
    }

    #[tokio::test]
    async fn invalid_definition_creates_no_run() {
        let h = harness(research_table());
        let def = WorkflowDefinition {
            name: "empty".to_string(),
            description: String::new(),
            agents: Vec::new(),
            steps: Vec::new(),
            variables: BTreeMap::new(),
        };
        let err = h
            .executor
            .execute(
                &def,
                BTreeMap::new(),
                ExecuteOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Definition(_)));
        assert!(err.run_id().is_none());
        assert!(h.repo.runs().is_empty());
    }

    #[tokio::test]
    async fn duplicate_run_id_is_setup_error() {
        let h = harness(research_table());
        let def = parse_workflow_yaml(RESEARCH_YAML).unwrap();
        let opts = ExecuteOptions {
            run_id: Some("run-dup".to_string()),
        };
        h.executor
            .execute(&def, BTreeMap::new(), opts.clone(), &CancellationToken::new())
            .await
            .unwrap();
        let err = h
            .executor
            .execute(&def, BTreeMap::new(), opts, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::RunSetup { .. }));
        assert_eq!(err.run_id(), Some("run-dup"));
    }

    #[test]
    fn executor_error_display() {
        let err = StepError::Cancelled {
            step: "gather".to_string(),
        };
        assert_eq!(err.step(), "gather");
        assert!(err.to_string().contains("gather"));
    }
}
