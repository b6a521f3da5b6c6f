//! Workflow definition and run result types.
//!
//! A workflow is a named list of steps; each step is bound to one agent, carries
//! an input template, and declares the steps it depends on. Definitions are
//! consumed (from YAML) by the executor and are not persisted as graph entities.
//! An `ExecutionResult` is what a run hands back to its caller.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::graph::RunStatus;

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

/// A workflow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Agent names the workflow expects to exist. Informational.
    #[serde(default)]
    pub agents: Vec<String>,
    /// Steps in declaration order. Order breaks ties between steps that
    /// become runnable in the same pass.
    pub steps: Vec<StepDefinition>,
    /// Free variables available to every step's input template.
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
}

impl WorkflowDefinition {
    /// Look up a step by name.
    pub fn step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// A single step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Unique within the workflow.
    pub name: String,
    /// Agent id or name.
    pub agent: String,
    /// Input template; `{{.var}}` and `{{.step.output}}` placeholders are filled in.
    #[serde(default)]
    pub input: String,
    #[serde(default, alias = "dependsOn")]
    pub depends_on: Vec<String>,
    /// Advisory success predicate. Accepted and recorded, never evaluated.
    #[serde(
        default,
        alias = "successWhen",
        skip_serializing_if = "Option::is_none"
    )]
    pub success_when: Option<String>,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Terminal state of a single step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one executed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub agent: String,
    pub status: StepStatus,
    /// The rendered input sent to the provider as the prompt.
    pub input: String,
    pub output: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Outcome of a whole run, returned to the caller on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub run_id: String,
    pub workflow_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    /// Per-step results keyed by step name.
    pub steps: BTreeMap<String, StepResult>,
    /// Step names in the order they executed.
    pub execution_order: Vec<String>,
    /// Aggregate output: step name -> output text.
    pub output: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
