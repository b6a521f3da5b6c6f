//! Workflow definition parsing, validation, and file loading.
//!
//! Converts YAML documents into the canonical `WorkflowDefinition` and checks
//! the structural constraints the executor relies on (non-empty name, at
//! least one step, unique step names). Dependency references are NOT checked
//! here: a dangling or cyclic `depends_on` is a runtime stall, and
//! [`validate_dag`](super::dag::validate_dag) reports it up front for tooling.

use std::collections::HashSet;
use std::path::Path;

use medallion_types::workflow::WorkflowDefinition;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or checking a workflow definition.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Dependency graph contains a cycle.
    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /// A step references an unknown dependency.
    #[error("unknown dependency: {0}")]
    UnknownDependency(String),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `WorkflowDefinition`.
///
/// Both `depends_on`/`dependsOn` and `success_when`/`successWhen` spellings
/// are accepted.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let def: WorkflowDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Load a workflow definition from a YAML file.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow_yaml(&content)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `WorkflowDefinition`.
///
/// Checks:
/// - Name is non-empty
/// - At least one step exists
/// - Every step has a name and an agent
/// - All step names are unique
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    if def.name.trim().is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow name must not be empty".to_string(),
        ));
    }

    if def.steps.is_empty() {
        return Err(WorkflowError::ValidationError(format!(
            "workflow '{}' must have at least one step",
            def.name
        )));
    }

    let mut seen = HashSet::new();
    for (idx, step) in def.steps.iter().enumerate() {
        if step.name.trim().is_empty() {
            return Err(WorkflowError::ValidationError(format!(
                "step #{} has an empty name",
                idx + 1
            )));
        }
        if step.agent.trim().is_empty() {
            return Err(WorkflowError::ValidationError(format!(
                "step '{}' has no agent",
                step.name
            )));
        }
        if !seen.insert(step.name.as_str()) {
            return Err(WorkflowError::ValidationError(format!(
                "duplicate step name: '{}'",
                step.name
            )));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
