//! Agent definition files.
//!
//! Agents are written as YAML documents (see [`AgentDefinition`]) and
//! registered in the knowledge graph before a workflow references them.

use std::path::{Path, PathBuf};

use medallion_types::agent::AgentDefinition;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentFileError {
    #[error("failed to read agent file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid agent definition in {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// Parse an agent definition from YAML text. `origin` names the source in errors.
pub fn parse_agent_yaml(yaml: &str, origin: &Path) -> Result<AgentDefinition, AgentFileError> {
    let def: AgentDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| AgentFileError::Invalid {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;

    let invalid = |message: &str| AgentFileError::Invalid {
        path: origin.to_path_buf(),
        message: message.to_string(),
    };
    if def.name.trim().is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if def.model.provider.trim().is_empty() {
        return Err(invalid("model.provider must not be empty"));
    }
    if def.model.model.trim().is_empty() {
        return Err(invalid("model.model must not be empty"));
    }

    Ok(def)
}

/// Load and validate an agent definition file.
pub async fn load_agent_file(path: &Path) -> Result<AgentDefinition, AgentFileError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| AgentFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    parse_agent_yaml(&content, path)
}
