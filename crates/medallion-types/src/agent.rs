//! Agent definition documents.
//!
//! An `AgentDefinition` is the on-disk shape of an agent (`agents/<name>.yaml`).
//! It is converted into a store [`Agent`] before any workflow references it.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::graph::Agent;

/// Provider binding of an agent definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentModel {
    /// Provider registration name (e.g. "ollama", "openai").
    pub provider: String,
    /// Model identifier understood by that provider.
    pub model: String,
}

/// Prompt section of an agent definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPrompts {
    #[serde(default)]
    pub system: String,
}

/// An agent as written by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Explicit id; defaults to `name` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    #[serde(default)]
    pub description: String,
    pub model: AgentModel,
    #[serde(default)]
    pub prompts: AgentPrompts,
    /// Tool names. Carried for completeness; the executor does not invoke tools.
    #[serde(default)]
    pub tools: Vec<String>,
}

impl AgentDefinition {
    /// Convert into the store representation.
    pub fn into_agent(self) -> Agent {
        let now = Utc::now();
        Agent {
            id: self.id.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            agent_type: self.agent_type,
            description: self.description,
            model_provider: self.model.provider,
            model_name: self.model.model,
            system_prompt: self.prompts.system,
            created_at: now,
            updated_at: now,
        }
    }
}
