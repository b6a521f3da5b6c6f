//! Global configuration types for Medallion.
//!
//! `GlobalConfig` represents the top-level `config.toml`: where the knowledge
//! graph lives, which providers are registered, and the sampling settings
//! applied to every step.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::llm::{GenerationDefaults, ProviderConfig};

/// Top-level configuration.
///
/// Loaded from `~/.medallion/config.toml`. All fields have defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// SQLite URL of the knowledge graph. Defaults to `{data_dir}/medallion.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Provider registrations keyed by the name agents refer to.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    #[serde(default)]
    pub generation: GenerationDefaults,
}
