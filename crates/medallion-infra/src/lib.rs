//! Infrastructure layer for Medallion.
//!
//! Contains implementations of the ports defined in `medallion-core`: the
//! SQLite knowledge-graph store, the Ollama and OpenAI-compatible providers,
//! plus configuration, data-directory and agent-definition loading.

pub mod agents;
pub mod config;
pub mod filesystem;
pub mod llm;
pub mod sqlite;
