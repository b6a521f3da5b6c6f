//! Text-generation provider abstractions for Medallion.
//!
//! - `LlmProvider`: RPITIT trait for concrete provider implementations
//! - `BoxLlmProvider`: Object-safe wrapper for dynamic dispatch
//! - `ProviderRegistry`: name-indexed providers handed to the executor

pub mod box_provider;
pub mod provider;
pub mod registry;
