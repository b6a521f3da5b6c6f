//! Shared domain types for Medallion.
//!
//! This crate contains the types every other crate speaks: the knowledge-graph
//! entities persisted by the store (Agent, Run, Artifact, Claim, Span,
//! Relationship), workflow definitions and run results, provider
//! request/response shapes, global configuration, and the store error type.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod agent;
pub mod config;
pub mod error;
pub mod graph;
pub mod llm;
pub mod workflow;
