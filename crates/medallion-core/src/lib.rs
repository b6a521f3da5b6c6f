//! Business logic and port definitions for Medallion.
//!
//! This crate defines the "ports" that the infrastructure layer implements
//! (`GraphRepository`, `LlmProvider`) and the logic that drives them: the
//! workflow executor and the pattern-query translator. It depends only on
//! `medallion-types` -- never on `medallion-infra` or any database/IO crate.

pub mod llm;
pub mod query;
pub mod repository;
pub mod workflow;
