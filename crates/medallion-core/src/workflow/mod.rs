//! Workflow engine: definition parsing, dependency diagnostics, input
//! templating and the run executor.
//!
//! - `definition` -- YAML parsing, structural validation, file load
//! - `dag` -- petgraph-based cycle/unknown-dependency reporting and predicted order
//! - `template` -- `{{.key}}` / `{{.step.output}}` input rendering
//! - `executor` -- scan-based sequential executor persisting to the graph store

pub mod dag;
pub mod definition;
pub mod executor;
pub mod template;
