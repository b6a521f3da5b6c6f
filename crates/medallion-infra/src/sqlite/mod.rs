//! SQLite storage layer.
//!
//! The knowledge-graph repository backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod graph;
pub mod pool;
mod rows;
