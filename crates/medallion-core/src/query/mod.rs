//! Pattern-query translation for read-only inspection of the knowledge graph.

pub mod translator;
