//! Translate restricted graph patterns into store SQL.
//!
//! Accepted input:
//!
//! ```text
//! MATCH (<var>:<Label>) [WHERE <var>.<field> = <literal>] RETURN <projection>
//! SELECT ...                      -- passed through verbatim
//! ```
//!
//! Patterns are matched by syntactic shape (aggregate, filtered, unfiltered)
//! against regexes anchored on the `MATCH` head, so a label name appearing
//! inside a string literal never selects a table. The WHERE condition consumes
//! quoted literals whole, so a `RETURN` inside one never ends the clause.
//! Labels map to tables
//! through [`Entity`]. Filter literals are returned as positional arguments
//! rather than spliced into the SQL text.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Number, Value};
use thiserror::Error;

use medallion_types::graph::Entity;

static MATCH_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^MATCH\s*\(\s*([A-Za-z_][A-Za-z0-9_]*)\s*:\s*([A-Za-z_][A-Za-z0-9_]*)\s*\)\s*(.*)$")
        .expect("MATCH head regex is valid")
});

static MATCH_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^(?:WHERE\s+((?:'[^']*'|"[^"]*"|[^'"])+?)\s+)?RETURN\s+(.+?)\s*;?$"#)
        .expect("MATCH tail regex is valid")
});

static AGGREGATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bCOUNT\s*\(").expect("aggregate regex is valid"));

static EQUALITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)^([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(?:'([^']*)'|"([^"]*)"|(-?\d+(?:\.\d+)?))$"#,
    )
    .expect("equality regex is valid")
});

/// Errors produced while translating a pattern query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Neither a `MATCH` pattern nor a native `SELECT`.
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    /// The pattern names a label with no backing table.
    #[error("unsupported entity label '{0}' (expected Claim, Agent, Run or Artifact)")]
    UnsupportedEntity(String),

    /// Only a single `var.field = literal` condition is understood.
    #[error("unsupported WHERE condition: {0}")]
    UnsupportedCondition(String),

    #[error("unknown field '{field}' for {entity}")]
    UnknownField { entity: Entity, field: String },

    #[error("malformed query: {0}")]
    Malformed(String),
}

/// Which syntactic shape produced a translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    /// `RETURN COUNT(...)`.
    Count(Entity),
    /// `WHERE var.field = literal`.
    Filtered(Entity),
    Unfiltered(Entity),
    /// Native SQL handed through untouched.
    Passthrough,
}

impl QueryShape {
    pub fn entity(&self) -> Option<Entity> {
        match self {
            QueryShape::Count(e) | QueryShape::Filtered(e) | QueryShape::Unfiltered(e) => Some(*e),
            QueryShape::Passthrough => None,
        }
    }
}

/// Native query text plus positional arguments, ready for the store's
/// passthrough `query`.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedQuery {
    pub sql: String,
    pub args: Vec<Value>,
    pub shape: QueryShape,
}

impl fmt::Display for TranslatedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)?;
        if !self.args.is_empty() {
            let args: Vec<String> = self.args.iter().map(Value::to_string).collect();
            write!(f, " [{}]", args.join(", "))?;
        }
        Ok(())
    }
}

/// Translate a pattern query (or pass a native `SELECT` through).
pub fn translate(query: &str) -> Result<TranslatedQuery, QueryError> {
    let query = query.trim();
    let keyword = query
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();

    match keyword.as_str() {
        "SELECT" => Ok(TranslatedQuery {
            sql: query.to_string(),
            args: Vec::new(),
            shape: QueryShape::Passthrough,
        }),
        k if k.starts_with("MATCH") => translate_match(query),
        _ => Err(QueryError::UnsupportedQuery(query.to_string())),
    }
}

fn translate_match(query: &str) -> Result<TranslatedQuery, QueryError> {
    let head = MATCH_HEAD.captures(query).ok_or_else(|| {
        QueryError::UnsupportedQuery(format!(
            "expected MATCH (<var>:<Label>) ... RETURN ..., got: {query}"
        ))
    })?;
    let var = &head[1];
    let label = &head[2];
    let rest = head[3].trim();

    if rest.starts_with('-') || rest.starts_with('<') {
        return Err(QueryError::UnsupportedQuery(format!(
            "relationship patterns are not supported: {query}"
        )));
    }

    let entity: Entity = label
        .parse()
        .map_err(|_| QueryError::UnsupportedEntity(label.to_string()))?;
    let table = entity.table();

    let tail = MATCH_TAIL
        .captures(rest)
        .ok_or_else(|| QueryError::Malformed(format!("missing RETURN clause: {query}")))?;
    let condition = tail.get(1).map(|m| m.as_str().trim());
    let projection = tail[2].trim();

    if AGGREGATE.is_match(projection) {
        if let Some(condition) = condition {
            tracing::warn!(
                entity = %entity,
                condition,
                "COUNT ignores WHERE; counting every row"
            );
        }
        return Ok(TranslatedQuery {
            sql: format!("SELECT COUNT(*) FROM {table}"),
            args: Vec::new(),
            shape: QueryShape::Count(entity),
        });
    }

    let Some(condition) = condition else {
        return Ok(TranslatedQuery {
            sql: format!("SELECT * FROM {table}"),
            args: Vec::new(),
            shape: QueryShape::Unfiltered(entity),
        });
    };

    let (field, literal) = parse_equality(entity, var, condition)?;
    Ok(TranslatedQuery {
        sql: format!("SELECT * FROM {table} WHERE {field} = ?"),
        args: vec![literal],
        shape: QueryShape::Filtered(entity),
    })
}

/// Parse `var.field = literal`, checking the qualifier and the field name.
fn parse_equality(
    entity: Entity,
    var: &str,
    condition: &str,
) -> Result<(String, Value), QueryError> {
    let caps = EQUALITY
        .captures(condition)
        .ok_or_else(|| QueryError::UnsupportedCondition(condition.to_string()))?;

    if &caps[1] != var {
        return Err(QueryError::UnsupportedCondition(format!(
            "'{}' is not bound by the pattern (expected '{var}.')",
            &caps[1]
        )));
    }

    let field = &caps[2];
    if !entity.columns().contains(&field) {
        return Err(QueryError::UnknownField {
            entity,
            field: field.to_string(),
        });
    }

    let literal = if let Some(s) = caps.get(3).or_else(|| caps.get(4)) {
        Value::String(s.as_str().to_string())
    } else {
        let raw = caps.get(5).map(|m| m.as_str()).unwrap_or_default();
        parse_number(raw).ok_or_else(|| QueryError::Malformed(format!("bad number: {raw}")))?
    };

    Ok((field.to_string(), literal))
}

fn parse_number(raw: &str) -> Option<Value> {
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}
