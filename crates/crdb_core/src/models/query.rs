//! Query execution models.

use crate::models::value::Row;
use serde::{Deserialize, Serialize};

/// Type of SQL statement, from its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    /// SELECT or WITH query returning rows
    Select,
    /// SHOW statement
    Show,
    /// INSERT operation
    Insert,
    /// UPDATE operation
    Update,
    /// DELETE operation
    Delete,
    /// UPSERT operation
    Upsert,
    /// DDL, SET, or other operations
    Other,
}

impl QueryType {
    /// Detect the type of a SQL statement.
    pub fn detect(sql: &str) -> Self {
        let trimmed = statement_body(sql).to_uppercase();

        if trimmed.starts_with("SELECT") || trimmed.starts_with("WITH") || trimmed.starts_with("VALUES") {
            Self::Select
        } else if trimmed.starts_with("SHOW") {
            Self::Show
        } else if trimmed.starts_with("INSERT") {
            Self::Insert
        } else if trimmed.starts_with("UPDATE") {
            Self::Update
        } else if trimmed.starts_with("DELETE") {
            Self::Delete
        } else if trimmed.starts_with("UPSERT") {
            Self::Upsert
        } else {
            Self::Other
        }
    }
}

/// The statement text after leading whitespace and comments.
///
/// Skips `-- line` comments and `/* block */` comments, which may nest. An
/// unterminated block comment leaves nothing.
pub fn statement_body(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(line) = rest.strip_prefix("--") {
            rest = line.find('\n').map_or("", |end| &line[end + 1..]).trim_start();
        } else if rest.starts_with("/*") {
            let mut depth = 0usize;
            let mut end = None;
            let bytes = rest.as_bytes();
            let mut i = 0;
            while i + 1 < bytes.len() {
                match (bytes[i], bytes[i + 1]) {
                    (b'/', b'*') => {
                        depth += 1;
                        i += 2;
                    }
                    (b'*', b'/') => {
                        depth -= 1;
                        i += 2;
                        if depth == 0 {
                            end = Some(i);
                            break;
                        }
                    }
                    _ => i += 1,
                }
            }
            rest = end.map_or("", |end| &rest[end..]).trim_start();
        } else {
            return rest;
        }
    }
}

/// Column metadata from query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// PostgreSQL type OID
    pub type_oid: u32,
    /// Human-readable type name
    pub type_name: String,
}

impl ColumnInfo {
    /// Create column metadata.
    pub fn new(name: impl Into<String>, type_oid: u32, type_name: impl Into<String>) -> Self {
        Self { name: name.into(), type_oid, type_name: type_name.into() }
    }
}

/// Statement parameters: positional or named, never both.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum QueryParams {
    #[default]
    None,
    /// Values for `%s` / `$n` placeholders, in order
    Positional(Vec<serde_json::Value>),
    /// Values for `%(name)s` placeholders
    Named(serde_json::Map<String, serde_json::Value>),
}

impl QueryParams {
    /// Build parameters from the two mutually exclusive argument forms.
    pub fn from_args(
        positional: Option<Vec<serde_json::Value>>,
        named: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Self, String> {
        match (positional, named) {
            (Some(_), Some(_)) => {
                Err("parameters are mutually exclusive: positional_args|named_args".to_string())
            }
            (Some(values), None) => Ok(Self::Positional(values)),
            (None, Some(map)) => Ok(Self::Named(map)),
            (None, None) => Ok(Self::None),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::None => true,
            Self::Positional(values) => values.is_empty(),
            Self::Named(map) => map.is_empty(),
        }
    }
}

/// Results from one executed statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Column metadata (empty when the statement returns no result set)
    pub columns: Vec<ColumnInfo>,
    /// Server command tag, e.g. `INSERT 0 3`
    pub status_message: Option<String>,
    /// Rows affected or returned
    pub row_count: Option<u64>,
    /// Fetched rows
    pub rows: Vec<Row>,
}

impl QueryResult {
    /// Check if no rows were fetched.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get column names.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}
