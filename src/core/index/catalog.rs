//! Index catalog records
//!
//! Every index is described by a durable record stored as JSON under
//! `idx_catalog:<table>:<column>`. The in-memory catalog mirror in the
//! manager is loaded from these records at startup.

use serde::{Deserialize, Serialize};

/// The kinds of secondary indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    /// One entry per (column, value, pk).
    Regular,
    /// Same shape as `Regular`; range scans rely on lexicographic value
    /// order (callers fixed-width-format numerics that need numeric order).
    Range,
    /// Skipped when the field is absent or null.
    Sparse,
    /// Index over the concatenation of several columns.
    Composite,
    /// One entry per token with term/document statistics in the value.
    FullText,
}

/// Tokenizer configuration for full-text indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullTextOptions {
    /// Analysis language tag (currently only "en" enables stop-words).
    pub language: String,
    /// Drop common words before indexing and querying.
    pub remove_stopwords: bool,
    /// Apply light suffix stemming.
    pub stem: bool,
}

impl Default for FullTextOptions {
    fn default() -> Self {
        Self { language: "en".to_string(), remove_stopwords: true, stem: true }
    }
}

/// A durable index definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    pub table: String,
    /// Catalog name of the index; for composite indexes this names the
    /// index itself while `columns` lists the members.
    pub column: String,
    pub kind: IndexKind,
    pub unique: bool,
    /// Member columns of a composite index, in significance order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulltext: Option<FullTextOptions>,
}

impl IndexDef {
    /// A regular equality index.
    #[must_use]
    pub fn regular(table: impl Into<String>, column: impl Into<String>, unique: bool) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            kind: IndexKind::Regular,
            unique,
            columns: Vec::new(),
            fulltext: None,
        }
    }

    /// A range index (lexicographic value order).
    #[must_use]
    pub fn range(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            kind: IndexKind::Range,
            unique: false,
            columns: Vec::new(),
            fulltext: None,
        }
    }

    /// A sparse index: absent and null fields produce no entries.
    #[must_use]
    pub fn sparse(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            kind: IndexKind::Sparse,
            unique: false,
            columns: Vec::new(),
            fulltext: None,
        }
    }

    /// A composite index named `name` over `columns`.
    #[must_use]
    pub fn composite(
        table: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<String>,
    ) -> Self {
        Self {
            table: table.into(),
            column: name.into(),
            kind: IndexKind::Composite,
            unique: false,
            columns,
            fulltext: None,
        }
    }

    /// A full-text index with the given analysis options.
    #[must_use]
    pub fn fulltext(
        table: impl Into<String>,
        column: impl Into<String>,
        options: FullTextOptions,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            kind: IndexKind::FullText,
            unique: false,
            columns: Vec::new(),
            fulltext: Some(options),
        }
    }
}
