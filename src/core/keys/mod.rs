//! Key schema for the shared keyspace
//!
//! Every data model maps to UTF-8 string keys in one ordered keyspace, with
//! `:` as the segment separator:
//!
//! - `<table>:<pk>` — entity rows
//! - `idx:<table>:<column>:<value>:<pk>` — secondary index entries
//! - `graph:out:<from_pk>:<edge_id>` — outgoing adjacency, value = to_pk
//! - `graph:in:<to_pk>:<edge_id>` — incoming adjacency, value = from_pk
//! - `graph:node:<pk>` / `graph:edge:<edge_id>` — graph entities
//! - `<namespace>:<pk>` — vector-bearing entities
//! - `idx_catalog:<table>:<column>` — index catalog records
//! - `config:<name>` — opaque configuration blobs

/// Key segment separator.
pub const SEPARATOR: char = ':';

/// Prefix for secondary index entries.
pub const IDX_PREFIX: &str = "idx:";
/// Prefix for index catalog records.
pub const IDX_CATALOG_PREFIX: &str = "idx_catalog:";
/// Prefix for outgoing adjacency entries.
pub const GRAPH_OUT_PREFIX: &str = "graph:out:";
/// Prefix for incoming adjacency entries.
pub const GRAPH_IN_PREFIX: &str = "graph:in:";
/// Prefix for graph node entities.
pub const GRAPH_NODE_PREFIX: &str = "graph:node:";
/// Prefix for edge entities.
pub const GRAPH_EDGE_PREFIX: &str = "graph:edge:";
/// Prefix for configuration blobs.
pub const CONFIG_PREFIX: &str = "config:";

/// Coarse classification of a key by its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    SecondaryIndex,
    GraphOut,
    GraphIn,
    GraphNode,
    GraphEdge,
    /// `table:pk` (also covers document collections and vector namespaces,
    /// which are indistinguishable without a schema)
    Relational,
}

/// Key for a relational table row: `table:pk`.
#[must_use]
pub fn relational(table: &str, pk: &str) -> String {
    format!("{table}{SEPARATOR}{pk}")
}

/// Key for a secondary index entry: `idx:table:column:value:pk`.
/// Sorts by `value` lexicographically within one `(table, column)` prefix.
#[must_use]
pub fn secondary_index(table: &str, column: &str, value: &str, pk: &str) -> String {
    format!("idx{SEPARATOR}{table}{SEPARATOR}{column}{SEPARATOR}{value}{SEPARATOR}{pk}")
}

/// Prefix covering all entries of one `(table, column, value)` triple.
#[must_use]
pub fn secondary_index_value_prefix(table: &str, column: &str, value: &str) -> String {
    format!("idx{SEPARATOR}{table}{SEPARATOR}{column}{SEPARATOR}{value}{SEPARATOR}")
}

/// Prefix covering all entries of one `(table, column)` pair.
#[must_use]
pub fn secondary_index_column_prefix(table: &str, column: &str) -> String {
    format!("idx{SEPARATOR}{table}{SEPARATOR}{column}{SEPARATOR}")
}

/// Key for an outgoing adjacency entry: `graph:out:from:edge`.
#[must_use]
pub fn graph_out(from_pk: &str, edge_id: &str) -> String {
    format!("{GRAPH_OUT_PREFIX}{from_pk}{SEPARATOR}{edge_id}")
}

/// Key for an incoming adjacency entry: `graph:in:to:edge`.
#[must_use]
pub fn graph_in(to_pk: &str, edge_id: &str) -> String {
    format!("{GRAPH_IN_PREFIX}{to_pk}{SEPARATOR}{edge_id}")
}

/// Prefix covering all outgoing adjacency entries of one node.
#[must_use]
pub fn graph_out_prefix(from_pk: &str) -> String {
    format!("{GRAPH_OUT_PREFIX}{from_pk}{SEPARATOR}")
}

/// Prefix covering all incoming adjacency entries of one node.
#[must_use]
pub fn graph_in_prefix(to_pk: &str) -> String {
    format!("{GRAPH_IN_PREFIX}{to_pk}{SEPARATOR}")
}

/// Key for a graph node entity: `graph:node:pk`.
#[must_use]
pub fn graph_node(pk: &str) -> String {
    format!("{GRAPH_NODE_PREFIX}{pk}")
}

/// Key for an edge entity: `graph:edge:id`.
#[must_use]
pub fn graph_edge(edge_id: &str) -> String {
    format!("{GRAPH_EDGE_PREFIX}{edge_id}")
}

/// Key for a vector-bearing entity: `namespace:pk`.
#[must_use]
pub fn vector(namespace: &str, pk: &str) -> String {
    format!("{namespace}{SEPARATOR}{pk}")
}

/// Key for an index catalog record: `idx_catalog:table:column`.
#[must_use]
pub fn index_catalog(table: &str, column: &str) -> String {
    format!("{IDX_CATALOG_PREFIX}{table}{SEPARATOR}{column}")
}

/// Key for an opaque configuration blob: `config:name`.
#[must_use]
pub fn config(name: &str) -> String {
    format!("{CONFIG_PREFIX}{name}")
}

/// Classify a key by prefix. Longest prefixes are checked first so
/// `graph:out:*` is never mistaken for a relational `graph:...` row.
#[must_use]
pub fn parse_key_type(key: &str) -> KeyType {
    if key.starts_with(IDX_PREFIX) {
        KeyType::SecondaryIndex
    } else if key.starts_with(GRAPH_OUT_PREFIX) {
        KeyType::GraphOut
    } else if key.starts_with(GRAPH_IN_PREFIX) {
        KeyType::GraphIn
    } else if key.starts_with(GRAPH_NODE_PREFIX) {
        KeyType::GraphNode
    } else if key.starts_with(GRAPH_EDGE_PREFIX) {
        KeyType::GraphEdge
    } else {
        KeyType::Relational
    }
}

/// The trailing primary key of any key: the suffix after the last separator.
/// A key without a separator is returned whole.
#[must_use]
pub fn extract_primary_key(key: &str) -> &str {
    match key.rfind(SEPARATOR) {
        Some(idx) => &key[idx + 1..],
        None => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_construction() {
        assert_eq!(relational("users", "alice"), "users:alice");
        assert_eq!(
            secondary_index("users", "name", "Alice", "alice"),
            "idx:users:name:Alice:alice"
        );
        assert_eq!(graph_out("a", "e1"), "graph:out:a:e1");
        assert_eq!(graph_in("b", "e1"), "graph:in:b:e1");
        assert_eq!(graph_node("a"), "graph:node:a");
        assert_eq!(graph_edge("e1"), "graph:edge:e1");
        assert_eq!(vector("documents", "d1"), "documents:d1");
        assert_eq!(index_catalog("users", "name"), "idx_catalog:users:name");
        assert_eq!(config("content"), "config:content");
    }

    #[test]
    fn test_parse_key_type() {
        assert_eq!(parse_key_type("idx:users:name:Alice:alice"), KeyType::SecondaryIndex);
        assert_eq!(parse_key_type("graph:out:a:e1"), KeyType::GraphOut);
        assert_eq!(parse_key_type("graph:in:b:e1"), KeyType::GraphIn);
        assert_eq!(parse_key_type("graph:node:a"), KeyType::GraphNode);
        assert_eq!(parse_key_type("graph:edge:e1"), KeyType::GraphEdge);
        assert_eq!(parse_key_type("users:alice"), KeyType::Relational);
        // A bare "graph:..." row that is none of the known subspaces
        assert_eq!(parse_key_type("graph:misc"), KeyType::Relational);
    }

    #[test]
    fn test_extract_primary_key() {
        assert_eq!(extract_primary_key("users:alice"), "alice");
        assert_eq!(extract_primary_key("idx:users:name:Alice:alice"), "alice");
        assert_eq!(extract_primary_key("graph:out:a:e1"), "e1");
        assert_eq!(extract_primary_key("bare"), "bare");
    }

    #[test]
    fn test_index_key_sorts_by_value() {
        let a = secondary_index("t", "c", "apple", "p2");
        let b = secondary_index("t", "c", "banana", "p1");
        assert!(a < b);
    }
}
