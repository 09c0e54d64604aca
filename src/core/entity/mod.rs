//! Entity data model
//!
//! An [`Entity`] is a primary key plus a map from field name to a tagged
//! [`Value`]. The engine knows no schemas; field layout is a property of the
//! caller. Edges are ordinary entities carrying the reserved fields below.

pub mod codec;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved edge field: edge identifier.
pub const EDGE_ID: &str = "id";
/// Reserved edge field: source primary key.
pub const EDGE_FROM: &str = "_from";
/// Reserved edge field: target primary key.
pub const EDGE_TO: &str = "_to";
/// Reserved edge field: traversal weight (default 1.0 when absent).
pub const EDGE_WEIGHT: &str = "_weight";
/// Reserved edge field: validity lower bound, milliseconds since epoch.
pub const EDGE_VALID_FROM: &str = "valid_from";
/// Reserved edge field: validity upper bound, milliseconds since epoch.
pub const EDGE_VALID_TO: &str = "valid_to";

/// A tagged field value. Closed sum: the engine adds no further variants at
/// runtime, and float vectors are first-class rather than opaque blobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Str(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    FloatVec(Vec<f32>),
}

impl Value {
    /// String payload, if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload, if this is an `Int`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Double payload; integers are widened.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Boolean payload, if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Float-vector payload, if this is a `FloatVec`.
    #[must_use]
    pub fn as_float_vec(&self) -> Option<&[f32]> {
        match self {
            Self::FloatVec(v) => Some(v),
            _ => None,
        }
    }

    /// True for `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// A primary key plus a field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pk: String,
    fields: BTreeMap<String, Value>,
}

impl Entity {
    /// Create an empty entity with the given primary key.
    #[must_use]
    pub fn new(pk: impl Into<String>) -> Self {
        Self { pk: pk.into(), fields: BTreeMap::new() }
    }

    /// Add a field (builder pattern).
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Construct an edge entity with the three mandatory reserved fields.
    #[must_use]
    pub fn edge(id: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone())
            .with_field(EDGE_ID, Value::Str(id))
            .with_field(EDGE_FROM, Value::Str(from.into()))
            .with_field(EDGE_TO, Value::Str(to.into()))
    }

    /// The primary key.
    #[must_use]
    pub fn pk(&self) -> &str {
        &self.pk
    }

    /// Get a field value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set a field value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    /// Remove a field, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// All fields, ordered by name.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the entity has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// String field shortcut.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Integer field shortcut.
    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Double field shortcut (integers widened).
    #[must_use]
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    // Edge-view accessors. These are plain field reads; validity is checked
    // by the graph index when the entity is used as an edge.

    /// The `id` reserved field.
    #[must_use]
    pub fn edge_id(&self) -> Option<&str> {
        self.get_str(EDGE_ID)
    }

    /// The `_from` reserved field.
    #[must_use]
    pub fn edge_from(&self) -> Option<&str> {
        self.get_str(EDGE_FROM)
    }

    /// The `_to` reserved field.
    #[must_use]
    pub fn edge_to(&self) -> Option<&str> {
        self.get_str(EDGE_TO)
    }

    /// The `_weight` reserved field, defaulting to 1.0.
    #[must_use]
    pub fn edge_weight(&self) -> f64 {
        self.get_f64(EDGE_WEIGHT).unwrap_or(1.0)
    }

    /// The `valid_from` bound, absent meaning unbounded past.
    #[must_use]
    pub fn valid_from(&self) -> Option<i64> {
        self.get_i64(EDGE_VALID_FROM)
    }

    /// The `valid_to` bound, absent meaning unbounded future.
    #[must_use]
    pub fn valid_to(&self) -> Option<i64> {
        self.get_i64(EDGE_VALID_TO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_accessors() {
        let entity = Entity::new("alice")
            .with_field("name", Value::Str("Alice".to_string()))
            .with_field("age", Value::Int(30))
            .with_field("score", Value::Double(4.5))
            .with_field("active", Value::Bool(true));

        assert_eq!(entity.pk(), "alice");
        assert_eq!(entity.get_str("name"), Some("Alice"));
        assert_eq!(entity.get_i64("age"), Some(30));
        assert_eq!(entity.get_f64("age"), Some(30.0));
        assert_eq!(entity.get_f64("score"), Some(4.5));
        assert_eq!(entity.get("active").and_then(Value::as_bool), Some(true));
        assert_eq!(entity.get("missing"), None);
        assert_eq!(entity.len(), 4);
    }

    #[test]
    fn test_edge_constructor() {
        let edge = Entity::edge("e1", "a", "b")
            .with_field(EDGE_WEIGHT, Value::Double(2.5))
            .with_field(EDGE_VALID_FROM, Value::Int(1000));

        assert_eq!(edge.pk(), "e1");
        assert_eq!(edge.edge_id(), Some("e1"));
        assert_eq!(edge.edge_from(), Some("a"));
        assert_eq!(edge.edge_to(), Some("b"));
        assert_eq!(edge.edge_weight(), 2.5);
        assert_eq!(edge.valid_from(), Some(1000));
        assert_eq!(edge.valid_to(), None);
    }

    #[test]
    fn test_default_weight() {
        let edge = Entity::edge("e1", "a", "b");
        assert_eq!(edge.edge_weight(), 1.0);
    }

    #[test]
    fn test_null_field() {
        let entity = Entity::new("x").with_field("maybe", Value::Null);
        assert!(entity.get("maybe").unwrap().is_null());
        assert_eq!(entity.get_str("maybe"), None);
    }
}
