//! Secondary index layer
//!
//! Maintains `idx:table:column:value:pk` entries so equality, range,
//! composite, and full-text lookups answer from the index keyspace without
//! scanning primary entities.

pub mod catalog;
pub mod fulltext;
pub mod secondary;

pub use catalog::{FullTextOptions, IndexDef, IndexKind};
pub use secondary::{IndexStats, SecondaryIndexManager};
