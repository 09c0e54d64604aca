#![forbid(unsafe_code)]
#![deny(
    clippy::correctness,
    clippy::suspicious,
    clippy::complexity,
    clippy::perf,
    clippy::style,
    clippy::todo,
    clippy::unimplemented,
    clippy::unreachable
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_const_for_fn,
    clippy::option_if_let_else,
    clippy::too_many_lines,
    clippy::similar_names,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::float_cmp,
    clippy::doc_markdown,
    clippy::wildcard_imports,
    clippy::module_inception,
    clippy::use_self,
    clippy::return_self_not_must_use,
    clippy::single_match_else,
    clippy::implicit_hasher,
    clippy::default_trait_access,
    clippy::items_after_statements,
    clippy::needless_pass_by_value,
    clippy::redundant_closure_for_method_calls,
    clippy::type_complexity
)]

//! # Polystore - A Transactional Multi-Model Storage Engine
//!
//! Polystore is an embeddable storage engine that keeps four data models behind
//! one ACID transaction boundary:
//!
//! - **Key-value**: an ordered byte-keyed store with prefix scans, write
//!   batches, and MVCC transactions (snapshot reads, per-key pessimistic
//!   locks, commit-time write-conflict validation).
//! - **Secondary indexes**: equality, range, sparse, composite, and full-text
//!   (BM25-scored) indexes over entity fields.
//! - **Graph**: directed edges with a persistent adjacency representation and
//!   an in-memory mirror; BFS, Dijkstra, A*, and time-filtered variants.
//! - **Vectors**: approximate nearest-neighbor search (HNSW) with a
//!   brute-force fallback and optional on-disk persistence.
//!
//! Side effects that cannot enroll in the key-value transaction (the
//! in-memory graph adjacency, the vector cache and ANN structure) are covered
//! by a per-transaction SAGA ledger of compensating actions, executed in
//! reverse order on rollback or failed commit.
//!
//! ## Quick Start
//!
//! ```no_run
//! use polystore::api::Polystore;
//! use polystore::core::entity::{Entity, Value};
//!
//! # fn main() -> Result<(), polystore::PolystoreError> {
//! let db = Polystore::open("my_database")?;
//!
//! let tx_id = db.transactions().begin_default()?;
//! let txn = db.transactions().get_transaction(tx_id).unwrap();
//! {
//!     let mut txn = txn.lock().unwrap();
//!     let user = Entity::new("alice")
//!         .with_field("name", Value::Str("Alice".into()))
//!         .with_field("age", Value::Int(30));
//!     txn.put_entity("users", &user)?;
//! }
//! db.transactions().commit_transaction(tx_id)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Polystore follows a modular architecture with clear separation of concerns:
//!
//! - **API Layer**: the [`api::Polystore`] facade bundling the engine
//! - **Storage Layer**: versioned ordered store with MVCC transactions
//! - **Index Layer**: secondary, graph, and vector index managers
//! - **Transaction Layer**: session lifecycle, statistics, SAGA compensation

pub mod api;
pub mod core;

// Public API exports
pub use api::Polystore;
pub use crate::core::entity::{Entity, Value};

// Core module exports for advanced users
pub use crate::core::common::PolystoreError;
