//! Transaction layer
//!
//! Session-scoped multi-model transactions: every logical operation enrolls
//! its KV mutations in one storage transaction and registers compensating
//! actions for effects that live outside it (the graph mirror, the vector
//! cache and ANN structure).

pub mod manager;
pub mod saga;

pub use manager::{Transaction, TransactionManager, TransactionStats};
pub use saga::Saga;
