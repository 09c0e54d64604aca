//! Storage layer
//!
//! An ordered byte-keyed store with version chains, prefix scans, atomic
//! write batches, optional directory persistence, and MVCC transactions
//! with per-key pessimistic locking and commit-time snapshot validation.

pub mod batch;
pub mod store;
pub mod transaction;

pub use batch::WriteBatch;
pub use store::KvStore;
pub use transaction::{IsolationLevel, KvTransaction};

use crate::core::common::PolystoreError;

/// Read/write seam shared by the direct store handle and an open
/// transaction, so index maintenance code runs identically in both modes.
/// Inside a transaction, reads and scans observe the transaction's own
/// writes layered over its snapshot.
pub trait KvAccess {
    /// Point read.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PolystoreError>;

    /// Write a key.
    fn write(&mut self, key: &str, value: Vec<u8>) -> Result<(), PolystoreError>;

    /// Delete a key.
    fn delete(&mut self, key: &str) -> Result<(), PolystoreError>;

    /// All keys with the given prefix, in lexicographic order.
    fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, PolystoreError>;

    /// All key/value pairs with the given prefix, in lexicographic order.
    fn scan_pairs(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, PolystoreError>;
}

/// Direct (auto-commit) access to the store.
pub struct DirectAccess<'a> {
    store: &'a KvStore,
}

impl<'a> DirectAccess<'a> {
    /// Wrap a store handle.
    #[must_use]
    pub fn new(store: &'a KvStore) -> Self {
        Self { store }
    }
}

impl KvAccess for DirectAccess<'_> {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PolystoreError> {
        self.store.get(key)
    }

    fn write(&mut self, key: &str, value: Vec<u8>) -> Result<(), PolystoreError> {
        self.store.put(key, value)
    }

    fn delete(&mut self, key: &str) -> Result<(), PolystoreError> {
        self.store.del(key)
    }

    fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, PolystoreError> {
        let mut keys = Vec::new();
        self.store.scan_prefix(prefix, |key, _| {
            keys.push(key.to_string());
            true
        })?;
        Ok(keys)
    }

    fn scan_pairs(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, PolystoreError> {
        self.store.scan_prefix_collect(prefix)
    }
}

impl KvAccess for KvTransaction {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PolystoreError> {
        self.get(key)
    }

    fn write(&mut self, key: &str, value: Vec<u8>) -> Result<(), PolystoreError> {
        self.put(key, value)
    }

    fn delete(&mut self, key: &str) -> Result<(), PolystoreError> {
        self.del(key)
    }

    fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, PolystoreError> {
        Ok(self.scan_prefix(prefix)?.into_iter().map(|(k, _)| k).collect())
    }

    fn scan_pairs(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, PolystoreError> {
        self.scan_prefix(prefix)
    }
}
