//! MVCC transactions over the key-value store
//!
//! Reads observe a snapshot taken at begin (snapshot isolation) or the
//! latest committed state (read committed); both always observe the
//! transaction's own prior writes. Writes acquire a per-key lock at write
//! time and fail immediately on contention. Commit re-validates the write
//! set against the snapshot before applying it under one commit sequence.

use crate::core::common::PolystoreError;
use crate::core::storage::store::{StoreShared, TxId};
use log::warn;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Reads see the latest committed state at each read.
    ReadCommitted,
    /// Reads see the committed state as of transaction begin.
    #[default]
    Snapshot,
}

impl IsolationLevel {
    /// Parse a configuration name ("read_committed" / "snapshot").
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "read_committed" => Some(Self::ReadCommitted),
            "snapshot" => Some(Self::Snapshot),
            _ => None,
        }
    }

    /// The configuration name of this level.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ReadCommitted => "read_committed",
            Self::Snapshot => "snapshot",
        }
    }
}

/// A storage-level transaction handle.
///
/// Dropping an active transaction rolls it back and logs a warning.
#[derive(Debug)]
pub struct KvTransaction {
    shared: Arc<StoreShared>,
    id: TxId,
    isolation: IsolationLevel,
    snapshot_seq: u64,
    /// Own writes, `None` meaning delete. Keys here also hold per-key locks.
    writes: BTreeMap<String, Option<Vec<u8>>>,
    active: bool,
}

impl KvTransaction {
    pub(crate) fn new(
        shared: Arc<StoreShared>,
        id: TxId,
        isolation: IsolationLevel,
        snapshot_seq: u64,
    ) -> Self {
        Self { shared, id, isolation, snapshot_seq, writes: BTreeMap::new(), active: true }
    }

    /// The storage-level transaction id.
    #[must_use]
    pub fn id(&self) -> TxId {
        self.id
    }

    /// The isolation level chosen at begin.
    #[must_use]
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// True until commit or rollback.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    fn read_bound(&self) -> u64 {
        match self.isolation {
            IsolationLevel::ReadCommitted => u64::MAX,
            IsolationLevel::Snapshot => self.snapshot_seq,
        }
    }

    fn ensure_active(&self) -> Result<(), PolystoreError> {
        if self.active {
            Ok(())
        } else {
            Err(PolystoreError::Transaction(format!(
                "transaction {} is already finished",
                self.id
            )))
        }
    }

    /// Point read through this transaction's view: own writes first, then
    /// the committed state at the isolation level's read bound.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PolystoreError> {
        self.ensure_active()?;
        if let Some(write) = self.writes.get(key) {
            return Ok(write.clone());
        }
        self.shared.get_at(key, self.read_bound())
    }

    /// Write a key. Takes the per-key lock; contention with another live
    /// transaction fails immediately with `WriteConflict` and leaves this
    /// transaction untouched.
    pub fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), PolystoreError> {
        self.ensure_active()?;
        self.shared.lock_key(key, self.id)?;
        self.writes.insert(key.to_string(), Some(value));
        Ok(())
    }

    /// Delete a key under the same locking rules as `put`.
    pub fn del(&mut self, key: &str) -> Result<(), PolystoreError> {
        self.ensure_active()?;
        self.shared.lock_key(key, self.id)?;
        self.writes.insert(key.to_string(), None);
        Ok(())
    }

    /// Prefix scan through this transaction's view: the committed state at
    /// the read bound with the transaction's own writes layered on top.
    pub fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, PolystoreError> {
        self.ensure_active()?;
        let committed = self.shared.scan_prefix_at(prefix, self.read_bound())?;

        let mut merged: BTreeMap<String, Vec<u8>> = committed.into_iter().collect();
        for (key, value) in self.writes.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    /// Commit the write set. Under snapshot isolation, any written key that
    /// another transaction committed after this snapshot fails the commit
    /// with `WriteConflict`; nothing is applied and the transaction is
    /// rolled back. A transaction with zero writes commits trivially.
    pub fn commit(&mut self) -> Result<(), PolystoreError> {
        self.ensure_active()?;

        let validate_after = match self.isolation {
            // Locks held since write time already serialize read-committed
            // writers; only snapshot isolation needs begin-time validation.
            IsolationLevel::ReadCommitted => None,
            IsolationLevel::Snapshot => Some(self.snapshot_seq),
        };

        let result = if self.writes.is_empty() {
            Ok(())
        } else {
            self.shared.commit_writes(&self.writes, validate_after)
        };

        self.shared.release_locks(self.id, self.writes.keys());
        self.writes.clear();
        self.active = false;
        result
    }

    /// Roll back: release all locks, discard the write set.
    pub fn rollback(&mut self) {
        if !self.active {
            return;
        }
        self.shared.release_locks(self.id, self.writes.keys());
        self.writes.clear();
        self.active = false;
    }
}

impl Drop for KvTransaction {
    fn drop(&mut self) {
        if self.active {
            warn!("transaction {} dropped without commit/rollback; rolling back", self.id);
            self.rollback();
        }
    }
}
