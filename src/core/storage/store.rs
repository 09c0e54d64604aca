//! Versioned ordered key-value store
//!
//! Keys are UTF-8 strings in one ordered keyspace, values are opaque bytes.
//! Every committed mutation appends a version stamped with a monotonically
//! increasing commit sequence number; readers walk a key's version chain
//! newest-first and take the first version at or below their snapshot.
//! Deletes append tombstones rather than removing chains, so snapshot
//! readers keep seeing the pre-delete value.
//!
//! A global lock table maps keys to the transaction currently holding them.
//! Direct writes and batch applies also consult it, so no writer can slip
//! under a transaction's per-key lock.

use crate::core::common::lock_utils::LockResultExt;
use crate::core::common::PolystoreError;
use crate::core::storage::batch::{BatchOp, WriteBatch};
use crate::core::storage::transaction::{IsolationLevel, KvTransaction};
use log::{error, warn};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Transaction identifier at the storage level.
pub type TxId = u64;

const SNAPSHOT_FILE: &str = "polystore.db";
const SNAPSHOT_MAGIC: &[u8; 4] = b"PLYS";
const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub(crate) struct Version {
    pub seq: u64,
    /// `None` is a tombstone.
    pub value: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
pub(crate) struct StoreInner {
    pub versions: BTreeMap<String, Vec<Version>>,
    pub commit_seq: u64,
}

impl StoreInner {
    /// Newest value visible at `max_seq`, or `None` for absent/tombstoned.
    pub fn visible(&self, key: &str, max_seq: u64) -> Option<&[u8]> {
        let chain = self.versions.get(key)?;
        chain
            .iter()
            .rev()
            .find(|v| v.seq <= max_seq)
            .and_then(|v| v.value.as_deref())
    }

    /// Commit sequence of the newest version of `key`, if any exists.
    pub fn latest_seq(&self, key: &str) -> Option<u64> {
        self.versions.get(key).and_then(|chain| chain.last()).map(|v| v.seq)
    }

    pub fn apply(&mut self, key: String, value: Option<Vec<u8>>, seq: u64) {
        self.versions.entry(key).or_default().push(Version { seq, value });
    }
}

/// State shared between the store handle and its open transactions.
#[derive(Debug, Default)]
pub(crate) struct StoreShared {
    pub(crate) inner: RwLock<StoreInner>,
    lock_table: Mutex<HashMap<String, TxId>>,
    next_tx_id: AtomicU64,
}

impl StoreShared {
    fn check_unlocked(&self, key: &str) -> Result<(), PolystoreError> {
        let locks = self.lock_table.lock().or_poisoned("lock table")?;
        if let Some(owner) = locks.get(key) {
            return Err(PolystoreError::WriteConflict(format!(
                "key '{key}' is locked by transaction {owner}"
            )));
        }
        Ok(())
    }

    /// Acquire the per-key write lock for `tx_id`. Re-acquisition by the
    /// same transaction is a no-op; contention fails immediately.
    pub(crate) fn lock_key(&self, key: &str, tx_id: TxId) -> Result<(), PolystoreError> {
        let mut locks = self.lock_table.lock().or_poisoned("lock table")?;
        match locks.get(key) {
            Some(owner) if *owner != tx_id => Err(PolystoreError::WriteConflict(format!(
                "key '{key}' is locked by transaction {owner}"
            ))),
            Some(_) => Ok(()),
            None => {
                locks.insert(key.to_string(), tx_id);
                Ok(())
            }
        }
    }

    /// Release every lock held by `tx_id` over the given keys.
    pub(crate) fn release_locks<'k>(&self, tx_id: TxId, keys: impl Iterator<Item = &'k String>) {
        match self.lock_table.lock() {
            Ok(mut locks) => {
                for key in keys {
                    if locks.get(key) == Some(&tx_id) {
                        locks.remove(key);
                    }
                }
            }
            Err(_) => error!("lock table poisoned while releasing locks of txn {tx_id}"),
        }
    }

    /// Read visible at `max_seq`, bypassing any transaction overlay.
    pub(crate) fn get_at(
        &self,
        key: &str,
        max_seq: u64,
    ) -> Result<Option<Vec<u8>>, PolystoreError> {
        let inner = self.inner.read().or_poisoned("store")?;
        Ok(inner.visible(key, max_seq).map(<[u8]>::to_vec))
    }

    /// Committed entries with `prefix`, visible at `max_seq`.
    pub(crate) fn scan_prefix_at(
        &self,
        prefix: &str,
        max_seq: u64,
    ) -> Result<Vec<(String, Vec<u8>)>, PolystoreError> {
        let inner = self.inner.read().or_poisoned("store")?;
        let mut out = Vec::new();
        for (key, _) in inner.versions.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            if let Some(value) = inner.visible(key, max_seq) {
                out.push((key.clone(), value.to_vec()));
            }
        }
        Ok(out)
    }

    /// Validate and apply a transaction's write set in one step.
    ///
    /// When `validate_after` is set (snapshot isolation), any written key
    /// whose newest committed version is newer than that sequence fails the
    /// commit. Locks are expected to be held by the caller and are NOT
    /// released here.
    pub(crate) fn commit_writes(
        &self,
        writes: &BTreeMap<String, Option<Vec<u8>>>,
        validate_after: Option<u64>,
    ) -> Result<(), PolystoreError> {
        let mut inner = self.inner.write().or_poisoned("store")?;

        if let Some(snapshot_seq) = validate_after {
            for key in writes.keys() {
                if let Some(latest) = inner.latest_seq(key) {
                    if latest > snapshot_seq {
                        return Err(PolystoreError::WriteConflict(format!(
                            "key '{key}' was committed by another transaction after this snapshot"
                        )));
                    }
                }
            }
        }

        inner.commit_seq += 1;
        let seq = inner.commit_seq;
        for (key, value) in writes {
            inner.apply(key.clone(), value.clone(), seq);
        }
        Ok(())
    }
}

/// Ordered byte-keyed store with MVCC transactions.
///
/// Internally the committed state, the lock table, and the id allocator are
/// shared with open transaction handles; the store value itself can live
/// anywhere (typically behind an [`Arc`] alongside the index managers).
#[derive(Debug)]
pub struct KvStore {
    shared: Arc<StoreShared>,
    persist_path: Option<PathBuf>,
}

impl KvStore {
    /// A purely in-memory store (tests, caches).
    #[must_use]
    pub fn in_memory() -> Self {
        Self { shared: Arc::new(StoreShared::default()), persist_path: None }
    }

    /// Open (or create) a store persisted under `dir`. The snapshot file is
    /// loaded if present; `flush` and `Drop` write it back.
    ///
    /// # Errors
    ///
    /// Returns `Io`/`Storage` errors when the directory cannot be created or
    /// the snapshot file is unreadable or corrupt.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, PolystoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(SNAPSHOT_FILE);

        let mut inner = StoreInner::default();
        load_snapshot(&path, &mut inner)?;

        Ok(Self {
            shared: Arc::new(StoreShared {
                inner: RwLock::new(inner),
                lock_table: Mutex::new(HashMap::new()),
                next_tx_id: AtomicU64::new(1),
            }),
            persist_path: Some(path),
        })
    }

    /// Point read against the latest committed state.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PolystoreError> {
        self.shared.get_at(key, u64::MAX)
    }

    /// Unconditional write outside any transaction. Fails with
    /// `WriteConflict` if the key is locked by an in-flight transaction.
    pub fn put(&self, key: &str, value: Vec<u8>) -> Result<(), PolystoreError> {
        self.shared.check_unlocked(key)?;
        let mut inner = self.shared.inner.write().or_poisoned("store")?;
        inner.commit_seq += 1;
        let seq = inner.commit_seq;
        inner.apply(key.to_string(), Some(value), seq);
        Ok(())
    }

    /// Unconditional delete outside any transaction. Fails with
    /// `WriteConflict` if the key is locked by an in-flight transaction.
    pub fn del(&self, key: &str) -> Result<(), PolystoreError> {
        self.shared.check_unlocked(key)?;
        let mut inner = self.shared.inner.write().or_poisoned("store")?;
        inner.commit_seq += 1;
        let seq = inner.commit_seq;
        inner.apply(key.to_string(), None, seq);
        Ok(())
    }

    /// Visit committed entries whose key starts with `prefix`, in
    /// lexicographic order. The visitor returns `false` to stop early.
    pub fn scan_prefix<F>(&self, prefix: &str, mut visitor: F) -> Result<(), PolystoreError>
    where
        F: FnMut(&str, &[u8]) -> bool,
    {
        let inner = self.shared.inner.read().or_poisoned("store")?;
        for (key, _) in inner.versions.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            if let Some(value) = inner.visible(key, u64::MAX) {
                if !visitor(key, value) {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Collect all committed entries with the given prefix.
    pub fn scan_prefix_collect(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, Vec<u8>)>, PolystoreError> {
        self.shared.scan_prefix_at(prefix, u64::MAX)
    }

    /// Number of live entries with the given prefix.
    pub fn count_prefix(&self, prefix: &str) -> Result<usize, PolystoreError> {
        let mut count = 0usize;
        self.scan_prefix(prefix, |_, _| {
            count += 1;
            true
        })?;
        Ok(count)
    }

    /// A fresh write-batch accumulator.
    #[must_use]
    pub fn new_batch(&self) -> WriteBatch {
        WriteBatch::new()
    }

    /// Apply a batch atomically: every operation lands under one commit
    /// sequence number. Fails without applying anything if any touched key
    /// is locked by an in-flight transaction.
    pub fn apply_batch(&self, batch: WriteBatch) -> Result<(), PolystoreError> {
        {
            let locks = self.shared.lock_table.lock().or_poisoned("lock table")?;
            for op in batch.ops() {
                if let Some(owner) = locks.get(op.key()) {
                    return Err(PolystoreError::WriteConflict(format!(
                        "key '{}' is locked by transaction {owner}",
                        op.key()
                    )));
                }
            }
        }
        let mut inner = self.shared.inner.write().or_poisoned("store")?;
        inner.commit_seq += 1;
        let seq = inner.commit_seq;
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => inner.apply(key, Some(value), seq),
                BatchOp::Delete { key } => inner.apply(key, None, seq),
            }
        }
        Ok(())
    }

    /// Begin an MVCC transaction. Reads see a snapshot taken now; writes
    /// take per-key locks and fail immediately on contention.
    pub fn begin_transaction(
        &self,
        isolation: IsolationLevel,
    ) -> Result<KvTransaction, PolystoreError> {
        let snapshot_seq = {
            let inner = self.shared.inner.read().or_poisoned("store")?;
            inner.commit_seq
        };
        let id = self.shared.next_tx_id.fetch_add(1, Ordering::Relaxed);
        Ok(KvTransaction::new(Arc::clone(&self.shared), id, isolation, snapshot_seq))
    }

    /// Persist the current committed state (no-op for in-memory stores).
    pub fn flush(&self) -> Result<(), PolystoreError> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let inner = self.shared.inner.read().or_poisoned("store")?;
        save_snapshot(path, &inner)
    }
}

impl Drop for KvStore {
    fn drop(&mut self) {
        if self.persist_path.is_some() {
            if let Err(e) = self.flush() {
                warn!("failed to persist store on drop: {e}");
            }
        }
    }
}

// --- snapshot persistence ---
// Latest visible values only; version history is not carried across restarts.
// Written to a temp file first, then renamed over the target.

fn save_snapshot(path: &Path, inner: &StoreInner) -> Result<(), PolystoreError> {
    let tmp_path = path.with_extension("tmp");
    {
        let file = fs::File::create(&tmp_path)?;
        let mut w = BufWriter::new(file);
        w.write_all(SNAPSHOT_MAGIC)?;
        w.write_all(&SNAPSHOT_FORMAT_VERSION.to_le_bytes())?;

        let mut count: u64 = 0;
        for key in inner.versions.keys() {
            if inner.visible(key, u64::MAX).is_some() {
                count += 1;
            }
        }
        w.write_all(&count.to_le_bytes())?;

        for (key, _) in &inner.versions {
            if let Some(value) = inner.visible(key, u64::MAX) {
                w.write_all(&(key.len() as u32).to_le_bytes())?;
                w.write_all(key.as_bytes())?;
                w.write_all(&(value.len() as u32).to_le_bytes())?;
                w.write_all(value)?;
            }
        }
        w.flush()?;
    }
    fs::rename(&tmp_path, path).map_err(|e| {
        PolystoreError::Storage(format!(
            "failed to move snapshot into place at {}: {e}",
            path.display()
        ))
    })
}

fn load_snapshot(path: &Path, inner: &mut StoreInner) -> Result<(), PolystoreError> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let mut r = BufReader::new(file);

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != SNAPSHOT_MAGIC {
        return Err(PolystoreError::Storage(format!(
            "{} is not a polystore snapshot",
            path.display()
        )));
    }
    let mut ver = [0u8; 4];
    r.read_exact(&mut ver)?;
    let format = u32::from_le_bytes(ver);
    if format != SNAPSHOT_FORMAT_VERSION {
        return Err(PolystoreError::Storage(format!(
            "unsupported snapshot format {format}"
        )));
    }

    let mut count_buf = [0u8; 8];
    r.read_exact(&mut count_buf)?;
    let count = u64::from_le_bytes(count_buf);

    for _ in 0..count {
        let key = read_segment(&mut r)?;
        let key = String::from_utf8(key)?;
        let value = read_segment(&mut r)?;
        // Baseline versions carry seq 0: committed before any new snapshot.
        inner.apply(key, Some(value), 0);
    }
    Ok(())
}

fn read_segment(r: &mut impl Read) -> Result<Vec<u8>, PolystoreError> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_del() {
        let store = KvStore::in_memory();
        assert_eq!(store.get("a").unwrap(), None);

        store.put("a", b"1".to_vec()).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));

        store.put("a", b"2".to_vec()).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"2".to_vec()));

        store.del("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn test_scan_prefix_order_and_early_stop() {
        let store = KvStore::in_memory();
        store.put("t:b", b"2".to_vec()).unwrap();
        store.put("t:a", b"1".to_vec()).unwrap();
        store.put("t:c", b"3".to_vec()).unwrap();
        store.put("u:x", b"9".to_vec()).unwrap();

        let pairs = store.scan_prefix_collect("t:").unwrap();
        let keys: Vec<_> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["t:a", "t:b", "t:c"]);

        let mut seen = Vec::new();
        store
            .scan_prefix("t:", |key, _| {
                seen.push(key.to_string());
                seen.len() < 2
            })
            .unwrap();
        assert_eq!(seen, vec!["t:a", "t:b"]);
    }

    #[test]
    fn test_scan_skips_tombstones() {
        let store = KvStore::in_memory();
        store.put("t:a", b"1".to_vec()).unwrap();
        store.put("t:b", b"2".to_vec()).unwrap();
        store.del("t:a").unwrap();

        let pairs = store.scan_prefix_collect("t:").unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "t:b");
    }

    #[test]
    fn test_apply_batch_shares_one_commit_seq() {
        let store = KvStore::in_memory();
        let mut batch = store.new_batch();
        batch.put("a", b"1".to_vec());
        batch.put("b", b"2".to_vec());
        batch.delete("c");
        store.apply_batch(batch).unwrap();

        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("b").unwrap(), Some(b"2".to_vec()));

        let inner = store.shared.inner.read().unwrap();
        assert_eq!(
            inner.versions.get("a").unwrap().last().unwrap().seq,
            inner.versions.get("b").unwrap().last().unwrap().seq
        );
    }

    #[test]
    fn test_direct_write_respects_transaction_lock() {
        let store = KvStore::in_memory();
        let mut txn = store.begin_transaction(IsolationLevel::Snapshot).unwrap();
        txn.put("hot", b"tx".to_vec()).unwrap();

        let err = store.put("hot", b"direct".to_vec()).unwrap_err();
        assert!(err.is_conflict());

        let mut batch = store.new_batch();
        batch.put("hot", b"batched".to_vec());
        assert!(store.apply_batch(batch).unwrap_err().is_conflict());

        txn.rollback();
        store.put("hot", b"direct".to_vec()).unwrap();
        assert_eq!(store.get("hot").unwrap(), Some(b"direct".to_vec()));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = KvStore::open(dir.path()).unwrap();
            store.put("users:alice", b"payload".to_vec()).unwrap();
            store.put("users:bob", b"other".to_vec()).unwrap();
            store.del("users:bob").unwrap();
            store.flush().unwrap();
        }
        let store = KvStore::open(dir.path()).unwrap();
        assert_eq!(store.get("users:alice").unwrap(), Some(b"payload".to_vec()));
        assert_eq!(store.get("users:bob").unwrap(), None);
    }

    #[test]
    fn test_open_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SNAPSHOT_FILE), b"not a snapshot").unwrap();
        assert!(KvStore::open(dir.path()).is_err());
    }
}
