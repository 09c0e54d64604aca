//! Session-scoped transaction management
//!
//! A [`Transaction`] wraps one storage transaction plus a SAGA ledger and
//! fans logical operations out to the index managers: the KV mutations
//! enroll in the write set, the in-memory side effects (graph mirror, vector
//! cache/ANN) happen inline and register compensating steps.
//!
//! The [`TransactionManager`] owns the active and completed session tables,
//! allocates ids, and keeps statistics. A transaction id is in at most one
//! of the two tables at any instant; both moves happen under one mutex.

use crate::core::common::lock_utils::LockResultExt;
use crate::core::common::PolystoreError;
use crate::core::entity::{codec, Entity};
use crate::core::graph::GraphIndexManager;
use crate::core::index::SecondaryIndexManager;
use crate::core::keys;
use crate::core::storage::{IsolationLevel, KvStore, KvTransaction};
use crate::core::transaction::saga::Saga;
use crate::core::vector::VectorIndexManager;
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Aggregate transaction statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionStats {
    pub total_begun: u64,
    pub total_committed: u64,
    pub total_aborted: u64,
    pub active_count: usize,
    pub completed_count: usize,
    pub avg_duration_ms: u64,
    pub max_duration_ms: u64,
}

/// Record kept for a finished transaction (statistics + TTL eviction).
#[derive(Debug, Clone)]
struct CompletedTransaction {
    started_at: DateTime<Utc>,
    duration_ms: u64,
    committed: bool,
}

/// A multi-model transaction.
pub struct Transaction {
    id: u64,
    isolation: IsolationLevel,
    started_at: DateTime<Utc>,
    begun: Instant,
    kv: KvTransaction,
    saga: Saga,
    secondary: Arc<SecondaryIndexManager>,
    graph: Arc<GraphIndexManager>,
    vector: Arc<VectorIndexManager>,
    finished: bool,
}

impl Transaction {
    fn new(
        id: u64,
        kv: KvTransaction,
        secondary: Arc<SecondaryIndexManager>,
        graph: Arc<GraphIndexManager>,
        vector: Arc<VectorIndexManager>,
    ) -> Self {
        let isolation = kv.isolation();
        Self {
            id,
            isolation,
            started_at: Utc::now(),
            begun: Instant::now(),
            kv,
            saga: Saga::new(),
            secondary,
            graph,
            vector,
            finished: false,
        }
    }

    /// The session-level transaction id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The isolation level chosen at begin.
    #[must_use]
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Wall-clock begin time.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Milliseconds since begin.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.begun.elapsed().as_millis() as u64
    }

    /// True once committed or rolled back.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The compensation ledger (diagnostics).
    #[must_use]
    pub fn saga(&self) -> &Saga {
        &self.saga
    }

    fn ensure_active(&self) -> Result<(), PolystoreError> {
        if self.finished {
            return Err(PolystoreError::Transaction(format!(
                "transaction {} is already finished",
                self.id
            )));
        }
        Ok(())
    }

    // --- relational ---

    /// Write an entity row and maintain its secondary index entries.
    pub fn put_entity(&mut self, table: &str, entity: &Entity) -> Result<(), PolystoreError> {
        self.ensure_active()?;
        // Index maintenance first: it reads the pre-image row.
        self.secondary.put_tx(table, entity, &mut self.kv)?;
        self.kv.put(&keys::relational(table, entity.pk()), codec::serialize(entity))
    }

    /// Delete an entity row and cascade its index entries.
    pub fn erase_entity(&mut self, table: &str, pk: &str) -> Result<(), PolystoreError> {
        self.ensure_active()?;
        self.secondary.erase_tx(table, pk, &mut self.kv)?;
        self.kv.del(&keys::relational(table, pk))
    }

    /// Read an entity through this transaction's view.
    pub fn get_entity(&self, table: &str, pk: &str) -> Result<Option<Entity>, PolystoreError> {
        self.ensure_active()?;
        match self.kv.get(&keys::relational(table, pk))? {
            Some(bytes) => Ok(Some(codec::deserialize(pk, &bytes)?)),
            None => Ok(None),
        }
    }

    // --- graph ---

    /// Add a directed edge; the adjacency mirror is updated inline with a
    /// compensating step.
    pub fn add_edge(&mut self, edge: &Entity) -> Result<(), PolystoreError> {
        self.ensure_active()?;
        self.graph.add_edge_tx(edge, &mut self.kv, &mut self.saga)
    }

    /// Delete an edge by id, mirror-compensated like `add_edge`.
    pub fn delete_edge(&mut self, edge_id: &str) -> Result<(), PolystoreError> {
        self.ensure_active()?;
        self.graph.delete_edge_tx(edge_id, &mut self.kv, &mut self.saga)
    }

    // --- vector ---

    /// Insert a vector-bearing entity into the vector namespace.
    pub fn add_vector(&mut self, entity: &Entity, vector_field: &str) -> Result<(), PolystoreError> {
        self.ensure_active()?;
        self.vector.add_entity_tx(entity, vector_field, &mut self.kv, &mut self.saga)
    }

    /// Replace an entity's vector; the pre-image is captured for restore.
    pub fn update_vector(
        &mut self,
        entity: &Entity,
        vector_field: &str,
    ) -> Result<(), PolystoreError> {
        self.ensure_active()?;
        self.vector.update_entity_tx(entity, vector_field, &mut self.kv, &mut self.saga)
    }

    /// Remove a PK from the vector namespace.
    pub fn remove_vector(&mut self, pk: &str) -> Result<(), PolystoreError> {
        self.ensure_active()?;
        self.vector.remove_by_pk_tx(pk, &mut self.kv, &mut self.saga)
    }

    // --- raw KV passthrough ---

    /// Raw read through the transaction's view.
    pub fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, PolystoreError> {
        self.ensure_active()?;
        self.kv.get(key)
    }

    /// Raw write enrolled in the transaction.
    pub fn put_raw(&mut self, key: &str, value: Vec<u8>) -> Result<(), PolystoreError> {
        self.ensure_active()?;
        self.kv.put(key, value)
    }

    /// Raw delete enrolled in the transaction.
    pub fn del_raw(&mut self, key: &str) -> Result<(), PolystoreError> {
        self.ensure_active()?;
        self.kv.del(key)
    }

    // --- completion ---

    /// Attempt the KV commit. Success clears the ledger; a conflict rolls
    /// the KV transaction back and runs compensation, leaving every
    /// structure in its pre-transaction state.
    pub fn commit(&mut self) -> Result<(), PolystoreError> {
        self.ensure_active()?;
        self.finished = true;
        match self.kv.commit() {
            Ok(()) => {
                self.saga.clear();
                Ok(())
            }
            Err(e) => {
                self.saga.compensate();
                Err(e)
            }
        }
    }

    /// Roll back: discard the write set and run compensation.
    pub fn rollback(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.kv.rollback();
        self.saga.compensate();
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            warn!("transaction {} dropped while active; rolling back", self.id);
            self.rollback();
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("isolation", &self.isolation)
            .field("finished", &self.finished)
            .field("saga_steps", &self.saga.step_count())
            .finish()
    }
}

#[derive(Debug, Default)]
struct Sessions {
    active: HashMap<u64, Arc<Mutex<Transaction>>>,
    completed: HashMap<u64, CompletedTransaction>,
}

/// Session table, id allocation, and statistics for all transactions.
#[derive(Debug)]
pub struct TransactionManager {
    db: Arc<KvStore>,
    secondary: Arc<SecondaryIndexManager>,
    graph: Arc<GraphIndexManager>,
    vector: Arc<VectorIndexManager>,
    sessions: Mutex<Sessions>,
    next_id: AtomicU64,
    default_isolation: IsolationLevel,
    total_begun: AtomicU64,
    total_committed: AtomicU64,
    total_aborted: AtomicU64,
}

impl TransactionManager {
    /// Create a manager over the shared store and index managers.
    #[must_use]
    pub fn new(
        db: Arc<KvStore>,
        secondary: Arc<SecondaryIndexManager>,
        graph: Arc<GraphIndexManager>,
        vector: Arc<VectorIndexManager>,
    ) -> Self {
        Self::with_default_isolation(db, secondary, graph, vector, IsolationLevel::Snapshot)
    }

    /// Same, with an explicit default isolation level for
    /// [`begin_default`](Self::begin_default).
    #[must_use]
    pub fn with_default_isolation(
        db: Arc<KvStore>,
        secondary: Arc<SecondaryIndexManager>,
        graph: Arc<GraphIndexManager>,
        vector: Arc<VectorIndexManager>,
        default_isolation: IsolationLevel,
    ) -> Self {
        Self {
            db,
            secondary,
            graph,
            vector,
            sessions: Mutex::new(Sessions::default()),
            next_id: AtomicU64::new(1),
            default_isolation,
            total_begun: AtomicU64::new(0),
            total_committed: AtomicU64::new(0),
            total_aborted: AtomicU64::new(0),
        }
    }

    /// Begin a transaction and register it in the active table.
    pub fn begin_transaction(&self, isolation: IsolationLevel) -> Result<u64, PolystoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let kv = self.db.begin_transaction(isolation)?;
        let txn = Transaction::new(
            id,
            kv,
            Arc::clone(&self.secondary),
            Arc::clone(&self.graph),
            Arc::clone(&self.vector),
        );

        {
            let mut sessions = self.sessions.lock().or_poisoned("transaction sessions")?;
            sessions.active.insert(id, Arc::new(Mutex::new(txn)));
        }
        self.total_begun.fetch_add(1, Ordering::Relaxed);
        info!("transaction {id} begun (isolation: {})", isolation.name());
        Ok(id)
    }

    /// Begin with the manager's default isolation level.
    pub fn begin_default(&self) -> Result<u64, PolystoreError> {
        self.begin_transaction(self.default_isolation)
    }

    /// Handle of an active transaction, if any.
    #[must_use]
    pub fn get_transaction(&self, id: u64) -> Option<Arc<Mutex<Transaction>>> {
        let sessions = self.sessions.lock().ok()?;
        sessions.active.get(&id).cloned()
    }

    /// Commit an active transaction and move it to the completed table.
    /// Unknown or already-completed ids are an error.
    pub fn commit_transaction(&self, id: u64) -> Result<(), PolystoreError> {
        let handle = self.get_transaction(id).ok_or_else(|| {
            PolystoreError::TransactionNotFound(format!(
                "transaction {id} not found or already completed"
            ))
        })?;

        let (result, duration_ms, started_at) = {
            let mut txn = handle.lock().or_poisoned("transaction")?;
            let result = txn.commit();
            (result, txn.duration_ms(), txn.started_at())
        };

        match &result {
            Ok(()) => {
                self.total_committed.fetch_add(1, Ordering::Relaxed);
                info!("transaction {id} committed (duration: {duration_ms} ms)");
            }
            Err(e) => {
                self.total_aborted.fetch_add(1, Ordering::Relaxed);
                warn!("transaction {id} commit failed: {e}");
            }
        }
        self.move_to_completed(id, started_at, duration_ms, result.is_ok())?;
        result
    }

    /// Roll back an active transaction. Unknown ids are a no-op (the
    /// transaction may have completed concurrently).
    pub fn rollback_transaction(&self, id: u64) -> Result<(), PolystoreError> {
        let Some(handle) = self.get_transaction(id) else {
            return Ok(());
        };

        let (duration_ms, started_at) = {
            let mut txn = handle.lock().or_poisoned("transaction")?;
            txn.rollback();
            (txn.duration_ms(), txn.started_at())
        };

        self.total_aborted.fetch_add(1, Ordering::Relaxed);
        info!("transaction {id} rolled back (duration: {duration_ms} ms)");
        self.move_to_completed(id, started_at, duration_ms, false)
    }

    fn move_to_completed(
        &self,
        id: u64,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        committed: bool,
    ) -> Result<(), PolystoreError> {
        let mut sessions = self.sessions.lock().or_poisoned("transaction sessions")?;
        if sessions.active.remove(&id).is_some() {
            sessions
                .completed
                .insert(id, CompletedTransaction { started_at, duration_ms, committed });
        }
        Ok(())
    }

    /// Evict completed-transaction records whose begin time is older than
    /// `max_age`. Active transactions are never touched.
    pub fn cleanup_old_transactions(&self, max_age: Duration) -> Result<usize, PolystoreError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age)
                .map_err(|e| PolystoreError::InvalidArgument(format!("max_age out of range: {e}")))?;
        let mut sessions = self.sessions.lock().or_poisoned("transaction sessions")?;
        let before = sessions.completed.len();
        sessions.completed.retain(|_, record| record.started_at >= cutoff);
        Ok(before - sessions.completed.len())
    }

    /// Aggregate statistics over all transactions seen so far.
    pub fn stats(&self) -> Result<TransactionStats, PolystoreError> {
        let sessions = self.sessions.lock().or_poisoned("transaction sessions")?;
        let mut total_duration = 0u64;
        let mut max_duration = 0u64;
        for record in sessions.completed.values() {
            total_duration += record.duration_ms;
            max_duration = max_duration.max(record.duration_ms);
        }
        let completed_count = sessions.completed.len();
        Ok(TransactionStats {
            total_begun: self.total_begun.load(Ordering::Relaxed),
            total_committed: self.total_committed.load(Ordering::Relaxed),
            total_aborted: self.total_aborted.load(Ordering::Relaxed),
            active_count: sessions.active.len(),
            completed_count,
            avg_duration_ms: if completed_count > 0 {
                total_duration / completed_count as u64
            } else {
                0
            },
            max_duration_ms: max_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::Value;
    use crate::core::index::IndexDef;
    use crate::core::vector::manager::DEFAULT_VECTOR_FIELD;
    use crate::core::vector::Metric;

    struct Engine {
        db: Arc<KvStore>,
        graph: Arc<GraphIndexManager>,
        vector: Arc<VectorIndexManager>,
        secondary: Arc<SecondaryIndexManager>,
        transactions: TransactionManager,
    }

    fn engine() -> Engine {
        let db = Arc::new(KvStore::in_memory());
        let secondary = Arc::new(SecondaryIndexManager::new(Arc::clone(&db)).unwrap());
        let graph = Arc::new(GraphIndexManager::new(Arc::clone(&db)));
        graph.rebuild_topology().unwrap();
        let vector = Arc::new(VectorIndexManager::new(Arc::clone(&db)));
        vector.init("documents", 2, Metric::L2, 8, 32, 16, None).unwrap();
        let transactions = TransactionManager::new(
            Arc::clone(&db),
            Arc::clone(&secondary),
            Arc::clone(&graph),
            Arc::clone(&vector),
        );
        Engine { db, graph, vector, secondary, transactions }
    }

    fn with_txn<R>(engine: &Engine, id: u64, f: impl FnOnce(&mut Transaction) -> R) -> R {
        let handle = engine.transactions.get_transaction(id).unwrap();
        let mut txn = handle.lock().unwrap();
        f(&mut txn)
    }

    #[test]
    fn test_commit_publishes_entity_and_index() {
        let e = engine();
        e.secondary.create_index(IndexDef::regular("users", "name", false)).unwrap();

        let id = e.transactions.begin_transaction(IsolationLevel::Snapshot).unwrap();
        with_txn(&e, id, |txn| {
            let alice = Entity::new("alice")
                .with_field("name", Value::Str("Alice".into()))
                .with_field("age", Value::Int(30));
            txn.put_entity("users", &alice).unwrap();
        });
        e.transactions.commit_transaction(id).unwrap();

        assert_eq!(
            e.secondary.scan_keys_equal("users", "name", "Alice").unwrap(),
            vec!["alice"]
        );
        let bytes = e.db.get("users:alice").unwrap().unwrap();
        let entity = codec::deserialize("alice", &bytes).unwrap();
        assert_eq!(entity.get_i64("age"), Some(30));
    }

    #[test]
    fn test_rollback_leaves_no_trace() {
        let e = engine();
        e.secondary.create_index(IndexDef::regular("users", "email", true)).unwrap();

        let id = e.transactions.begin_transaction(IsolationLevel::Snapshot).unwrap();
        with_txn(&e, id, |txn| {
            let u1 = Entity::new("u1").with_field("email", Value::Str("x@y".into()));
            txn.put_entity("users", &u1).unwrap();
            // Second insert with the same unique value fails.
            let u2 = Entity::new("u2").with_field("email", Value::Str("x@y".into()));
            let err = txn.put_entity("users", &u2).unwrap_err();
            assert!(matches!(err, PolystoreError::UniqueViolation(_)));
        });
        e.transactions.rollback_transaction(id).unwrap();

        assert!(e.secondary.scan_keys_equal("users", "email", "x@y").unwrap().is_empty());
        assert!(e.db.get("users:u1").unwrap().is_none());
    }

    #[test]
    fn test_erase_entity_cascades_index() {
        let e = engine();
        e.secondary.create_index(IndexDef::regular("users", "name", false)).unwrap();

        let id = e.transactions.begin_transaction(IsolationLevel::Snapshot).unwrap();
        with_txn(&e, id, |txn| {
            let alice = Entity::new("alice").with_field("name", Value::Str("Alice".into()));
            txn.put_entity("users", &alice).unwrap();
        });
        e.transactions.commit_transaction(id).unwrap();

        let id = e.transactions.begin_transaction(IsolationLevel::Snapshot).unwrap();
        with_txn(&e, id, |txn| txn.erase_entity("users", "alice").unwrap());
        e.transactions.commit_transaction(id).unwrap();

        assert!(e.secondary.scan_keys_equal("users", "name", "Alice").unwrap().is_empty());
        assert!(e.db.get("users:alice").unwrap().is_none());
    }

    #[test]
    fn test_saga_restores_graph_mirror_on_rollback() {
        let e = engine();

        let id = e.transactions.begin_transaction(IsolationLevel::Snapshot).unwrap();
        with_txn(&e, id, |txn| {
            txn.add_edge(&Entity::edge("ab", "A", "B")).unwrap();
            txn.add_edge(&Entity::edge("bc", "B", "C")).unwrap();
            // Mirror reflects uncommitted edges inline.
            assert_eq!(e.graph.out_neighbors("A").unwrap(), vec!["B"]);
            assert_eq!(e.graph.out_neighbors("B").unwrap(), vec!["C"]);
        });
        e.transactions.rollback_transaction(id).unwrap();

        assert_eq!(e.graph.out_neighbors("A").unwrap(), Vec::<String>::new());
        assert_eq!(e.graph.out_neighbors("B").unwrap(), Vec::<String>::new());
        // Nothing persisted either.
        assert!(e.db.get("graph:edge:ab").unwrap().is_none());
    }

    #[test]
    fn test_saga_restores_mirror_on_failed_commit() {
        let e = engine();
        // Pre-commit a key, then race it: txn snapshots, another writer
        // commits the key, txn writes it late and fails validation.
        e.db.put("hot", b"v0".to_vec()).unwrap();

        let id = e.transactions.begin_transaction(IsolationLevel::Snapshot).unwrap();
        e.db.put("hot", b"v1".to_vec()).unwrap();

        with_txn(&e, id, |txn| {
            txn.add_edge(&Entity::edge("ab", "A", "B")).unwrap();
            assert_eq!(e.graph.out_neighbors("A").unwrap(), vec!["B"]);
            txn.put_raw("hot", b"v2".to_vec()).unwrap();
        });

        let err = e.transactions.commit_transaction(id).unwrap_err();
        assert!(err.is_conflict());

        // Mirror restored by compensation; persistent state untouched.
        assert!(e.graph.out_neighbors("A").unwrap().is_empty());
        assert!(e.db.get("graph:edge:ab").unwrap().is_none());
        assert_eq!(e.db.get("hot").unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn test_vector_ops_compensate_on_rollback() {
        let e = engine();
        let id = e.transactions.begin_transaction(IsolationLevel::Snapshot).unwrap();
        with_txn(&e, id, |txn| {
            let d = Entity::new("d1")
                .with_field(DEFAULT_VECTOR_FIELD, Value::FloatVec(vec![1.0, 0.0]));
            txn.add_vector(&d, DEFAULT_VECTOR_FIELD).unwrap();
        });
        assert_eq!(e.vector.search_knn(&[1.0, 0.0], 1, None).unwrap().len(), 1);

        e.transactions.rollback_transaction(id).unwrap();
        assert!(e.vector.search_knn(&[1.0, 0.0], 1, None).unwrap().is_empty());
    }

    #[test]
    fn test_delete_edge_compensation_restores_mirror() {
        let e = engine();
        e.graph.add_edge(&Entity::edge("ab", "A", "B")).unwrap();

        let id = e.transactions.begin_transaction(IsolationLevel::Snapshot).unwrap();
        with_txn(&e, id, |txn| {
            txn.delete_edge("ab").unwrap();
            assert!(e.graph.out_neighbors("A").unwrap().is_empty());
        });
        e.transactions.rollback_transaction(id).unwrap();

        assert_eq!(e.graph.out_neighbors("A").unwrap(), vec!["B"]);
        assert!(e.db.get("graph:edge:ab").unwrap().is_some());
    }

    #[test]
    fn test_empty_transaction_commits() {
        let e = engine();
        let id = e.transactions.begin_transaction(IsolationLevel::Snapshot).unwrap();
        e.transactions.commit_transaction(id).unwrap();

        let stats = e.transactions.stats().unwrap();
        assert_eq!(stats.total_begun, 1);
        assert_eq!(stats.total_committed, 1);
        assert_eq!(stats.active_count, 0);
        assert_eq!(stats.completed_count, 1);
    }

    #[test]
    fn test_session_uniqueness() {
        let e = engine();
        let id = e.transactions.begin_transaction(IsolationLevel::Snapshot).unwrap();
        assert!(e.transactions.get_transaction(id).is_some());

        e.transactions.commit_transaction(id).unwrap();
        assert!(e.transactions.get_transaction(id).is_none());

        // Second commit of the same id is an error.
        assert!(matches!(
            e.transactions.commit_transaction(id),
            Err(PolystoreError::TransactionNotFound(_))
        ));
        // Rollback of an unknown id is a no-op.
        e.transactions.rollback_transaction(id).unwrap();
        e.transactions.rollback_transaction(9999).unwrap();
    }

    #[test]
    fn test_stats_counters() {
        let e = engine();
        let a = e.transactions.begin_transaction(IsolationLevel::Snapshot).unwrap();
        let b = e.transactions.begin_transaction(IsolationLevel::ReadCommitted).unwrap();
        let c = e.transactions.begin_transaction(IsolationLevel::Snapshot).unwrap();

        e.transactions.commit_transaction(a).unwrap();
        e.transactions.rollback_transaction(b).unwrap();

        let stats = e.transactions.stats().unwrap();
        assert_eq!(stats.total_begun, 3);
        assert_eq!(stats.total_committed, 1);
        assert_eq!(stats.total_aborted, 1);
        assert_eq!(stats.active_count, 1);
        assert_eq!(stats.completed_count, 2);

        e.transactions.rollback_transaction(c).unwrap();
    }

    #[test]
    fn test_cleanup_evicts_only_old_completed() {
        let e = engine();
        let id = e.transactions.begin_transaction(IsolationLevel::Snapshot).unwrap();
        e.transactions.commit_transaction(id).unwrap();
        let active = e.transactions.begin_transaction(IsolationLevel::Snapshot).unwrap();

        // Everything is fresh: a 1-hour TTL evicts nothing.
        assert_eq!(e.transactions.cleanup_old_transactions(Duration::from_secs(3600)).unwrap(), 0);
        // A zero TTL evicts the completed record but leaves the active one.
        assert_eq!(e.transactions.cleanup_old_transactions(Duration::ZERO).unwrap(), 1);
        assert!(e.transactions.get_transaction(active).is_some());

        e.transactions.rollback_transaction(active).unwrap();
    }

    #[test]
    fn test_snapshot_isolation_across_manager() {
        let e = engine();
        e.db.put("users:alice", b"v0".to_vec()).unwrap();

        let id = e.transactions.begin_transaction(IsolationLevel::Snapshot).unwrap();
        e.db.put("users:alice", b"v1".to_vec()).unwrap();

        with_txn(&e, id, |txn| {
            assert_eq!(txn.get_raw("users:alice").unwrap(), Some(b"v0".to_vec()));
        });
        e.transactions.rollback_transaction(id).unwrap();
    }

    #[test]
    fn test_operations_rejected_after_finish() {
        let e = engine();
        let id = e.transactions.begin_transaction(IsolationLevel::Snapshot).unwrap();
        let handle = e.transactions.get_transaction(id).unwrap();
        e.transactions.commit_transaction(id).unwrap();

        let mut txn = handle.lock().unwrap();
        assert!(txn.put_entity("users", &Entity::new("x")).is_err());
        assert!(txn.add_edge(&Entity::edge("e", "a", "b")).is_err());
        assert!(txn.commit().is_err());
    }
}
