use crate::core::common::PolystoreError;
use crate::core::config::Config;
use crate::core::entity::{codec, Entity};
use crate::core::graph::{GraphAnalytics, GraphIndexManager};
use crate::core::index::SecondaryIndexManager;
use crate::core::keys;
use crate::core::storage::{IsolationLevel, KvStore, WriteBatch};
use crate::core::transaction::TransactionManager;
use crate::core::vector::{Metric, VectorIndexManager};
use std::path::Path;
use std::sync::Arc;

/// `Polystore` is the primary structure providing the public API for the
/// multi-model engine.
///
/// It bundles the shared key-value store with the secondary, graph, and
/// vector index managers and the transaction manager, all over one
/// keyspace. Every manager is also reachable directly for callers that
/// need the full per-component surface.
#[derive(Debug)]
pub struct Polystore {
    db: Arc<KvStore>,
    secondary: Arc<SecondaryIndexManager>,
    graph: Arc<GraphIndexManager>,
    vector: Arc<VectorIndexManager>,
    transactions: TransactionManager,
    config: Config,
}

impl Polystore {
    /// Open (or create) an engine persisted under the configured data
    /// directory.
    ///
    /// # Errors
    /// Returns `PolystoreError` when the store cannot be opened or the
    /// configuration is invalid.
    pub fn with_config(config: Config) -> Result<Self, PolystoreError> {
        let db = Arc::new(KvStore::open(config.data_path())?);
        Self::build(db, config)
    }

    /// Open (or create) an engine under `dir` with default configuration.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, PolystoreError> {
        let config = Config {
            data_dir: dir.as_ref().to_string_lossy().into_owned(),
            ..Config::default()
        };
        Self::with_config(config)
    }

    /// A purely in-memory engine (tests, ephemeral workloads).
    pub fn in_memory() -> Result<Self, PolystoreError> {
        Self::build(Arc::new(KvStore::in_memory()), Config::default())
    }

    fn build(db: Arc<KvStore>, config: Config) -> Result<Self, PolystoreError> {
        let default_isolation = IsolationLevel::from_name(&config.default_isolation_level)
            .ok_or_else(|| {
                PolystoreError::Config(format!(
                    "unknown isolation level '{}'",
                    config.default_isolation_level
                ))
            })?;

        let secondary = Arc::new(SecondaryIndexManager::new(Arc::clone(&db))?);
        let graph = Arc::new(GraphIndexManager::new(Arc::clone(&db)));
        graph.rebuild_topology()?;
        let vector = Arc::new(VectorIndexManager::new(Arc::clone(&db)));
        let transactions = TransactionManager::with_default_isolation(
            Arc::clone(&db),
            Arc::clone(&secondary),
            Arc::clone(&graph),
            Arc::clone(&vector),
            default_isolation,
        );
        Ok(Self { db, secondary, graph, vector, transactions, config })
    }

    /// Initialize the vector namespace with this engine's configured HNSW
    /// defaults.
    pub fn init_vectors(
        &self,
        namespace: &str,
        dimension: usize,
        metric: Metric,
    ) -> Result<(), PolystoreError> {
        self.vector.init(
            namespace,
            dimension,
            metric,
            self.config.vector_m,
            self.config.vector_ef_construction,
            self.config.vector_ef_search,
            None,
        )
    }

    // --- component accessors ---

    /// The shared key-value store.
    #[must_use]
    pub fn store(&self) -> &Arc<KvStore> {
        &self.db
    }

    /// The secondary index manager.
    #[must_use]
    pub fn indexes(&self) -> &Arc<SecondaryIndexManager> {
        &self.secondary
    }

    /// The graph index manager.
    #[must_use]
    pub fn graph(&self) -> &Arc<GraphIndexManager> {
        &self.graph
    }

    /// An analytics view (centrality, PageRank, communities) over the graph.
    #[must_use]
    pub fn graph_analytics(&self) -> GraphAnalytics {
        GraphAnalytics::new(Arc::clone(&self.graph))
    }

    /// The vector index manager.
    #[must_use]
    pub fn vectors(&self) -> &Arc<VectorIndexManager> {
        &self.vector
    }

    /// The transaction manager.
    #[must_use]
    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    // --- raw KV passthrough ---

    /// Point read against the latest committed state.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PolystoreError> {
        self.db.get(key)
    }

    /// Unconditional write outside any transaction.
    pub fn put(&self, key: &str, value: Vec<u8>) -> Result<(), PolystoreError> {
        self.db.put(key, value)
    }

    /// Unconditional delete outside any transaction.
    pub fn del(&self, key: &str) -> Result<(), PolystoreError> {
        self.db.del(key)
    }

    /// Prefix scan over the latest committed state.
    pub fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, PolystoreError> {
        self.db.scan_prefix_collect(prefix)
    }

    /// A fresh write-batch accumulator for [`apply_batch`](Self::apply_batch).
    #[must_use]
    pub fn new_batch(&self) -> WriteBatch {
        self.db.new_batch()
    }

    /// Apply a batch atomically.
    pub fn apply_batch(&self, batch: WriteBatch) -> Result<(), PolystoreError> {
        self.db.apply_batch(batch)
    }

    // --- auto-commit entity helpers ---

    /// Write an entity row and its index entries outside a transaction.
    pub fn put_entity(&self, table: &str, entity: &Entity) -> Result<(), PolystoreError> {
        self.secondary.put(table, entity)?;
        self.db.put(&keys::relational(table, entity.pk()), codec::serialize(entity))
    }

    /// Read an entity from the latest committed state.
    pub fn get_entity(&self, table: &str, pk: &str) -> Result<Option<Entity>, PolystoreError> {
        match self.db.get(&keys::relational(table, pk))? {
            Some(bytes) => Ok(Some(codec::deserialize(pk, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete an entity row and cascade its index entries.
    pub fn erase_entity(&self, table: &str, pk: &str) -> Result<(), PolystoreError> {
        self.secondary.erase(table, pk)?;
        self.db.del(&keys::relational(table, pk))
    }

    // --- opaque configuration blobs ---

    /// Store a JSON configuration blob under `config:<name>`. The engine
    /// does not interpret it.
    pub fn put_config_blob(
        &self,
        name: &str,
        value: &serde_json::Value,
    ) -> Result<(), PolystoreError> {
        self.db.put(&keys::config(name), serde_json::to_vec(value)?)
    }

    /// Fetch a previously stored configuration blob.
    pub fn get_config_blob(&self, name: &str) -> Result<Option<serde_json::Value>, PolystoreError> {
        match self.db.get(&keys::config(name))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Flush the store and save the vector index if auto-save is on.
    pub fn shutdown(&self) -> Result<(), PolystoreError> {
        if self.vector.stats().is_ok() {
            self.vector.shutdown()?;
        }
        self.db.flush()
    }
}
