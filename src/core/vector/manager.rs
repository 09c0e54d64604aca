//! Vector index manager
//!
//! One manager serves one namespace: a set of vector-bearing entities
//! persisted under `namespace:pk`, a `pk ↔ label` bijection, a vector cache,
//! and an HNSW structure over the labels. Updates tombstone the old label
//! and assign a fresh one, so within the namespace every PK maps to at most
//! one live label.
//!
//! All in-memory state sits behind one mutex; transaction-enrolled variants
//! mutate it inline and register compensating steps with the caller's saga.

use crate::core::common::lock_utils::LockResultExt;
use crate::core::common::PolystoreError;
use crate::core::entity::{codec, Entity};
use crate::core::keys;
use crate::core::storage::{KvStore, KvTransaction};
use crate::core::transaction::saga::Saga;
use crate::core::vector::distance::{normalize_l2, Metric};
use crate::core::vector::hnsw::HnswGraph;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Default entity field holding the vector.
pub const DEFAULT_VECTOR_FIELD: &str = "embedding";

const HNSW_FILE: &str = "hnsw.bin";
const MAPPING_FILE: &str = "mapping.txt";
const META_FILE: &str = "meta.json";

/// One KNN hit: primary key and distance (smaller is closer).
pub type KnnResult = (String, f32);

/// Configuration and population summary of the namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorStats {
    pub namespace: String,
    pub dimension: usize,
    pub metric: Metric,
    pub count: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

/// The persisted metadata file.
#[derive(Debug, Serialize, Deserialize)]
struct VectorIndexMeta {
    namespace: String,
    dimension: usize,
    metric: Metric,
    m: usize,
    ef_construction: usize,
    ef_search: usize,
}

#[derive(Debug, Default)]
struct VectorState {
    initialized: bool,
    namespace: String,
    dim: usize,
    metric: Option<Metric>,
    m: usize,
    ef_construction: usize,
    ef_search: usize,
    save_path: Option<PathBuf>,
    auto_save: bool,
    pk_to_label: HashMap<String, usize>,
    /// Label → live PK; tombstoned labels hold `None`.
    label_to_pk: Vec<Option<String>>,
    cache: HashMap<String, Vec<f32>>,
    hnsw: Option<HnswGraph>,
}

impl VectorState {
    fn metric(&self) -> Metric {
        self.metric.unwrap_or(Metric::Cosine)
    }

    fn prepare(&self, raw: &[f32]) -> Result<Vec<f32>, PolystoreError> {
        if raw.len() != self.dim {
            return Err(PolystoreError::VectorDimensionMismatch {
                expected: self.dim,
                actual: raw.len(),
            });
        }
        let mut v = raw.to_vec();
        if self.metric() == Metric::Cosine {
            // Normalized on insert: the cached form carries the norm.
            normalize_l2(&mut v);
        }
        Ok(v)
    }

    fn insert_live(&mut self, pk: &str, vector: Vec<f32>) -> Result<usize, PolystoreError> {
        let label = self.label_to_pk.len();
        if let Some(hnsw) = self.hnsw.as_mut() {
            hnsw.insert(label, vector.clone())?;
        }
        self.label_to_pk.push(Some(pk.to_string()));
        self.pk_to_label.insert(pk.to_string(), label);
        self.cache.insert(pk.to_string(), vector);
        Ok(label)
    }

    fn remove_live(&mut self, pk: &str) -> Option<Vec<f32>> {
        let label = self.pk_to_label.remove(pk)?;
        if let Some(slot) = self.label_to_pk.get_mut(label) {
            *slot = None;
        }
        if let Some(hnsw) = self.hnsw.as_mut() {
            hnsw.mark_deleted(label);
        }
        self.cache.remove(pk)
    }

    fn brute_force(
        &self,
        query: &[f32],
        k: usize,
        whitelist: Option<&[String]>,
    ) -> Result<Vec<KnnResult>, PolystoreError> {
        let metric = self.metric();
        let mut hits = Vec::new();
        match whitelist {
            Some(pks) => {
                for pk in pks {
                    if let Some(v) = self.cache.get(pk) {
                        hits.push((pk.clone(), metric.distance(query, v)?));
                    }
                }
            }
            None => {
                for (pk, v) in &self.cache {
                    hits.push((pk.clone(), metric.distance(query, v)?));
                }
            }
        }
        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }
}

fn sort_hits(hits: &mut [KnnResult]) {
    hits.sort_by(|a, b| {
        a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0))
    });
}

/// Removal tolerant against prior cleanup, for compensation closures.
fn evict_pk(state: &Mutex<VectorState>, pk: &str) -> Result<(), PolystoreError> {
    let mut state = state.lock().or_poisoned("vector state")?;
    state.remove_live(pk);
    Ok(())
}

/// (Re)insert a vector for a PK, replacing any current entry.
fn restore_vector(
    state: &Mutex<VectorState>,
    pk: &str,
    vector: Vec<f32>,
) -> Result<(), PolystoreError> {
    let mut state = state.lock().or_poisoned("vector state")?;
    state.remove_live(pk);
    state.insert_live(pk, vector)?;
    Ok(())
}

/// Manager for one vector namespace.
///
/// The state sits behind an `Arc` of its own so compensation closures can
/// capture it without keeping the whole manager alive.
#[derive(Debug)]
pub struct VectorIndexManager {
    db: Arc<KvStore>,
    state: Arc<Mutex<VectorState>>,
}

impl VectorIndexManager {
    /// An uninitialized manager; call [`init`](Self::init) before use.
    #[must_use]
    pub fn new(db: Arc<KvStore>) -> Self {
        Self { db, state: Arc::new(Mutex::new(VectorState::default())) }
    }

    /// Install the namespace configuration. Calling again with a matching
    /// configuration is idempotent (`ef_search` and the save path are
    /// runtime-adjustable and not compared); a conflicting configuration is
    /// an error.
    pub fn init(
        &self,
        namespace: &str,
        dim: usize,
        metric: Metric,
        m: usize,
        ef_construction: usize,
        ef_search: usize,
        save_path: Option<&Path>,
    ) -> Result<(), PolystoreError> {
        if namespace.is_empty() || dim == 0 {
            return Err(PolystoreError::InvalidArgument(
                "vector namespace and dimension must be non-empty".to_string(),
            ));
        }
        let mut state = self.state.lock().or_poisoned("vector state")?;
        if state.initialized {
            if state.namespace == namespace
                && state.dim == dim
                && state.metric() == metric
                && state.m == m
                && state.ef_construction == ef_construction
            {
                return Ok(());
            }
            return Err(PolystoreError::Vector(format!(
                "namespace '{}' already initialized with a different configuration",
                state.namespace
            )));
        }

        state.initialized = true;
        state.namespace = namespace.to_string();
        state.dim = dim;
        state.metric = Some(metric);
        state.m = m;
        state.ef_construction = ef_construction;
        state.ef_search = ef_search;
        state.save_path = save_path.map(Path::to_path_buf);
        state.hnsw = Some(HnswGraph::new(dim, m, ef_construction, metric));
        info!("vector namespace '{namespace}' initialized (dim {dim}, metric {})", metric.name());
        Ok(())
    }

    /// Configure automatic saving on shutdown.
    pub fn set_auto_save(
        &self,
        save_path: impl Into<PathBuf>,
        auto_save: bool,
    ) -> Result<(), PolystoreError> {
        let mut state = self.state.lock().or_poisoned("vector state")?;
        state.save_path = Some(save_path.into());
        state.auto_save = auto_save;
        Ok(())
    }

    /// Adjust the per-query beam width at runtime. Other HNSW parameters
    /// require a rebuild.
    pub fn set_ef_search(&self, ef_search: usize) -> Result<(), PolystoreError> {
        if ef_search == 0 {
            return Err(PolystoreError::InvalidArgument("ef_search must be positive".to_string()));
        }
        let mut state = self.state.lock().or_poisoned("vector state")?;
        self.ensure_initialized(&state)?;
        state.ef_search = ef_search;
        Ok(())
    }

    fn ensure_initialized(&self, state: &VectorState) -> Result<(), PolystoreError> {
        if state.initialized {
            Ok(())
        } else {
            Err(PolystoreError::Vector("vector namespace is not initialized".to_string()))
        }
    }

    fn extract_vector(
        state: &VectorState,
        entity: &Entity,
        vector_field: &str,
    ) -> Result<Vec<f32>, PolystoreError> {
        let raw = entity
            .get(vector_field)
            .and_then(crate::core::entity::Value::as_float_vec)
            .ok_or_else(|| {
                PolystoreError::InvalidArgument(format!(
                    "entity '{}' has no float-vector field '{vector_field}'",
                    entity.pk()
                ))
            })?;
        state.prepare(raw)
    }

    // --- direct CRUD ---

    /// Insert a new vector-bearing entity: persist it under `namespace:pk`,
    /// assign a fresh label, and index the vector. Adding an existing PK is
    /// an error; use [`update_entity`](Self::update_entity).
    pub fn add_entity(&self, entity: &Entity, vector_field: &str) -> Result<(), PolystoreError> {
        let mut state = self.state.lock().or_poisoned("vector state")?;
        self.ensure_initialized(&state)?;
        if state.pk_to_label.contains_key(entity.pk()) {
            return Err(PolystoreError::Vector(format!(
                "pk '{}' already present in namespace '{}'",
                entity.pk(),
                state.namespace
            )));
        }
        let vector = Self::extract_vector(&state, entity, vector_field)?;
        self.db.put(&keys::vector(&state.namespace, entity.pk()), codec::serialize(entity))?;
        state.insert_live(entity.pk(), vector)?;
        Ok(())
    }

    /// Replace an existing entity's vector: the old label is tombstoned and
    /// a fresh one assigned.
    pub fn update_entity(&self, entity: &Entity, vector_field: &str) -> Result<(), PolystoreError> {
        let mut state = self.state.lock().or_poisoned("vector state")?;
        self.ensure_initialized(&state)?;
        if !state.pk_to_label.contains_key(entity.pk()) {
            return Err(PolystoreError::NotFound(format!(
                "pk '{}' not present in namespace '{}'",
                entity.pk(),
                state.namespace
            )));
        }
        let vector = Self::extract_vector(&state, entity, vector_field)?;
        self.db.put(&keys::vector(&state.namespace, entity.pk()), codec::serialize(entity))?;
        state.remove_live(entity.pk());
        state.insert_live(entity.pk(), vector)?;
        Ok(())
    }

    /// Remove a PK: delete the persistent entity, evict the cache entry,
    /// tombstone the label. Removing an unknown PK is a no-op.
    pub fn remove_by_pk(&self, pk: &str) -> Result<(), PolystoreError> {
        let mut state = self.state.lock().or_poisoned("vector state")?;
        self.ensure_initialized(&state)?;
        self.db.del(&keys::vector(&state.namespace, pk))?;
        state.remove_live(pk);
        Ok(())
    }

    // --- batch-enrolled CRUD ---

    /// Batch-enrolled [`add_entity`](Self::add_entity): the KV write joins
    /// the caller's batch; cache and ANN mutate inline.
    pub fn add_entity_batch(
        &self,
        entity: &Entity,
        vector_field: &str,
        batch: &mut crate::core::storage::WriteBatch,
    ) -> Result<(), PolystoreError> {
        let mut state = self.state.lock().or_poisoned("vector state")?;
        self.ensure_initialized(&state)?;
        if state.pk_to_label.contains_key(entity.pk()) {
            return Err(PolystoreError::Vector(format!(
                "pk '{}' already present in namespace '{}'",
                entity.pk(),
                state.namespace
            )));
        }
        let vector = Self::extract_vector(&state, entity, vector_field)?;
        batch.put(keys::vector(&state.namespace, entity.pk()), codec::serialize(entity));
        state.insert_live(entity.pk(), vector)?;
        Ok(())
    }

    /// Batch-enrolled [`update_entity`](Self::update_entity).
    pub fn update_entity_batch(
        &self,
        entity: &Entity,
        vector_field: &str,
        batch: &mut crate::core::storage::WriteBatch,
    ) -> Result<(), PolystoreError> {
        let mut state = self.state.lock().or_poisoned("vector state")?;
        self.ensure_initialized(&state)?;
        if !state.pk_to_label.contains_key(entity.pk()) {
            return Err(PolystoreError::NotFound(format!(
                "pk '{}' not present in namespace '{}'",
                entity.pk(),
                state.namespace
            )));
        }
        let vector = Self::extract_vector(&state, entity, vector_field)?;
        batch.put(keys::vector(&state.namespace, entity.pk()), codec::serialize(entity));
        state.remove_live(entity.pk());
        state.insert_live(entity.pk(), vector)?;
        Ok(())
    }

    /// Batch-enrolled [`remove_by_pk`](Self::remove_by_pk).
    pub fn remove_by_pk_batch(
        &self,
        pk: &str,
        batch: &mut crate::core::storage::WriteBatch,
    ) -> Result<(), PolystoreError> {
        let mut state = self.state.lock().or_poisoned("vector state")?;
        self.ensure_initialized(&state)?;
        batch.delete(keys::vector(&state.namespace, pk));
        state.remove_live(pk);
        Ok(())
    }

    // --- transaction-enrolled CRUD ---

    /// Transactional [`add_entity`](Self::add_entity): the KV write joins
    /// the caller's transaction; cache and ANN mutate inline with an
    /// evict-if-present compensation step.
    pub fn add_entity_tx(
        &self,
        entity: &Entity,
        vector_field: &str,
        txn: &mut KvTransaction,
        saga: &mut Saga,
    ) -> Result<(), PolystoreError> {
        let pk = entity.pk().to_string();
        {
            let mut state = self.state.lock().or_poisoned("vector state")?;
            self.ensure_initialized(&state)?;
            if state.pk_to_label.contains_key(&pk) {
                return Err(PolystoreError::Vector(format!(
                    "pk '{pk}' already present in namespace '{}'",
                    state.namespace
                )));
            }
            let vector = Self::extract_vector(&state, entity, vector_field)?;
            txn.put(&keys::vector(&state.namespace, &pk), codec::serialize(entity))?;
            state.insert_live(&pk, vector)?;
        }

        let state = Arc::clone(&self.state);
        saga.add_step(format!("vector:add:{pk}"), move || evict_pk(&state, &pk));
        Ok(())
    }

    /// Transactional [`update_entity`](Self::update_entity). The pre-image
    /// vector is captured before mutation so compensation restores it
    /// exactly.
    pub fn update_entity_tx(
        &self,
        entity: &Entity,
        vector_field: &str,
        txn: &mut KvTransaction,
        saga: &mut Saga,
    ) -> Result<(), PolystoreError> {
        let pk = entity.pk().to_string();
        let previous = {
            let mut state = self.state.lock().or_poisoned("vector state")?;
            self.ensure_initialized(&state)?;
            if !state.pk_to_label.contains_key(&pk) {
                return Err(PolystoreError::NotFound(format!(
                    "pk '{pk}' not present in namespace '{}'",
                    state.namespace
                )));
            }
            let vector = Self::extract_vector(&state, entity, vector_field)?;
            txn.put(&keys::vector(&state.namespace, &pk), codec::serialize(entity))?;
            let previous = state.remove_live(&pk);
            state.insert_live(&pk, vector)?;
            previous
        };

        let state = Arc::clone(&self.state);
        saga.add_step(format!("vector:update:{pk}"), move || match previous {
            Some(old) => restore_vector(&state, &pk, old),
            None => evict_pk(&state, &pk),
        });
        Ok(())
    }

    /// Transactional [`remove_by_pk`](Self::remove_by_pk); compensation
    /// reinserts the captured vector.
    pub fn remove_by_pk_tx(
        &self,
        pk: &str,
        txn: &mut KvTransaction,
        saga: &mut Saga,
    ) -> Result<(), PolystoreError> {
        let pk = pk.to_string();
        let previous = {
            let mut state = self.state.lock().or_poisoned("vector state")?;
            self.ensure_initialized(&state)?;
            txn.del(&keys::vector(&state.namespace, &pk))?;
            state.remove_live(&pk)
        };

        if let Some(old) = previous {
            let state = Arc::clone(&self.state);
            saga.add_step(format!("vector:remove:{pk}"), move || {
                restore_vector(&state, &pk, old)
            });
        }
        Ok(())
    }

    // --- search ---

    /// K nearest neighbors of `query`, ascending by distance, ties broken by
    /// PK ascending. A whitelist restricts the search to those PKs (brute
    /// force over the cache); otherwise the ANN structure answers, with a
    /// brute-force fallback. An empty namespace yields an empty result.
    pub fn search_knn(
        &self,
        query: &[f32],
        k: usize,
        whitelist: Option<&[String]>,
    ) -> Result<Vec<KnnResult>, PolystoreError> {
        if k == 0 {
            return Err(PolystoreError::InvalidArgument("k must be positive".to_string()));
        }
        let state = self.state.lock().or_poisoned("vector state")?;
        self.ensure_initialized(&state)?;
        if state.cache.is_empty() {
            return Ok(Vec::new());
        }
        let query = state.prepare(query)?;

        if whitelist.is_some() {
            return state.brute_force(&query, k, whitelist);
        }

        match state.hnsw.as_ref() {
            Some(hnsw) => {
                let labeled = hnsw.search(&query, k, state.ef_search)?;
                let mut hits: Vec<KnnResult> = labeled
                    .into_iter()
                    .filter_map(|(label, distance)| {
                        state
                            .label_to_pk
                            .get(label)
                            .and_then(Clone::clone)
                            .map(|pk| (pk, distance))
                    })
                    .collect();
                sort_hits(&mut hits);
                hits.truncate(k);
                Ok(hits)
            }
            None => state.brute_force(&query, k, None),
        }
    }

    // --- persistence ---

    /// Persist the ANN structure, the bijection, and the metadata into a
    /// directory (three files).
    pub fn save_index(&self, dir: impl AsRef<Path>) -> Result<(), PolystoreError> {
        let dir = dir.as_ref();
        let state = self.state.lock().or_poisoned("vector state")?;
        self.ensure_initialized(&state)?;
        fs::create_dir_all(dir)?;

        let hnsw = state
            .hnsw
            .as_ref()
            .ok_or_else(|| PolystoreError::Vector("no ANN structure to save".to_string()))?;
        fs::write(dir.join(HNSW_FILE), hnsw.to_bytes())?;

        let mut mapping = String::new();
        for (pk, label) in &state.pk_to_label {
            mapping.push_str(pk);
            mapping.push(' ');
            mapping.push_str(&label.to_string());
            mapping.push('\n');
        }
        fs::write(dir.join(MAPPING_FILE), mapping)?;

        let meta = VectorIndexMeta {
            namespace: state.namespace.clone(),
            dimension: state.dim,
            metric: state.metric(),
            m: state.m,
            ef_construction: state.ef_construction,
            ef_search: state.ef_search,
        };
        fs::write(dir.join(META_FILE), serde_json::to_vec_pretty(&meta)?)?;
        info!("vector namespace '{}' saved to {}", state.namespace, dir.display());
        Ok(())
    }

    /// Restore a namespace previously written by
    /// [`save_index`](Self::save_index). Replaces any current state.
    pub fn load_index(&self, dir: impl AsRef<Path>) -> Result<(), PolystoreError> {
        let dir = dir.as_ref();
        let meta: VectorIndexMeta = serde_json::from_slice(&fs::read(dir.join(META_FILE))?)?;
        let hnsw = HnswGraph::from_bytes(&fs::read(dir.join(HNSW_FILE))?)?;

        let mut pk_to_label = HashMap::new();
        let mut max_label = 0usize;
        for line in fs::read_to_string(dir.join(MAPPING_FILE))?.lines() {
            let Some((pk, label)) = line.rsplit_once(' ') else {
                return Err(PolystoreError::Deserialization(format!(
                    "malformed mapping line '{line}'"
                )));
            };
            let label: usize = label.parse().map_err(|_| {
                PolystoreError::Deserialization(format!("malformed label in line '{line}'"))
            })?;
            max_label = max_label.max(label);
            pk_to_label.insert(pk.to_string(), label);
        }

        let mut label_to_pk = vec![None; if pk_to_label.is_empty() { 0 } else { max_label + 1 }];
        let mut cache = HashMap::new();
        for (pk, label) in &pk_to_label {
            label_to_pk[*label] = Some(pk.clone());
            if let Some(v) = hnsw.vector_of(*label) {
                cache.insert(pk.clone(), v.to_vec());
            }
        }

        let mut state = self.state.lock().or_poisoned("vector state")?;
        let (save_path, auto_save) = (state.save_path.clone(), state.auto_save);
        *state = VectorState {
            initialized: true,
            namespace: meta.namespace,
            dim: meta.dimension,
            metric: Some(meta.metric),
            m: meta.m,
            ef_construction: meta.ef_construction,
            ef_search: meta.ef_search,
            save_path,
            auto_save,
            pk_to_label,
            label_to_pk,
            cache,
            hnsw: Some(hnsw),
        };
        info!("vector namespace '{}' loaded from {}", state.namespace, dir.display());
        Ok(())
    }

    /// Rebuild bijection, cache, and ANN structure from the persistent
    /// `namespace:pk` entities. Entities without the vector field are
    /// skipped. This is also the compaction path for tombstones.
    pub fn rebuild_from_storage(&self, vector_field: &str) -> Result<(), PolystoreError> {
        let mut state = self.state.lock().or_poisoned("vector state")?;
        self.ensure_initialized(&state)?;

        let prefix = keys::vector(&state.namespace, "");
        let rows = self.db.scan_prefix_collect(&prefix)?;

        state.pk_to_label.clear();
        state.label_to_pk.clear();
        state.cache.clear();
        let fresh = HnswGraph::new(state.dim, state.m, state.ef_construction, state.metric());
        state.hnsw = Some(fresh);

        for (key, bytes) in rows {
            let pk = &key[prefix.len()..];
            let entity = codec::deserialize(pk, &bytes)?;
            let Some(raw) = entity.get(vector_field).and_then(crate::core::entity::Value::as_float_vec)
            else {
                continue;
            };
            let vector = state.prepare(raw)?;
            state.insert_live(pk, vector)?;
        }
        debug!(
            "vector namespace '{}' rebuilt from storage ({} vectors)",
            state.namespace,
            state.cache.len()
        );
        Ok(())
    }

    /// Save the index if auto-save is configured.
    pub fn shutdown(&self) -> Result<(), PolystoreError> {
        let target = {
            let state = self.state.lock().or_poisoned("vector state")?;
            if state.auto_save { state.save_path.clone() } else { None }
        };
        match target {
            Some(dir) => self.save_index(dir),
            None => Ok(()),
        }
    }

    /// Configuration and live population summary.
    pub fn stats(&self) -> Result<VectorStats, PolystoreError> {
        let state = self.state.lock().or_poisoned("vector state")?;
        self.ensure_initialized(&state)?;
        Ok(VectorStats {
            namespace: state.namespace.clone(),
            dimension: state.dim,
            metric: state.metric(),
            count: state.pk_to_label.len(),
            m: state.m,
            ef_construction: state.ef_construction,
            ef_search: state.ef_search,
        })
    }
}
