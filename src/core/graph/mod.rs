//! Graph index
//!
//! Adjacency over directed edges. The persistent representation lives in the
//! shared keyspace (`graph:out:<from>:<edge>` → to, `graph:in:<to>:<edge>` →
//! from, `graph:edge:<edge>` → edge entity); an in-memory mirror of both
//! adjacency maps serves O(degree) traversal once loaded.
//!
//! Transaction-enrolled mutations update the mirror inline — before the
//! transaction commits — and register a compensating step that reverses the
//! mirror change. Readers needing strict consistency with committed state
//! must gate reads behind the transaction boundary or rebuild the mirror.

pub mod analytics;
pub mod temporal;
pub mod traversal;

pub use analytics::{DegreeResult, GraphAnalytics};
pub use temporal::TemporalFilter;

use crate::core::common::lock_utils::LockResultExt;
use crate::core::common::PolystoreError;
use crate::core::entity::{codec, Entity};
use crate::core::keys;
use crate::core::storage::{KvStore, KvTransaction};
use crate::core::transaction::saga::Saga;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One adjacency row: the edge and the node on its far side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjacencyInfo {
    pub edge_id: String,
    pub target_pk: String,
}

/// An edge with its endpoints and temporal bounds, as returned by
/// time-range queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeInfo {
    pub edge_id: String,
    pub from_pk: String,
    pub to_pk: String,
    pub valid_from: Option<i64>,
    pub valid_to: Option<i64>,
}

/// A weighted path from start to target.
#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    pub path: Vec<String>,
    pub total_cost: f64,
}

#[derive(Debug, Default)]
struct Topology {
    out: HashMap<String, Vec<AdjacencyInfo>>,
    inn: HashMap<String, Vec<AdjacencyInfo>>,
    loaded: bool,
}

impl Topology {
    fn add(&mut self, edge_id: &str, from: &str, to: &str) {
        self.out
            .entry(from.to_string())
            .or_default()
            .push(AdjacencyInfo { edge_id: edge_id.to_string(), target_pk: to.to_string() });
        self.inn
            .entry(to.to_string())
            .or_default()
            .push(AdjacencyInfo { edge_id: edge_id.to_string(), target_pk: from.to_string() });
    }

    fn remove(&mut self, edge_id: &str, from: &str, to: &str) {
        if let Some(rows) = self.out.get_mut(from) {
            rows.retain(|a| a.edge_id != edge_id);
            if rows.is_empty() {
                self.out.remove(from);
            }
        }
        if let Some(rows) = self.inn.get_mut(to) {
            rows.retain(|a| a.edge_id != edge_id);
            if rows.is_empty() {
                self.inn.remove(to);
            }
        }
    }
}

/// Manager for the directed-edge adjacency index.
///
/// The mirror sits behind an `Arc` of its own so compensation closures can
/// capture it without keeping the whole manager alive.
#[derive(Debug)]
pub struct GraphIndexManager {
    db: Arc<KvStore>,
    topology: Arc<Mutex<Topology>>,
}

impl GraphIndexManager {
    /// Create a manager with an unloaded mirror; call
    /// [`rebuild_topology`](Self::rebuild_topology) to populate it.
    #[must_use]
    pub fn new(db: Arc<KvStore>) -> Self {
        Self { db, topology: Arc::new(Mutex::new(Topology::default())) }
    }

    /// Repopulate the in-memory mirror from the persistent adjacency keys.
    /// Idempotent: the mirror is cleared and rebuilt.
    pub fn rebuild_topology(&self) -> Result<(), PolystoreError> {
        let mut fresh = Topology { loaded: true, ..Topology::default() };

        self.db.scan_prefix(keys::GRAPH_OUT_PREFIX, |key, value| {
            let rest = &key[keys::GRAPH_OUT_PREFIX.len()..];
            if let Some(split) = rest.rfind(keys::SEPARATOR) {
                let (from, edge_id) = (&rest[..split], &rest[split + 1..]);
                let to = String::from_utf8_lossy(value);
                fresh
                    .out
                    .entry(from.to_string())
                    .or_default()
                    .push(AdjacencyInfo { edge_id: edge_id.to_string(), target_pk: to.into_owned() });
            }
            true
        })?;
        self.db.scan_prefix(keys::GRAPH_IN_PREFIX, |key, value| {
            let rest = &key[keys::GRAPH_IN_PREFIX.len()..];
            if let Some(split) = rest.rfind(keys::SEPARATOR) {
                let (to, edge_id) = (&rest[..split], &rest[split + 1..]);
                let from = String::from_utf8_lossy(value);
                fresh
                    .inn
                    .entry(to.to_string())
                    .or_default()
                    .push(AdjacencyInfo { edge_id: edge_id.to_string(), target_pk: from.into_owned() });
            }
            true
        })?;

        let mut topology = self.topology.lock().or_poisoned("graph topology")?;
        *topology = fresh;
        debug!(
            "graph topology rebuilt: {} source nodes, {} target nodes",
            topology.out.len(),
            topology.inn.len()
        );
        Ok(())
    }

    /// Add an edge: persist the edge entity and both adjacency keys
    /// atomically, then mirror the change.
    pub fn add_edge(&self, edge: &Entity) -> Result<(), PolystoreError> {
        let (edge_id, from, to) = validate_edge(edge)?;

        let mut batch = self.db.new_batch();
        batch.put(keys::graph_edge(&edge_id), codec::serialize(edge));
        batch.put(keys::graph_out(&from, &edge_id), to.as_bytes().to_vec());
        batch.put(keys::graph_in(&to, &edge_id), from.as_bytes().to_vec());
        self.db.apply_batch(batch)?;

        let mut topology = self.topology.lock().or_poisoned("graph topology")?;
        topology.add(&edge_id, &from, &to);
        Ok(())
    }

    /// Delete an edge by id: resolve its endpoints, remove all three keys
    /// atomically, prune the mirror. Deleting an unknown edge is an error.
    pub fn delete_edge(&self, edge_id: &str) -> Result<(), PolystoreError> {
        let (from, to) = self.resolve_endpoints(edge_id)?;

        let mut batch = self.db.new_batch();
        batch.delete(keys::graph_edge(edge_id));
        batch.delete(keys::graph_out(&from, edge_id));
        batch.delete(keys::graph_in(&to, edge_id));
        self.db.apply_batch(batch)?;

        let mut topology = self.topology.lock().or_poisoned("graph topology")?;
        topology.remove(edge_id, &from, &to);
        Ok(())
    }

    /// Batch-enrolled add: the three KV mutations join the caller's batch,
    /// the mirror is updated inline. If the caller never applies the batch
    /// the mirror diverges until the next `rebuild_topology`.
    pub fn add_edge_batch(
        &self,
        edge: &Entity,
        batch: &mut crate::core::storage::WriteBatch,
    ) -> Result<(), PolystoreError> {
        let (edge_id, from, to) = validate_edge(edge)?;
        batch.put(keys::graph_edge(&edge_id), codec::serialize(edge));
        batch.put(keys::graph_out(&from, &edge_id), to.as_bytes().to_vec());
        batch.put(keys::graph_in(&to, &edge_id), from.as_bytes().to_vec());

        let mut topology = self.topology.lock().or_poisoned("graph topology")?;
        topology.add(&edge_id, &from, &to);
        Ok(())
    }

    /// Batch-enrolled delete, mirror updated inline like
    /// [`add_edge_batch`](Self::add_edge_batch).
    pub fn delete_edge_batch(
        &self,
        edge_id: &str,
        batch: &mut crate::core::storage::WriteBatch,
    ) -> Result<(), PolystoreError> {
        let (from, to) = self.resolve_endpoints(edge_id)?;
        batch.delete(keys::graph_edge(edge_id));
        batch.delete(keys::graph_out(&from, edge_id));
        batch.delete(keys::graph_in(&to, edge_id));

        let mut topology = self.topology.lock().or_poisoned("graph topology")?;
        topology.remove(edge_id, &from, &to);
        Ok(())
    }

    /// Transaction-enrolled add: the three KV mutations join the caller's
    /// write set, the mirror is updated inline, and a compensating step that
    /// reverses the mirror update is registered with the caller's saga.
    pub fn add_edge_tx(
        &self,
        edge: &Entity,
        txn: &mut KvTransaction,
        saga: &mut Saga,
    ) -> Result<(), PolystoreError> {
        let (edge_id, from, to) = validate_edge(edge)?;

        txn.put(&keys::graph_edge(&edge_id), codec::serialize(edge))?;
        txn.put(&keys::graph_out(&from, &edge_id), to.as_bytes().to_vec())?;
        txn.put(&keys::graph_in(&to, &edge_id), from.as_bytes().to_vec())?;

        {
            let mut topology = self.topology.lock().or_poisoned("graph topology")?;
            topology.add(&edge_id, &from, &to);
        }

        let topology = Arc::clone(&self.topology);
        saga.add_step(format!("graph:add_edge:{edge_id}"), move || {
            let mut topology = topology.lock().or_poisoned("graph topology")?;
            topology.remove(&edge_id, &from, &to);
            Ok(())
        });
        Ok(())
    }

    /// Transaction-enrolled delete, mirror-compensated like
    /// [`add_edge_tx`](Self::add_edge_tx). Endpoints are resolved through
    /// the transaction's own view.
    pub fn delete_edge_tx(
        &self,
        edge_id: &str,
        txn: &mut KvTransaction,
        saga: &mut Saga,
    ) -> Result<(), PolystoreError> {
        let (from, to) = match txn.get(&keys::graph_edge(edge_id))? {
            Some(bytes) => {
                let edge = codec::deserialize(edge_id, &bytes)?;
                match (edge.edge_from(), edge.edge_to()) {
                    (Some(f), Some(t)) => (f.to_string(), t.to_string()),
                    _ => {
                        return Err(PolystoreError::Integrity(format!(
                            "edge entity '{edge_id}' lacks endpoints"
                        )))
                    }
                }
            }
            None => self.endpoints_from_mirror(edge_id)?.ok_or_else(|| {
                PolystoreError::NotFound(format!("edge '{edge_id}' does not exist"))
            })?,
        };

        txn.del(&keys::graph_edge(edge_id))?;
        txn.del(&keys::graph_out(&from, edge_id))?;
        txn.del(&keys::graph_in(&to, edge_id))?;

        {
            let mut topology = self.topology.lock().or_poisoned("graph topology")?;
            topology.remove(edge_id, &from, &to);
        }

        let topology = Arc::clone(&self.topology);
        let edge_id = edge_id.to_string();
        saga.add_step(format!("graph:delete_edge:{edge_id}"), move || {
            let mut topology = topology.lock().or_poisoned("graph topology")?;
            topology.add(&edge_id, &from, &to);
            Ok(())
        });
        Ok(())
    }

    // --- accessors ---

    /// Target PKs of all outgoing edges of `pk`.
    pub fn out_neighbors(&self, pk: &str) -> Result<Vec<String>, PolystoreError> {
        Ok(self.out_adjacency(pk)?.into_iter().map(|a| a.target_pk).collect())
    }

    /// Source PKs of all incoming edges of `pk`.
    pub fn in_neighbors(&self, pk: &str) -> Result<Vec<String>, PolystoreError> {
        Ok(self.in_adjacency(pk)?.into_iter().map(|a| a.target_pk).collect())
    }

    /// Outgoing adjacency rows of `pk` (edge id + target). Served from the
    /// mirror when loaded, else from a prefix scan.
    pub fn out_adjacency(&self, pk: &str) -> Result<Vec<AdjacencyInfo>, PolystoreError> {
        {
            let topology = self.topology.lock().or_poisoned("graph topology")?;
            if topology.loaded {
                return Ok(topology.out.get(pk).cloned().unwrap_or_default());
            }
        }
        self.scan_adjacency(&keys::graph_out_prefix(pk))
    }

    /// Incoming adjacency rows of `pk` (edge id + source).
    pub fn in_adjacency(&self, pk: &str) -> Result<Vec<AdjacencyInfo>, PolystoreError> {
        {
            let topology = self.topology.lock().or_poisoned("graph topology")?;
            if topology.loaded {
                return Ok(topology.inn.get(pk).cloned().unwrap_or_default());
            }
        }
        self.scan_adjacency(&keys::graph_in_prefix(pk))
    }

    /// The stored edge entity, if any.
    pub fn get_edge(&self, edge_id: &str) -> Result<Option<Entity>, PolystoreError> {
        match self.db.get(&keys::graph_edge(edge_id))? {
            Some(bytes) => Ok(Some(codec::deserialize(edge_id, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Number of nodes present in the mirror (sources and targets).
    pub fn topology_node_count(&self) -> Result<usize, PolystoreError> {
        let topology = self.topology.lock().or_poisoned("graph topology")?;
        let mut nodes: std::collections::HashSet<&str> =
            topology.out.keys().map(String::as_str).collect();
        nodes.extend(topology.inn.keys().map(String::as_str));
        Ok(nodes.len())
    }

    /// Number of edges present in the mirror.
    pub fn topology_edge_count(&self) -> Result<usize, PolystoreError> {
        let topology = self.topology.lock().or_poisoned("graph topology")?;
        Ok(topology.out.values().map(Vec::len).sum())
    }

    // --- internals ---

    fn scan_adjacency(&self, prefix: &str) -> Result<Vec<AdjacencyInfo>, PolystoreError> {
        let mut rows = Vec::new();
        self.db.scan_prefix(prefix, |key, value| {
            let edge_id = keys::extract_primary_key(key).to_string();
            rows.push(AdjacencyInfo {
                edge_id,
                target_pk: String::from_utf8_lossy(value).into_owned(),
            });
            true
        })?;
        Ok(rows)
    }

    fn resolve_endpoints(&self, edge_id: &str) -> Result<(String, String), PolystoreError> {
        if let Some(edge) = self.get_edge(edge_id)? {
            if let (Some(f), Some(t)) = (edge.edge_from(), edge.edge_to()) {
                return Ok((f.to_string(), t.to_string()));
            }
            return Err(PolystoreError::Integrity(format!(
                "edge entity '{edge_id}' lacks endpoints"
            )));
        }
        self.endpoints_from_mirror(edge_id)?
            .ok_or_else(|| PolystoreError::NotFound(format!("edge '{edge_id}' does not exist")))
    }

    fn endpoints_from_mirror(
        &self,
        edge_id: &str,
    ) -> Result<Option<(String, String)>, PolystoreError> {
        let topology = self.topology.lock().or_poisoned("graph topology")?;
        for (from, rows) in &topology.out {
            if let Some(row) = rows.iter().find(|a| a.edge_id == edge_id) {
                return Ok(Some((from.clone(), row.target_pk.clone())));
            }
        }
        Ok(None)
    }

    /// `_weight` of an edge, defaulting to 1.0 for absent edges or fields.
    pub(crate) fn edge_weight(&self, edge_id: &str) -> Result<f64, PolystoreError> {
        Ok(self.get_edge(edge_id)?.map_or(1.0, |e| e.edge_weight()))
    }

    /// Temporal bounds of an edge; `(None, None)` for absent edges.
    pub(crate) fn edge_bounds(
        &self,
        edge_id: &str,
    ) -> Result<(Option<i64>, Option<i64>), PolystoreError> {
        Ok(self
            .get_edge(edge_id)?
            .map_or((None, None), |e| (e.valid_from(), e.valid_to())))
    }
}

fn validate_edge(edge: &Entity) -> Result<(String, String, String), PolystoreError> {
    let edge_id = edge
        .edge_id()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PolystoreError::InvalidArgument("edge is missing 'id'".to_string()))?;
    let from = edge
        .edge_from()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PolystoreError::InvalidArgument("edge is missing '_from'".to_string()))?;
    let to = edge
        .edge_to()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PolystoreError::InvalidArgument("edge is missing '_to'".to_string()))?;
    if let (Some(vf), Some(vt)) = (edge.valid_from(), edge.valid_to()) {
        if vf > vt {
            return Err(PolystoreError::InvalidArgument(format!(
                "edge '{edge_id}' has valid_from {vf} > valid_to {vt}"
            )));
        }
    }
    Ok((edge_id.to_string(), from.to_string(), to.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::{Value, EDGE_VALID_FROM, EDGE_VALID_TO};

    fn setup() -> (Arc<KvStore>, Arc<GraphIndexManager>) {
        let db = Arc::new(KvStore::in_memory());
        let graph = Arc::new(GraphIndexManager::new(Arc::clone(&db)));
        graph.rebuild_topology().unwrap();
        (db, graph)
    }

    #[test]
    fn test_add_edge_writes_all_keys() {
        let (db, graph) = setup();
        graph.add_edge(&Entity::edge("e1", "a", "b")).unwrap();

        assert!(db.get("graph:edge:e1").unwrap().is_some());
        assert_eq!(db.get("graph:out:a:e1").unwrap(), Some(b"b".to_vec()));
        assert_eq!(db.get("graph:in:b:e1").unwrap(), Some(b"a".to_vec()));

        assert_eq!(graph.out_neighbors("a").unwrap(), vec!["b"]);
        assert_eq!(graph.in_neighbors("b").unwrap(), vec!["a"]);
    }

    #[test]
    fn test_malformed_edges_rejected() {
        let (_db, graph) = setup();
        let no_from = Entity::new("e1")
            .with_field("id", Value::Str("e1".into()))
            .with_field("_to", Value::Str("b".into()));
        assert!(matches!(
            graph.add_edge(&no_from),
            Err(PolystoreError::InvalidArgument(_))
        ));

        let inverted = Entity::edge("e2", "a", "b")
            .with_field(EDGE_VALID_FROM, Value::Int(2000))
            .with_field(EDGE_VALID_TO, Value::Int(1000));
        assert!(matches!(
            graph.add_edge(&inverted),
            Err(PolystoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_delete_edge_removes_everything() {
        let (db, graph) = setup();
        graph.add_edge(&Entity::edge("e1", "a", "b")).unwrap();
        graph.delete_edge("e1").unwrap();

        assert!(db.get("graph:edge:e1").unwrap().is_none());
        assert!(db.get("graph:out:a:e1").unwrap().is_none());
        assert!(db.get("graph:in:b:e1").unwrap().is_none());
        assert!(graph.out_neighbors("a").unwrap().is_empty());

        assert!(matches!(
            graph.delete_edge("e1"),
            Err(PolystoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_mirror_parity_after_rebuild() {
        let (db, graph) = setup();
        graph.add_edge(&Entity::edge("e1", "a", "b")).unwrap();
        graph.add_edge(&Entity::edge("e2", "a", "c")).unwrap();
        graph.add_edge(&Entity::edge("e3", "b", "c")).unwrap();

        graph.rebuild_topology().unwrap();

        for node in ["a", "b", "c"] {
            let mut from_mirror = graph.out_neighbors(node).unwrap();
            from_mirror.sort();
            let mut from_scan: Vec<String> = db
                .scan_prefix_collect(&keys::graph_out_prefix(node))
                .unwrap()
                .into_iter()
                .map(|(_, v)| String::from_utf8(v).unwrap())
                .collect();
            from_scan.sort();
            assert_eq!(from_mirror, from_scan, "mirror diverges at node {node}");
        }
    }

    #[test]
    fn test_rebuild_topology_idempotent() {
        let (_db, graph) = setup();
        graph.add_edge(&Entity::edge("e1", "a", "b")).unwrap();

        graph.rebuild_topology().unwrap();
        graph.rebuild_topology().unwrap();
        assert_eq!(graph.out_neighbors("a").unwrap(), vec!["b"]);
        assert_eq!(graph.topology_edge_count().unwrap(), 1);
    }

    #[test]
    fn test_accessor_scan_fallback_when_unloaded() {
        let db = Arc::new(KvStore::in_memory());
        let graph = Arc::new(GraphIndexManager::new(Arc::clone(&db)));
        // Mirror never loaded; adjacency comes from prefix scans.
        graph.add_edge(&Entity::edge("e1", "a", "b")).unwrap();

        let unloaded = GraphIndexManager::new(Arc::clone(&db));
        assert_eq!(unloaded.out_neighbors("a").unwrap(), vec!["b"]);
        assert_eq!(
            unloaded.out_adjacency("a").unwrap(),
            vec![AdjacencyInfo { edge_id: "e1".to_string(), target_pk: "b".to_string() }]
        );
    }

    #[test]
    fn test_topology_counts() {
        let (_db, graph) = setup();
        graph.add_edge(&Entity::edge("e1", "a", "b")).unwrap();
        graph.add_edge(&Entity::edge("e2", "b", "c")).unwrap();
        assert_eq!(graph.topology_node_count().unwrap(), 3);
        assert_eq!(graph.topology_edge_count().unwrap(), 2);
    }

    #[test]
    fn test_batch_variants_enroll_and_mirror() {
        let (db, graph) = setup();
        let mut batch = db.new_batch();
        graph.add_edge_batch(&Entity::edge("e1", "a", "b"), &mut batch).unwrap();
        // Mirror updated inline, keys not yet applied.
        assert_eq!(graph.out_neighbors("a").unwrap(), vec!["b"]);
        assert!(db.get("graph:out:a:e1").unwrap().is_none());

        db.apply_batch(batch).unwrap();
        assert_eq!(db.get("graph:out:a:e1").unwrap(), Some(b"b".to_vec()));

        let mut batch = db.new_batch();
        graph.delete_edge_batch("e1", &mut batch).unwrap();
        assert!(graph.out_neighbors("a").unwrap().is_empty());
        db.apply_batch(batch).unwrap();
        assert!(db.get("graph:edge:e1").unwrap().is_none());
    }

    #[test]
    fn test_edge_weight_default_and_explicit() {
        let (_db, graph) = setup();
        graph.add_edge(&Entity::edge("plain", "a", "b")).unwrap();
        graph
            .add_edge(
                &Entity::edge("heavy", "a", "c")
                    .with_field(crate::core::entity::EDGE_WEIGHT, Value::Double(2.5)),
            )
            .unwrap();

        assert_eq!(graph.edge_weight("plain").unwrap(), 1.0);
        assert_eq!(graph.edge_weight("heavy").unwrap(), 2.5);
        assert_eq!(graph.edge_weight("missing").unwrap(), 1.0);
    }
}
