//! Graph traversals
//!
//! BFS, Dijkstra, and A* over the adjacency mirror, plus the time-filtered
//! variants and edge time-range queries. Each traversal copies the adjacency
//! rows it needs per step under the topology lock, then releases it; edge
//! weights and temporal bounds are read from the stored edge entities and
//! cached for the duration of one traversal.

use crate::core::common::PolystoreError;
use crate::core::entity::codec;
use crate::core::graph::{AdjacencyInfo, EdgeInfo, GraphIndexManager, PathResult, TemporalFilter};
use crate::core::keys;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

/// Frontier entry for the shortest-path loops. `BinaryHeap` is a max-heap,
/// so the comparison is written flipped: the cheapest entry pops first, and
/// exact cost ties settle on node name for deterministic expansion order.
#[derive(Debug, Clone, PartialEq)]
struct HeapEntry {
    cost: f64,
    node: String,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost.total_cmp(&self.cost).then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-traversal cache of edge metadata (weight + temporal bounds).
#[derive(Default)]
struct EdgeMetaCache {
    weights: HashMap<String, f64>,
    bounds: HashMap<String, (Option<i64>, Option<i64>)>,
}

impl EdgeMetaCache {
    fn weight(
        &mut self,
        graph: &GraphIndexManager,
        edge_id: &str,
    ) -> Result<f64, PolystoreError> {
        if let Some(w) = self.weights.get(edge_id) {
            return Ok(*w);
        }
        let w = graph.edge_weight(edge_id)?;
        self.weights.insert(edge_id.to_string(), w);
        Ok(w)
    }

    fn admitted(
        &mut self,
        graph: &GraphIndexManager,
        edge_id: &str,
        filter: TemporalFilter,
    ) -> Result<bool, PolystoreError> {
        if filter.timestamp_ms.is_none() {
            return Ok(true);
        }
        let (vf, vt) = match self.bounds.get(edge_id) {
            Some(b) => *b,
            None => {
                let b = graph.edge_bounds(edge_id)?;
                self.bounds.insert(edge_id.to_string(), b);
                b
            }
        };
        Ok(filter.is_valid(vf, vt))
    }
}

impl GraphIndexManager {
    /// Breadth-first traversal from `start`, bounded by `max_depth` hops.
    /// Returns nodes in discovery order, `start` included; `max_depth = 0`
    /// yields `[start]`, and so does an unknown start node.
    pub fn bfs(&self, start: &str, max_depth: usize) -> Result<Vec<String>, PolystoreError> {
        self.bfs_filtered(start, max_depth, TemporalFilter::all())
    }

    /// BFS where only edges valid at `timestamp_ms` are traversed.
    pub fn bfs_at_time(
        &self,
        start: &str,
        timestamp_ms: i64,
        max_depth: usize,
    ) -> Result<Vec<String>, PolystoreError> {
        self.bfs_filtered(start, max_depth, TemporalFilter::at(timestamp_ms))
    }

    fn bfs_filtered(
        &self,
        start: &str,
        max_depth: usize,
        filter: TemporalFilter,
    ) -> Result<Vec<String>, PolystoreError> {
        if start.is_empty() {
            return Err(PolystoreError::InvalidArgument(
                "BFS start PK must not be empty".to_string(),
            ));
        }

        let mut cache = EdgeMetaCache::default();
        let mut result = vec![start.to_string()];
        let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
        let mut queue: VecDeque<(String, usize)> = VecDeque::from([(start.to_string(), 0)]);

        while let Some((node, depth)) = queue.pop_front() {
            if depth == max_depth {
                continue;
            }
            for row in self.out_adjacency(&node)? {
                if !cache.admitted(self, &row.edge_id, filter)? {
                    continue;
                }
                if visited.insert(row.target_pk.clone()) {
                    result.push(row.target_pk.clone());
                    queue.push_back((row.target_pk, depth + 1));
                }
            }
        }
        Ok(result)
    }

    /// Shortest weighted path from `start` to `target`; edge weight is the
    /// edge entity's `_weight` (default 1.0). A missing path is a
    /// `NotFound` result, not a panic.
    pub fn dijkstra(&self, start: &str, target: &str) -> Result<PathResult, PolystoreError> {
        self.dijkstra_filtered(start, target, TemporalFilter::all())
    }

    /// Dijkstra where only edges valid at `timestamp_ms` are relaxed.
    pub fn dijkstra_at_time(
        &self,
        start: &str,
        target: &str,
        timestamp_ms: i64,
    ) -> Result<PathResult, PolystoreError> {
        self.dijkstra_filtered(start, target, TemporalFilter::at(timestamp_ms))
    }

    fn dijkstra_filtered(
        &self,
        start: &str,
        target: &str,
        filter: TemporalFilter,
    ) -> Result<PathResult, PolystoreError> {
        check_path_endpoints(start, target)?;
        if start == target {
            return Ok(PathResult { path: vec![start.to_string()], total_cost: 0.0 });
        }

        let mut cache = EdgeMetaCache::default();
        let mut dist: HashMap<String, f64> = HashMap::from([(start.to_string(), 0.0)]);
        let mut prev: HashMap<String, String> = HashMap::new();
        let mut heap = BinaryHeap::from([HeapEntry { cost: 0.0, node: start.to_string() }]);

        while let Some(HeapEntry { cost, node }) = heap.pop() {
            if node == target {
                return Ok(PathResult { path: reconstruct_path(&prev, start, target), total_cost: cost });
            }
            if cost > dist.get(&node).copied().unwrap_or(f64::INFINITY) {
                continue;
            }
            for row in self.out_adjacency(&node)? {
                if !cache.admitted(self, &row.edge_id, filter)? {
                    continue;
                }
                let next_cost = cost + cache.weight(self, &row.edge_id)?;
                if next_cost < dist.get(&row.target_pk).copied().unwrap_or(f64::INFINITY) {
                    dist.insert(row.target_pk.clone(), next_cost);
                    prev.insert(row.target_pk.clone(), node.clone());
                    heap.push(HeapEntry { cost: next_cost, node: row.target_pk });
                }
            }
        }

        Err(PolystoreError::NotFound(format!("no path from '{start}' to '{target}'")))
    }

    /// A* shortest path with a caller-supplied admissible heuristic
    /// estimating remaining cost from a node to the target.
    pub fn a_star<H>(
        &self,
        start: &str,
        target: &str,
        heuristic: H,
    ) -> Result<PathResult, PolystoreError>
    where
        H: Fn(&str) -> f64,
    {
        check_path_endpoints(start, target)?;
        if start == target {
            return Ok(PathResult { path: vec![start.to_string()], total_cost: 0.0 });
        }

        let mut cache = EdgeMetaCache::default();
        let mut g_score: HashMap<String, f64> = HashMap::from([(start.to_string(), 0.0)]);
        let mut prev: HashMap<String, String> = HashMap::new();
        let mut heap =
            BinaryHeap::from([HeapEntry { cost: heuristic(start), node: start.to_string() }]);

        while let Some(HeapEntry { node, .. }) = heap.pop() {
            let g = g_score.get(&node).copied().unwrap_or(f64::INFINITY);
            if node == target {
                return Ok(PathResult { path: reconstruct_path(&prev, start, target), total_cost: g });
            }
            for row in self.out_adjacency(&node)? {
                let tentative = g + cache.weight(self, &row.edge_id)?;
                if tentative < g_score.get(&row.target_pk).copied().unwrap_or(f64::INFINITY) {
                    g_score.insert(row.target_pk.clone(), tentative);
                    prev.insert(row.target_pk.clone(), node.clone());
                    heap.push(HeapEntry {
                        cost: tentative + heuristic(&row.target_pk),
                        node: row.target_pk,
                    });
                }
            }
        }

        Err(PolystoreError::NotFound(format!("no path from '{start}' to '{target}'")))
    }

    /// All edges whose validity interval overlaps `[range_start, range_end]`
    /// (default) or lies fully inside it (`require_full_containment`). An
    /// edge with an absent bound is unbounded on that side and therefore
    /// never fully contained.
    pub fn edges_in_time_range(
        &self,
        range_start_ms: i64,
        range_end_ms: i64,
        require_full_containment: bool,
    ) -> Result<Vec<EdgeInfo>, PolystoreError> {
        if range_start_ms > range_end_ms {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        let rows = self.db.scan_prefix_collect(keys::GRAPH_EDGE_PREFIX)?;
        for (key, bytes) in rows {
            let edge_id = &key[keys::GRAPH_EDGE_PREFIX.len()..];
            let edge = codec::deserialize(edge_id, &bytes)?;
            let (Some(from), Some(to)) = (edge.edge_from(), edge.edge_to()) else {
                continue;
            };
            let info = EdgeInfo {
                edge_id: edge_id.to_string(),
                from_pk: from.to_string(),
                to_pk: to.to_string(),
                valid_from: edge.valid_from(),
                valid_to: edge.valid_to(),
            };
            if range_matches(&info, range_start_ms, range_end_ms, require_full_containment) {
                out.push(info);
            }
        }
        out.sort_by(|a, b| a.edge_id.cmp(&b.edge_id));
        Ok(out)
    }

    /// Time-range query restricted to the outgoing edges of one node.
    pub fn out_edges_in_time_range(
        &self,
        from_pk: &str,
        range_start_ms: i64,
        range_end_ms: i64,
        require_full_containment: bool,
    ) -> Result<Vec<EdgeInfo>, PolystoreError> {
        if range_start_ms > range_end_ms {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for AdjacencyInfo { edge_id, target_pk } in self.out_adjacency(from_pk)? {
            let (valid_from, valid_to) = self.edge_bounds(&edge_id)?;
            let info = EdgeInfo {
                edge_id,
                from_pk: from_pk.to_string(),
                to_pk: target_pk,
                valid_from,
                valid_to,
            };
            if range_matches(&info, range_start_ms, range_end_ms, require_full_containment) {
                out.push(info);
            }
        }
        out.sort_by(|a, b| a.edge_id.cmp(&b.edge_id));
        Ok(out)
    }
}

fn check_path_endpoints(start: &str, target: &str) -> Result<(), PolystoreError> {
    if start.is_empty() || target.is_empty() {
        return Err(PolystoreError::InvalidArgument(
            "path endpoints must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn reconstruct_path(prev: &HashMap<String, String>, start: &str, target: &str) -> Vec<String> {
    let mut path = vec![target.to_string()];
    let mut current = target;
    while current != start {
        match prev.get(current) {
            Some(p) => {
                path.push(p.clone());
                current = p;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

fn range_matches(info: &EdgeInfo, lo: i64, hi: i64, require_full_containment: bool) -> bool {
    if require_full_containment {
        info.valid_from.is_some_and(|vf| vf >= lo) && info.valid_to.is_some_and(|vt| vt <= hi)
    } else {
        info.valid_from.unwrap_or(i64::MIN) <= hi && info.valid_to.unwrap_or(i64::MAX) >= lo
    }
}
