//! Hierarchical navigable small-world graph
//!
//! ANN structure over caller-assigned label ids, built per Malkov & Yashunin:
//! every node gets a geometrically distributed top level, upper levels form
//! coarse routing layers, and level 0 holds the dense neighborhood graph.
//! A query descends greedily through the routing layers, then runs a
//! beam search on level 0.
//!
//! Deletion is lazy: removed labels stay wired into the graph as tombstones
//! (they still route) but never appear in results; searches widen their beam
//! to compensate. The whole structure serializes to a little-endian binary
//! dump so a reloaded index answers queries identically.

use crate::core::common::PolystoreError;
use crate::core::vector::distance::Metric;
use rand::Rng;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

const DUMP_MAGIC: &[u8; 4] = b"HNSW";
const DUMP_FORMAT_VERSION: u32 = 1;
const MAX_LEVEL: usize = 16;

/// Distance with a total order, usable directly as a heap key.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Dist(f32);

impl Eq for Dist {}

impl Ord for Dist {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for Dist {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
struct HnswNode {
    label: usize,
    vector: Vec<f32>,
    level: usize,
    /// Link sets indexed by level, `0..=level`.
    links: Vec<HashSet<usize>>,
    deleted: bool,
}

impl HnswNode {
    fn new(label: usize, vector: Vec<f32>, level: usize) -> Self {
        Self { label, vector, level, links: vec![HashSet::new(); level + 1], deleted: false }
    }

    fn link(&mut self, level: usize, other: usize) {
        if let Some(set) = self.links.get_mut(level) {
            set.insert(other);
        }
    }

    fn unlink(&mut self, level: usize, other: usize) {
        if let Some(set) = self.links.get_mut(level) {
            set.remove(&other);
        }
    }
}

/// The HNSW graph.
#[derive(Debug)]
pub struct HnswGraph {
    nodes: HashMap<usize, HnswNode>,
    entry_point: Option<usize>,
    dimension: usize,
    /// Link cap per routing level (M); level 0 allows twice as many.
    max_links: usize,
    max_links_base: usize,
    ef_construction: usize,
    metric: Metric,
    top_level: usize,
}

impl HnswGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new(dimension: usize, m: usize, ef_construction: usize, metric: Metric) -> Self {
        let max_links = m.max(2);
        Self {
            nodes: HashMap::new(),
            entry_point: None,
            dimension,
            max_links,
            max_links_base: max_links * 2,
            ef_construction: ef_construction.max(8),
            metric,
            top_level: 0,
        }
    }

    /// Total nodes, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes that are still searchable.
    #[must_use]
    pub fn live_len(&self) -> usize {
        self.nodes.values().filter(|n| !n.deleted).count()
    }

    /// True when no nodes exist at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The configured vector dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The stored vector of a label, tombstoned or not.
    #[must_use]
    pub fn vector_of(&self, label: usize) -> Option<&[f32]> {
        self.nodes.get(&label).map(|n| n.vector.as_slice())
    }

    /// Geometric level draw: a fair coin decides, per level, whether the
    /// node climbs one higher, so the expected layer population halves at
    /// every step up.
    fn draw_level(&self) -> usize {
        let mut rng = rand::thread_rng();
        let mut level = 0;
        while level < MAX_LEVEL && rng.gen_bool(0.5) {
            level += 1;
        }
        level
    }

    fn dist_to(&self, query: &[f32], label: usize) -> Result<Option<Dist>, PolystoreError> {
        match self.nodes.get(&label) {
            Some(node) => Ok(Some(Dist(self.metric.distance(query, &node.vector)?))),
            None => Ok(None),
        }
    }

    /// Insert a vector under a caller-assigned label.
    pub fn insert(&mut self, label: usize, vector: Vec<f32>) -> Result<(), PolystoreError> {
        if vector.len() != self.dimension {
            return Err(PolystoreError::VectorDimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if self.nodes.contains_key(&label) {
            return Err(PolystoreError::Vector(format!("label {label} already present")));
        }

        let level = self.draw_level();
        let mut fresh = HnswNode::new(label, vector.clone(), level);

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(label);
            self.top_level = level;
            self.nodes.insert(label, fresh);
            return Ok(());
        };

        // Route down from the entry point to just above the node's level.
        let mut seeds = vec![entry];
        for lvl in (level + 1..=self.top_level).rev() {
            let found = self.beam_search(&vector, &seeds, 1, lvl)?;
            if let Some(&(best, _)) = found.first() {
                seeds = vec![best];
            }
        }

        // Wire the node in on every level it occupies. The beam comes back
        // sorted, so the closest prefix doubles as the neighbor selection.
        for lvl in (0..=level.min(self.top_level)).rev() {
            let found = self.beam_search(&vector, &seeds, self.ef_construction, lvl)?;
            let cap = if lvl == 0 { self.max_links_base } else { self.max_links };
            let chosen: Vec<usize> = found.iter().take(cap).map(|&(l, _)| l).collect();

            for &peer in &chosen {
                fresh.link(lvl, peer);
                if let Some(node) = self.nodes.get_mut(&peer) {
                    node.link(lvl, label);
                }
                self.shrink_links(peer, lvl, cap)?;
            }
            if !chosen.is_empty() {
                seeds = chosen;
            }
        }

        if level > self.top_level {
            self.top_level = level;
            self.entry_point = Some(label);
        }
        self.nodes.insert(label, fresh);
        Ok(())
    }

    /// Tombstone a label. The node keeps routing but stops matching.
    /// Returns whether the label was present and live.
    pub fn mark_deleted(&mut self, label: usize) -> bool {
        match self.nodes.get_mut(&label) {
            Some(node) if !node.deleted => {
                node.deleted = true;
                true
            }
            _ => false,
        }
    }

    /// K nearest live labels with their distances, ascending.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
    ) -> Result<Vec<(usize, f32)>, PolystoreError> {
        if query.len() != self.dimension {
            return Err(PolystoreError::VectorDimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };

        let mut seeds = vec![entry];
        for lvl in (1..=self.top_level).rev() {
            let found = self.beam_search(query, &seeds, 1, lvl)?;
            if let Some(&(best, _)) = found.first() {
                seeds = vec![best];
            }
        }

        // Tombstones occupy beam slots; widen so k live results can still
        // surface.
        let dead = self.len() - self.live_len();
        let beam = ef_search.max(k).saturating_add(dead).min(self.len().max(1));
        let ranked = self.beam_search(query, &seeds, beam, 0)?;

        Ok(ranked
            .into_iter()
            .filter(|(label, _)| self.nodes.get(label).is_some_and(|n| !n.deleted))
            .take(k)
            .collect())
    }

    /// Bounded best-first search within one level: expand the closest
    /// unexpanded node until nothing on the frontier can improve the
    /// shortlist. Tombstoned nodes participate (routing only); results come
    /// back as (label, distance), ascending.
    fn beam_search(
        &self,
        query: &[f32],
        seeds: &[usize],
        beam: usize,
        level: usize,
    ) -> Result<Vec<(usize, f32)>, PolystoreError> {
        // `frontier` pops nearest-first; `shortlist` evicts farthest-first
        // and never grows beyond the beam width.
        let mut frontier: BinaryHeap<Reverse<(Dist, usize)>> = BinaryHeap::new();
        let mut shortlist: BinaryHeap<(Dist, usize)> = BinaryHeap::new();
        let mut seen: HashSet<usize> = HashSet::new();

        for &seed in seeds {
            if !seen.insert(seed) {
                continue;
            }
            if let Some(d) = self.dist_to(query, seed)? {
                frontier.push(Reverse((d, seed)));
                shortlist.push((d, seed));
            }
        }

        while let Some(Reverse((d, label))) = frontier.pop() {
            if shortlist.len() >= beam {
                let worst = shortlist.peek().map_or(Dist(f32::INFINITY), |&(w, _)| w);
                if d > worst {
                    break;
                }
            }
            let Some(node) = self.nodes.get(&label) else {
                continue;
            };
            let Some(links) = node.links.get(level) else {
                continue;
            };
            for &next in links {
                if !seen.insert(next) {
                    continue;
                }
                let Some(nd) = self.dist_to(query, next)? else {
                    continue;
                };
                if shortlist.len() < beam {
                    shortlist.push((nd, next));
                    frontier.push(Reverse((nd, next)));
                } else if shortlist.peek().is_some_and(|&(worst, _)| nd < worst) {
                    shortlist.pop();
                    shortlist.push((nd, next));
                    frontier.push(Reverse((nd, next)));
                }
            }
        }

        let mut out: Vec<(usize, f32)> =
            shortlist.into_iter().map(|(d, label)| (label, d.0)).collect();
        out.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(out)
    }

    /// Trim a node back to its link cap, keeping the closest peers. Severed
    /// links are removed on both sides.
    fn shrink_links(&mut self, label: usize, level: usize, cap: usize) -> Result<(), PolystoreError> {
        let (anchor, peers) = match self.nodes.get(&label) {
            Some(node) => match node.links.get(level) {
                Some(set) if set.len() > cap => {
                    (node.vector.clone(), set.iter().copied().collect::<Vec<_>>())
                }
                _ => return Ok(()),
            },
            None => return Ok(()),
        };

        let mut ranked: Vec<(f32, usize)> = Vec::with_capacity(peers.len());
        for &peer in &peers {
            if let Some(d) = self.dist_to(&anchor, peer)? {
                ranked.push((d.0, peer));
            }
        }
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

        let keep: HashSet<usize> = ranked.iter().take(cap).map(|&(_, p)| p).collect();
        for peer in peers {
            if keep.contains(&peer) {
                continue;
            }
            if let Some(node) = self.nodes.get_mut(&label) {
                node.unlink(level, peer);
            }
            if let Some(node) = self.nodes.get_mut(&peer) {
                node.unlink(level, label);
            }
        }
        Ok(())
    }

    // --- binary dump ---

    /// Serialize the whole structure.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(DUMP_MAGIC);
        out.extend_from_slice(&DUMP_FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        out.extend_from_slice(&(self.max_links as u32).to_le_bytes());
        out.extend_from_slice(&(self.ef_construction as u32).to_le_bytes());
        out.push(match self.metric {
            Metric::L2 => 0,
            Metric::Cosine => 1,
        });
        match self.entry_point {
            Some(ep) => {
                out.push(1);
                out.extend_from_slice(&(ep as u64).to_le_bytes());
            }
            None => {
                out.push(0);
                out.extend_from_slice(&0u64.to_le_bytes());
            }
        }
        out.extend_from_slice(&(self.top_level as u32).to_le_bytes());
        out.extend_from_slice(&(self.nodes.len() as u64).to_le_bytes());

        let mut labels: Vec<_> = self.nodes.keys().copied().collect();
        labels.sort_unstable();
        for label in labels {
            let node = &self.nodes[&label];
            out.extend_from_slice(&(node.label as u64).to_le_bytes());
            out.push(u8::from(node.deleted));
            out.extend_from_slice(&(node.level as u32).to_le_bytes());
            for f in &node.vector {
                out.extend_from_slice(&f.to_le_bytes());
            }
            for set in &node.links {
                out.extend_from_slice(&(set.len() as u32).to_le_bytes());
                let mut linked: Vec<_> = set.iter().copied().collect();
                linked.sort_unstable();
                for l in linked {
                    out.extend_from_slice(&(l as u64).to_le_bytes());
                }
            }
        }
        out
    }

    /// Restore a structure from its dump.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PolystoreError> {
        let mut r = Reader { bytes, pos: 0 };
        if r.take(4)? != DUMP_MAGIC {
            return Err(PolystoreError::Deserialization("not an HNSW dump".to_string()));
        }
        let format = r.u32()?;
        if format != DUMP_FORMAT_VERSION {
            return Err(PolystoreError::Deserialization(format!(
                "unsupported HNSW dump format {format}"
            )));
        }
        let dimension = r.u32()? as usize;
        let m = r.u32()? as usize;
        let ef_construction = r.u32()? as usize;
        let metric = match r.u8()? {
            0 => Metric::L2,
            1 => Metric::Cosine,
            other => {
                return Err(PolystoreError::Deserialization(format!(
                    "unknown metric tag {other}"
                )))
            }
        };
        let has_entry = r.u8()? != 0;
        let entry_raw = r.u64()? as usize;
        let top_level = r.u32()? as usize;
        let node_count = r.u64()? as usize;

        let mut graph = Self::new(dimension, m, ef_construction, metric);
        graph.top_level = top_level;
        graph.entry_point = has_entry.then_some(entry_raw);

        for _ in 0..node_count {
            let label = r.u64()? as usize;
            let deleted = r.u8()? != 0;
            let level = r.u32()? as usize;
            let mut vector = Vec::with_capacity(dimension);
            for _ in 0..dimension {
                vector.push(f32::from_le_bytes(r.take(4)?.try_into().map_err(|_| {
                    PolystoreError::Deserialization("truncated vector".to_string())
                })?));
            }
            let mut node = HnswNode::new(label, vector, level);
            node.deleted = deleted;
            for lvl in 0..=level {
                let count = r.u32()? as usize;
                for _ in 0..count {
                    let linked = r.u64()? as usize;
                    node.link(lvl, linked);
                }
            }
            graph.nodes.insert(label, node);
        }
        Ok(graph)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], PolystoreError> {
        if self.pos + len > self.bytes.len() {
            return Err(PolystoreError::Deserialization("truncated HNSW dump".to_string()));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, PolystoreError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, PolystoreError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().map_err(|_| {
            PolystoreError::Deserialization("truncated HNSW dump".to_string())
        })?))
    }

    fn u64(&mut self) -> Result<u64, PolystoreError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().map_err(|_| {
            PolystoreError::Deserialization("truncated HNSW dump".to_string())
        })?))
    }
}
