//! Graph analytics
//!
//! Centrality measures and community detection over the adjacency index:
//! degree centrality, PageRank (iterative power method), betweenness
//! (Brandes), closeness, and label-propagation communities. All algorithms
//! operate on a snapshot of the topology restricted to the caller-supplied
//! node set; edges leading outside that set are ignored.

use crate::core::common::PolystoreError;
use crate::core::graph::GraphIndexManager;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Per-node degree counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DegreeResult {
    pub in_degree: usize,
    pub out_degree: usize,
    pub total_degree: usize,
}

struct Topology {
    outgoing: HashMap<String, Vec<String>>,
    incoming: HashMap<String, Vec<String>>,
}

/// Analysis algorithms over a graph index.
#[derive(Debug)]
pub struct GraphAnalytics {
    graph: Arc<GraphIndexManager>,
}

impl GraphAnalytics {
    /// Create an analytics view over a graph manager.
    #[must_use]
    pub fn new(graph: Arc<GraphIndexManager>) -> Self {
        Self { graph }
    }

    fn build_topology(&self, node_pks: &[String]) -> Result<Topology, PolystoreError> {
        let members: HashSet<&str> = node_pks.iter().map(String::as_str).collect();
        let mut topo = Topology { outgoing: HashMap::new(), incoming: HashMap::new() };

        for pk in node_pks {
            let out = self
                .graph
                .out_neighbors(pk)?
                .into_iter()
                .filter(|n| members.contains(n.as_str()))
                .collect();
            topo.outgoing.insert(pk.clone(), out);

            let inn = self
                .graph
                .in_neighbors(pk)?
                .into_iter()
                .filter(|n| members.contains(n.as_str()))
                .collect();
            topo.incoming.insert(pk.clone(), inn);
        }
        Ok(topo)
    }

    fn check_nodes(node_pks: &[String]) -> Result<(), PolystoreError> {
        if node_pks.is_empty() {
            return Err(PolystoreError::InvalidArgument(
                "empty node list provided".to_string(),
            ));
        }
        Ok(())
    }

    /// In-, out-, and total degree for every node in the set.
    pub fn degree_centrality(
        &self,
        node_pks: &[String],
    ) -> Result<BTreeMap<String, DegreeResult>, PolystoreError> {
        Self::check_nodes(node_pks)?;
        let topo = self.build_topology(node_pks)?;

        let mut results = BTreeMap::new();
        for pk in node_pks {
            let out_degree = topo.outgoing.get(pk).map_or(0, Vec::len);
            let in_degree = topo.incoming.get(pk).map_or(0, Vec::len);
            results.insert(
                pk.clone(),
                DegreeResult { in_degree, out_degree, total_degree: in_degree + out_degree },
            );
        }
        Ok(results)
    }

    /// Importance scores via the iterative PageRank power method. Dangling
    /// mass is redistributed uniformly so the scores sum to ≈ 1.0.
    pub fn page_rank(
        &self,
        node_pks: &[String],
        damping: f64,
        max_iterations: usize,
        tolerance: f64,
    ) -> Result<BTreeMap<String, f64>, PolystoreError> {
        Self::check_nodes(node_pks)?;
        if !(0.0..=1.0).contains(&damping) {
            return Err(PolystoreError::InvalidArgument(format!(
                "damping factor {damping} outside [0, 1]"
            )));
        }
        let topo = self.build_topology(node_pks)?;
        let n = node_pks.len() as f64;

        let mut scores: HashMap<&str, f64> =
            node_pks.iter().map(|pk| (pk.as_str(), 1.0 / n)).collect();

        for _ in 0..max_iterations {
            let mut next: HashMap<&str, f64> =
                node_pks.iter().map(|pk| (pk.as_str(), (1.0 - damping) / n)).collect();

            let mut dangling_mass = 0.0;
            for pk in node_pks {
                let score = scores[pk.as_str()];
                let out = &topo.outgoing[pk.as_str()];
                if out.is_empty() {
                    dangling_mass += score;
                    continue;
                }
                let share = damping * score / out.len() as f64;
                for target in out {
                    if let Some(s) = next.get_mut(target.as_str()) {
                        *s += share;
                    }
                }
            }
            let dangling_share = damping * dangling_mass / n;
            for s in next.values_mut() {
                *s += dangling_share;
            }

            let delta: f64 =
                node_pks.iter().map(|pk| (next[pk.as_str()] - scores[pk.as_str()]).abs()).sum();
            scores = next;
            if delta < tolerance {
                break;
            }
        }

        Ok(node_pks.iter().map(|pk| (pk.clone(), scores[pk.as_str()])).collect())
    }

    /// Betweenness centrality via Brandes' algorithm (unweighted).
    pub fn betweenness_centrality(
        &self,
        node_pks: &[String],
    ) -> Result<BTreeMap<String, f64>, PolystoreError> {
        Self::check_nodes(node_pks)?;
        let topo = self.build_topology(node_pks)?;

        let mut betweenness: HashMap<&str, f64> =
            node_pks.iter().map(|pk| (pk.as_str(), 0.0)).collect();

        for source in node_pks {
            let mut stack: Vec<&str> = Vec::new();
            let mut predecessors: HashMap<&str, Vec<&str>> = HashMap::new();
            let mut sigma: HashMap<&str, f64> = HashMap::from([(source.as_str(), 1.0)]);
            let mut distance: HashMap<&str, i64> = HashMap::from([(source.as_str(), 0)]);
            let mut queue: VecDeque<&str> = VecDeque::from([source.as_str()]);

            while let Some(v) = queue.pop_front() {
                stack.push(v);
                for w in &topo.outgoing[v] {
                    let w = w.as_str();
                    let d_v = distance[v];
                    if !distance.contains_key(w) {
                        distance.insert(w, d_v + 1);
                        queue.push_back(w);
                    }
                    if distance[w] == d_v + 1 {
                        let paths_via_v = sigma[v];
                        *sigma.entry(w).or_insert(0.0) += paths_via_v;
                        predecessors.entry(w).or_default().push(v);
                    }
                }
            }

            let mut delta: HashMap<&str, f64> = HashMap::new();
            while let Some(w) = stack.pop() {
                if let Some(preds) = predecessors.get(w) {
                    for &v in preds {
                        let contribution = (sigma[v] / sigma[w])
                            * (1.0 + delta.get(w).copied().unwrap_or(0.0));
                        *delta.entry(v).or_insert(0.0) += contribution;
                    }
                }
                if w != source.as_str() {
                    if let Some(b) = betweenness.get_mut(w) {
                        *b += delta.get(w).copied().unwrap_or(0.0);
                    }
                }
            }
        }

        Ok(node_pks.iter().map(|pk| (pk.clone(), betweenness[pk.as_str()])).collect())
    }

    /// Closeness centrality: `(reachable - 1) / Σ distances`, 0 for nodes
    /// that reach nothing.
    pub fn closeness_centrality(
        &self,
        node_pks: &[String],
    ) -> Result<BTreeMap<String, f64>, PolystoreError> {
        Self::check_nodes(node_pks)?;
        let topo = self.build_topology(node_pks)?;

        let mut results = BTreeMap::new();
        for source in node_pks {
            let mut distance: HashMap<&str, u64> = HashMap::from([(source.as_str(), 0)]);
            let mut queue: VecDeque<&str> = VecDeque::from([source.as_str()]);
            while let Some(v) = queue.pop_front() {
                let next_hop = distance[v] + 1;
                for w in &topo.outgoing[v] {
                    if !distance.contains_key(w.as_str()) {
                        distance.insert(w.as_str(), next_hop);
                        queue.push_back(w.as_str());
                    }
                }
            }

            let reachable = distance.len() as f64 - 1.0;
            let total: u64 = distance.values().sum();
            let closeness = if total > 0 { reachable / total as f64 } else { 0.0 };
            results.insert(source.clone(), closeness);
        }
        Ok(results)
    }

    /// Community detection by label propagation: every node repeatedly
    /// adopts the most frequent label among its neighbors (in and out),
    /// smallest label winning ties, until stable or `max_iterations`.
    /// Returned community ids are dense, assigned by first appearance in
    /// PK order.
    pub fn label_propagation_communities(
        &self,
        node_pks: &[String],
        max_iterations: usize,
    ) -> Result<BTreeMap<String, usize>, PolystoreError> {
        Self::check_nodes(node_pks)?;
        let topo = self.build_topology(node_pks)?;

        let mut sorted: Vec<&str> = node_pks.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut labels: HashMap<&str, usize> =
            sorted.iter().enumerate().map(|(i, pk)| (*pk, i)).collect();

        for _ in 0..max_iterations {
            let mut changed = false;
            for pk in &sorted {
                let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
                for neighbor in
                    topo.outgoing[*pk].iter().chain(topo.incoming[*pk].iter())
                {
                    if let Some(label) = labels.get(neighbor.as_str()) {
                        *counts.entry(*label).or_insert(0) += 1;
                    }
                }
                // Most frequent neighbor label, smallest label winning ties.
                let Some(best) = counts
                    .iter()
                    .max_by_key(|&(label, count)| (*count, std::cmp::Reverse(*label)))
                else {
                    continue;
                };
                let best = *best.0;
                if labels[*pk] != best {
                    labels.insert(*pk, best);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        // Dense community ids by first appearance in PK order.
        let mut dense: HashMap<usize, usize> = HashMap::new();
        let mut results = BTreeMap::new();
        for pk in &sorted {
            let raw = labels[*pk];
            let next_id = dense.len();
            let id = *dense.entry(raw).or_insert(next_id);
            results.insert((*pk).to_string(), id);
        }
        Ok(results)
    }
}
