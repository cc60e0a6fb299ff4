//! Read-only statistics over a merged graph: edge rankings, frequent
//! paths, error hotspots and shape drift.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use flowtrace_core::{Branch, ShapeSignature};
use flowtrace_session::EdgeKey;

use crate::merged::{EdgeStats, MergedGraph};

/// A greedy walk from a root along the most frequent outgoing edges.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FrequentPath {
    pub functions: Vec<String>,
    pub edges: Vec<EdgeKey>,
    /// Frequency of the path's first edge (the root's entry edges when present).
    pub frequency: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// Most calls into this function ended in `error`.
    ErrorHotspot {
        function_name: String,
        error_calls: u64,
        total_calls: u64,
    },
    /// The function was observed with more than one input/output signature.
    ShapeDrift {
        function_name: String,
        signatures: Vec<ShapeSignature>,
    },
}

impl Anomaly {
    pub fn function_name(&self) -> &str {
        match self {
            Self::ErrorHotspot { function_name, .. } | Self::ShapeDrift { function_name, .. } => {
                function_name
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatsReport {
    pub total_sessions: u64,
    pub degraded_sessions: u64,
    pub node_count: usize,
    pub edge_count: usize,
    pub top_edges: Vec<EdgeStats>,
    pub frequent_paths: Vec<FrequentPath>,
    pub anomalies: Vec<Anomaly>,
}

/// Frequency descending, then `(from, to, branch)` ascending.
fn rank(a: &EdgeStats, b: &EdgeStats) -> Ordering {
    b.frequency
        .cmp(&a.frequency)
        .then_with(|| (&a.from, &a.to, a.branch).cmp(&(&b.from, &b.to, b.branch)))
}

pub struct StatsExtractor<'a> {
    graph: &'a MergedGraph,
}

impl<'a> StatsExtractor<'a> {
    pub fn new(graph: &'a MergedGraph) -> Self {
        Self { graph }
    }

    /// The `k` most frequently used edges.
    pub fn ranked_edges(&self, k: usize) -> Vec<EdgeStats> {
        let mut edges: Vec<&EdgeStats> = self.graph.edges.values().collect();
        edges.sort_by(|a, b| rank(a, b));
        edges.into_iter().take(k).cloned().collect()
    }

    /// Functions where sessions start: targets of entry edges, plus any
    /// function no other function calls.
    pub fn roots(&self) -> BTreeSet<&'a str> {
        let mut called: BTreeSet<&str> = BTreeSet::new();
        let mut roots: BTreeSet<&str> = BTreeSet::new();

        for edge in self.graph.edges.values() {
            match edge.from.as_deref() {
                None => {
                    roots.insert(edge.to.as_str());
                }
                Some(from) if from != edge.to => {
                    called.insert(edge.to.as_str());
                }
                Some(_) => {}
            }
        }

        for name in self.graph.nodes.keys() {
            if !called.contains(name.as_str()) {
                roots.insert(name.as_str());
            }
        }
        roots
    }

    /// One greedy path per root, best `k` by frequency.
    pub fn frequent_paths(&self, k: usize) -> Vec<FrequentPath> {
        let mut paths: Vec<FrequentPath> = self
            .roots()
            .into_iter()
            .map(|root| self.walk_from(root))
            .collect();

        paths.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| a.functions.cmp(&b.functions))
        });
        paths.truncate(k);
        paths
    }

    fn walk_from(&self, root: &str) -> FrequentPath {
        let entry_frequency: u64 = self
            .graph
            .outgoing(None)
            .filter(|e| e.to == root)
            .map(|e| e.frequency)
            .sum();

        let mut functions = vec![root.to_string()];
        let mut edges = Vec::new();
        let mut visited: BTreeSet<&str> = BTreeSet::from([root]);
        let mut current = root;

        loop {
            let next = self
                .graph
                .outgoing(Some(current))
                .filter(|e| !visited.contains(e.to.as_str()))
                .min_by(|a, b| rank(a, b));

            let Some(edge) = next else {
                break;
            };
            edges.push(edge.key());
            functions.push(edge.to.clone());
            visited.insert(edge.to.as_str());
            current = edge.to.as_str();
        }

        let frequency = if entry_frequency > 0 {
            entry_frequency
        } else {
            edges
                .first()
                .and_then(|key| self.graph.edges.get(key))
                .map(|e| e.frequency)
                .unwrap_or(0)
        };

        FrequentPath {
            functions,
            edges,
            frequency,
        }
    }

    /// Error hotspots and shape drift, ordered by function name.
    ///
    /// A function is an error hotspot when its inbound `error` traversals
    /// strictly outnumber those of every other branch.
    pub fn anomalies(&self) -> Vec<Anomaly> {
        let mut inbound: BTreeMap<&str, BTreeMap<Branch, u64>> = BTreeMap::new();
        for edge in self.graph.edges.values() {
            *inbound
                .entry(edge.to.as_str())
                .or_default()
                .entry(edge.branch)
                .or_insert(0) += edge.traversals;
        }

        let mut anomalies = Vec::new();
        for (name, node) in &self.graph.nodes {
            if let Some(counts) = inbound.get(name.as_str()) {
                let errors = counts.get(&Branch::Error).copied().unwrap_or(0);
                let others_max = counts
                    .iter()
                    .filter(|(b, _)| **b != Branch::Error)
                    .map(|(_, &n)| n)
                    .max()
                    .unwrap_or(0);
                if errors > others_max {
                    anomalies.push(Anomaly::ErrorHotspot {
                        function_name: name.clone(),
                        error_calls: errors,
                        total_calls: counts.values().sum(),
                    });
                }
            }

            if node.has_shape_drift() {
                anomalies.push(Anomaly::ShapeDrift {
                    function_name: name.clone(),
                    signatures: node.observed_shapes.iter().cloned().collect(),
                });
            }
        }
        anomalies
    }

    pub fn report(&self, k: usize) -> StatsReport {
        StatsReport {
            total_sessions: self.graph.total_sessions,
            degraded_sessions: self.graph.degraded_sessions,
            node_count: self.graph.nodes.len(),
            edge_count: self.graph.edges.len(),
            top_edges: self.ranked_edges(k),
            frequent_paths: self.frequent_paths(k),
            anomalies: self.anomalies(),
        }
    }
}
