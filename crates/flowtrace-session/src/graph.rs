//! Directed call graph of a single session.
//!
//! Nodes are keyed by function name and edges by `(from, to, branch)`, so
//! the graph is plain indexed data with no references between nodes. An
//! edge whose `from` is `None` is the entry edge of the session root.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use flowtrace_core::{Branch, SessionId, Shape, ShapeSignature};

/// Identity of a call edge. `from == None` marks the session entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey {
    pub from: Option<String>,
    pub to: String,
    pub branch: Branch,
}

impl EdgeKey {
    pub fn new(from: Option<&str>, to: &str, branch: Branch) -> Self {
        Self {
            from: from.map(String::from),
            to: to.to_string(),
            branch,
        }
    }

    pub fn is_entry(&self) -> bool {
        self.from.is_none()
    }

    pub fn is_self_loop(&self) -> bool {
        self.from.as_deref() == Some(self.to.as_str())
    }
}

/// Per-session view of one function. Shape and result fields hold the
/// values from the most recent call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeInfo {
    pub function_name: String,
    pub last_input_shape: Shape,
    pub last_output_shape: Shape,
    pub result: Branch,
    /// Times the function was entered in this session.
    pub occurrences: u64,
    /// Summed wall-clock time of the calls that completed.
    pub total_duration_us: u64,
}

impl NodeInfo {
    fn new(function_name: &str) -> Self {
        Self {
            function_name: function_name.to_string(),
            last_input_shape: Shape::new(),
            last_output_shape: Shape::new(),
            result: Branch::Partial,
            occurrences: 0,
            total_duration_us: 0,
        }
    }

    pub fn shape_signature(&self) -> ShapeSignature {
        ShapeSignature::of(&self.last_input_shape, &self.last_output_shape)
    }
}

/// Degradations kept per session; later ones are only counted.
pub const MAX_DEGRADATIONS: usize = 64;

/// Why a session graph is only partially trustworthy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// An exit event did not match the top of the session's call stack.
    StackCorruption {
        expected: Option<String>,
        found: String,
        sequence_no: u64,
    },
    /// Events between `expected` and `resumed_at` never arrived.
    SequenceGap { expected: u64, resumed_at: u64 },
    /// The session completed while this function was still on the stack.
    UnterminatedCall { function_name: String },
    /// An edge named a caller that produced no events in this session.
    UnknownCaller { caller: String, function_name: String },
}

/// The call graph of one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionGraph {
    pub session_id: SessionId,
    pub nodes: BTreeMap<String, NodeInfo>,
    /// Edge → number of traversals within this session.
    #[serde(with = "edge_counts")]
    pub edges: BTreeMap<EdgeKey, u64>,
    pub degradations: Vec<Degradation>,
    /// Degradations beyond `MAX_DEGRADATIONS`.
    #[serde(default)]
    pub suppressed_degradations: u64,
    /// Set when the completion signal was processed; the graph is frozen from then on.
    pub completed_at: Option<DateTime<Utc>>,
}

impl SessionGraph {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            degradations: Vec::new(),
            suppressed_degradations: 0,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    pub fn node(&self, function_name: &str) -> Option<&NodeInfo> {
        self.nodes.get(function_name)
    }

    pub fn contains_edge(&self, from: Option<&str>, to: &str, branch: Branch) -> bool {
        self.edges.contains_key(&EdgeKey::new(from, to, branch))
    }

    /// Functions entered from outside the session (targets of entry edges).
    pub fn roots(&self) -> BTreeSet<&str> {
        self.edges
            .keys()
            .filter(|k| k.is_entry())
            .map(|k| k.to.as_str())
            .collect()
    }

    /// True when the graph has no cycle other than direct self-loops.
    pub fn is_dag_except_self_loops(&self) -> bool {
        let mut indegree: BTreeMap<&str, usize> =
            self.nodes.keys().map(|name| (name.as_str(), 0)).collect();
        let mut adjacency: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

        for key in self.edges.keys() {
            let Some(from) = key.from.as_deref() else {
                continue;
            };
            if key.is_self_loop() {
                continue;
            }
            if adjacency.entry(from).or_default().insert(key.to.as_str()) {
                *indegree.entry(key.to.as_str()).or_insert(0) += 1;
                indegree.entry(from).or_insert(0);
            }
        }

        let mut ready: Vec<&str> = indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&n, _)| n)
            .collect();
        let mut visited = 0;

        while let Some(node) = ready.pop() {
            visited += 1;
            if let Some(targets) = adjacency.get(node) {
                for &target in targets {
                    if let Some(d) = indegree.get_mut(target) {
                        *d -= 1;
                        if *d == 0 {
                            ready.push(target);
                        }
                    }
                }
            }
        }

        visited == indegree.len()
    }

    // ── Mutation (builder only) ───────────────────────────────────

    pub(crate) fn node_mut(&mut self, function_name: &str) -> &mut NodeInfo {
        self.nodes
            .entry(function_name.to_string())
            .or_insert_with(|| NodeInfo::new(function_name))
    }

    pub(crate) fn record_edge(&mut self, key: EdgeKey) {
        let traversals = self.edges.entry(key).or_insert(0);
        *traversals = traversals.saturating_add(1);
    }

    pub(crate) fn degrade(&mut self, degradation: Degradation) {
        if self.degradations.len() >= MAX_DEGRADATIONS {
            self.suppressed_degradations = self.suppressed_degradations.saturating_add(1);
            tracing::debug!(
                session_id = %self.session_id,
                degradation = ?degradation,
                "Session graph degradation suppressed"
            );
            return;
        }
        tracing::warn!(
            session_id = %self.session_id,
            degradation = ?degradation,
            "Session graph degraded"
        );
        self.degradations.push(degradation);
    }

    /// Drop edges whose caller never became a node of this graph.
    pub(crate) fn prune_dangling_edges(&mut self) {
        let dangling: Vec<EdgeKey> = self
            .edges
            .keys()
            .filter(|k| matches!(&k.from, Some(from) if !self.nodes.contains_key(from)))
            .cloned()
            .collect();

        for key in dangling {
            self.edges.remove(&key);
            self.degrade(Degradation::UnknownCaller {
                caller: key.from.unwrap_or_default(),
                function_name: key.to,
            });
        }
    }
}

/// Serialize the edge map as a list, since JSON object keys must be strings.
mod edge_counts {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use flowtrace_core::Branch;

    use super::EdgeKey;

    #[derive(Serialize)]
    struct EntryRef<'a> {
        from: &'a Option<String>,
        to: &'a str,
        branch: Branch,
        traversals: u64,
    }

    #[derive(Deserialize)]
    struct Entry {
        from: Option<String>,
        to: String,
        branch: Branch,
        traversals: u64,
    }

    pub fn serialize<S: Serializer>(
        edges: &BTreeMap<EdgeKey, u64>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(edges.iter().map(|(key, &traversals)| EntryRef {
            from: &key.from,
            to: &key.to,
            branch: key.branch,
            traversals,
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<EdgeKey, u64>, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|e| {
                (
                    EdgeKey {
                        from: e.from,
                        to: e.to,
                        branch: e.branch,
                    },
                    e.traversals,
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_edges(edges: &[(Option<&str>, &str)]) -> SessionGraph {
        let mut graph = SessionGraph::new(SessionId::new());
        for &(from, to) in edges {
            if let Some(from) = from {
                graph.node_mut(from).occurrences += 1;
            }
            graph.node_mut(to).occurrences += 1;
            graph.record_edge(EdgeKey::new(from, to, Branch::Success));
        }
        graph
    }

    #[test]
    fn self_loop_does_not_count_as_cycle() {
        let graph = graph_with_edges(&[(None, "walk"), (Some("walk"), "walk")]);
        assert!(graph.is_dag_except_self_loops());
        assert!(graph.contains_edge(Some("walk"), "walk", Branch::Success));
    }

    #[test]
    fn indirect_cycle_is_detected() {
        let graph = graph_with_edges(&[(None, "a"), (Some("a"), "b"), (Some("b"), "a")]);
        assert!(!graph.is_dag_except_self_loops());
    }

    #[test]
    fn roots_are_entry_targets() {
        let graph = graph_with_edges(&[(None, "main"), (Some("main"), "helper")]);
        assert_eq!(graph.roots().into_iter().collect::<Vec<_>>(), vec!["main"]);
    }

    #[test]
    fn entry_edges_sort_before_function_edges() {
        let entry = EdgeKey::new(None, "z", Branch::Success);
        let inner = EdgeKey::new(Some("a"), "b", Branch::Success);
        assert!(entry < inner);
    }

    #[test]
    fn dangling_caller_edges_are_pruned() {
        let mut graph = SessionGraph::new(SessionId::new());
        graph.node_mut("child").occurrences = 1;
        graph.record_edge(EdgeKey::new(Some("ghost"), "child", Branch::Success));

        graph.prune_dangling_edges();
        assert!(graph.edges.is_empty());
        assert!(matches!(
            graph.degradations.as_slice(),
            [Degradation::UnknownCaller { caller, .. }] if caller == "ghost"
        ));
    }

    #[test]
    fn degradations_are_capped() {
        let mut graph = SessionGraph::new(SessionId::new());
        for i in 0..100 {
            graph.degrade(Degradation::UnterminatedCall {
                function_name: format!("f{i}"),
            });
        }
        assert_eq!(graph.degradations.len(), MAX_DEGRADATIONS);
        assert_eq!(graph.suppressed_degradations, 100 - MAX_DEGRADATIONS as u64);
        assert!(graph.is_degraded());
    }

    #[test]
    fn serializes_edges_as_list() {
        let graph = graph_with_edges(&[(None, "main"), (Some("main"), "helper")]);
        let json = serde_json::to_value(&graph).unwrap();
        assert!(json["edges"].is_array());
        assert_eq!(json["edges"][0]["from"], serde_json::Value::Null);

        let back: SessionGraph = serde_json::from_value(json).unwrap();
        assert_eq!(back, graph);
    }
}
