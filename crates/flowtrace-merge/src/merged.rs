//! The consolidated architecture graph.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use flowtrace_core::{Branch, SessionId, ShapeSignature};
use flowtrace_session::{EdgeKey, SessionGraph};

use crate::error::MergeError;

/// A function as seen across all merged sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergedNode {
    pub function_name: String,
    /// Total calls, summed over every session.
    pub occurrences: u64,
    /// Distinct input/output signatures; more than one means shape drift.
    pub observed_shapes: BTreeSet<ShapeSignature>,
    pub total_duration_us: u64,
}

impl MergedNode {
    fn new(function_name: &str) -> Self {
        Self {
            function_name: function_name.to_string(),
            occurrences: 0,
            observed_shapes: BTreeSet::new(),
            total_duration_us: 0,
        }
    }

    pub fn has_shape_drift(&self) -> bool {
        self.observed_shapes.len() > 1
    }

    pub fn mean_duration_us(&self) -> u64 {
        if self.occurrences == 0 {
            0
        } else {
            self.total_duration_us / self.occurrences
        }
    }
}

/// Usage of one call edge across sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EdgeStats {
    pub from: Option<String>,
    pub to: String,
    pub branch: Branch,
    /// Sessions that exercised this edge at least once.
    pub frequency: u64,
    /// Total traversals over all sessions.
    pub traversals: u64,
}

impl EdgeStats {
    fn new(key: &EdgeKey) -> Self {
        Self {
            from: key.from.clone(),
            to: key.to.clone(),
            branch: key.branch,
            frequency: 0,
            traversals: 0,
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            from: self.from.clone(),
            to: self.to.clone(),
            branch: self.branch,
        }
    }
}

/// Process-wide merge of every session graph seen so far.
///
/// `merged_session_ids` is the idempotency ledger and always has exactly
/// `total_sessions` entries. Every collection is ordered, so two graphs
/// built from the same sessions compare and serialize identically.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergedGraph {
    pub nodes: BTreeMap<String, MergedNode>,
    #[serde(with = "edge_table")]
    pub edges: BTreeMap<EdgeKey, EdgeStats>,
    pub merged_session_ids: BTreeSet<SessionId>,
    pub total_sessions: u64,
    /// Merged sessions that were flagged degraded by the builder.
    pub degraded_sessions: u64,
}

impl MergedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, function_name: &str) -> Option<&MergedNode> {
        self.nodes.get(function_name)
    }

    pub fn edge(&self, from: Option<&str>, to: &str, branch: Branch) -> Option<&EdgeStats> {
        self.edges.get(&EdgeKey::new(from, to, branch))
    }

    pub fn contains_session(&self, session_id: SessionId) -> bool {
        self.merged_session_ids.contains(&session_id)
    }

    /// Outgoing edges of `function_name`, or session entry edges for `None`.
    pub fn outgoing<'a>(&'a self, from: Option<&'a str>) -> impl Iterator<Item = &'a EdgeStats> + 'a {
        self.edges.values().filter(move |e| e.from.as_deref() == from)
    }

    /// Sum of entry edge frequencies. Equals `total_sessions` when every
    /// session had exactly one root call.
    pub fn entry_frequency(&self) -> u64 {
        self.outgoing(None).map(|e| e.frequency).sum()
    }

    /// Check the ledger invariant.
    pub fn validate(&self) -> Result<(), MergeError> {
        if self.total_sessions != self.merged_session_ids.len() as u64 {
            return Err(MergeError::Inconsistent(format!(
                "total_sessions = {} but ledger holds {} ids",
                self.total_sessions,
                self.merged_session_ids.len()
            )));
        }
        if self.degraded_sessions > self.total_sessions {
            return Err(MergeError::Inconsistent(format!(
                "{} degraded sessions out of {}",
                self.degraded_sessions, self.total_sessions
            )));
        }
        Ok(())
    }

    /// Fold one session in. Callers must have checked the ledger and the
    /// session graph first; nothing here can fail halfway.
    pub(crate) fn absorb(&mut self, session: &SessionGraph) {
        for (name, info) in &session.nodes {
            let node = self
                .nodes
                .entry(name.clone())
                .or_insert_with(|| MergedNode::new(name));
            node.occurrences = node.occurrences.saturating_add(info.occurrences);
            node.total_duration_us = node.total_duration_us.saturating_add(info.total_duration_us);
            node.observed_shapes.insert(info.shape_signature());
        }

        for (key, &traversals) in &session.edges {
            let edge = self
                .edges
                .entry(key.clone())
                .or_insert_with(|| EdgeStats::new(key));
            edge.frequency = edge.frequency.saturating_add(1);
            edge.traversals = edge.traversals.saturating_add(traversals);
        }

        self.merged_session_ids.insert(session.session_id);
        self.total_sessions += 1;
        if session.is_degraded() {
            self.degraded_sessions += 1;
        }
    }
}

/// Check that a session graph can be merged without breaking invariants.
pub(crate) fn check_session(session: &SessionGraph) -> Result<(), MergeError> {
    if !session.is_completed() {
        return Err(MergeError::NotCompleted {
            session_id: session.session_id,
        });
    }

    for key in session.edges.keys() {
        let from_missing = matches!(&key.from, Some(from) if !session.nodes.contains_key(from));
        if from_missing || !session.nodes.contains_key(&key.to) {
            return Err(MergeError::InvalidGraph {
                session_id: session.session_id,
                reason: format!(
                    "edge {} -> {} ({}) references a missing node",
                    key.from.as_deref().unwrap_or("<entry>"),
                    key.to,
                    key.branch
                ),
            });
        }
    }

    for (name, info) in &session.nodes {
        if name != &info.function_name {
            return Err(MergeError::InvalidGraph {
                session_id: session.session_id,
                reason: format!("node key {name} holds {}", info.function_name),
            });
        }
    }

    Ok(())
}

/// Serialize the edge map as a list, since JSON object keys must be strings.
mod edge_table {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use flowtrace_session::EdgeKey;

    use super::EdgeStats;

    pub fn serialize<S: Serializer>(
        edges: &BTreeMap<EdgeKey, EdgeStats>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(edges.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<EdgeKey, EdgeStats>, D::Error> {
        let edges = Vec::<EdgeStats>::deserialize(deserializer)?;
        Ok(edges.into_iter().map(|e| (e.key(), e)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_graph_is_consistent() {
        let graph = MergedGraph::new();
        assert!(graph.validate().is_ok());
        assert_eq!(graph.entry_frequency(), 0);
    }

    #[test]
    fn ledger_mismatch_is_inconsistent() {
        let graph = MergedGraph {
            total_sessions: 2,
            ..MergedGraph::default()
        };
        assert!(matches!(graph.validate(), Err(MergeError::Inconsistent(_))));
    }

    #[test]
    fn in_flight_session_is_rejected() {
        let session = SessionGraph::new(SessionId::new());
        assert!(matches!(
            check_session(&session),
            Err(MergeError::NotCompleted { .. })
        ));
    }

    #[test]
    fn counters_saturate_instead_of_overflowing() {
        let mut session = SessionGraph::new(SessionId::new());
        session.nodes.insert(
            "hot".into(),
            flowtrace_session::NodeInfo {
                function_name: "hot".into(),
                last_input_shape: Default::default(),
                last_output_shape: Default::default(),
                result: Branch::Success,
                occurrences: u64::MAX,
                total_duration_us: u64::MAX,
            },
        );
        session.edges.insert(EdgeKey::new(None, "hot", Branch::Success), u64::MAX);
        session.completed_at = Some(chrono::Utc::now());

        let mut graph = MergedGraph::new();
        graph.absorb(&session);
        session.session_id = SessionId::new();
        graph.absorb(&session);

        let node = graph.node("hot").unwrap();
        assert_eq!(node.occurrences, u64::MAX);
        assert_eq!(node.total_duration_us, u64::MAX);
        let edge = graph.edge(None, "hot", Branch::Success).unwrap();
        assert_eq!(edge.traversals, u64::MAX);
        assert_eq!(edge.frequency, 2);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn mean_duration_handles_zero_calls() {
        let node = MergedNode::new("idle");
        assert_eq!(node.mean_duration_us(), 0);
        assert!(!node.has_shape_drift());
    }
}
