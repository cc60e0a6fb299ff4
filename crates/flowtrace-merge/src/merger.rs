//! Flow merger: folds completed session graphs into the merged graph.
//!
//! Each `merge` call is one transaction under a single lock: the ledger
//! check, validation and every counter update happen together, so two
//! callers racing on the same session id cannot both apply it.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use flowtrace_core::SessionId;
use flowtrace_session::{SessionGraph, SessionGraphStore};

use crate::error::MergeError;
use crate::merged::{check_session, MergedGraph};

/// What a successful merge added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub session_id: SessionId,
    pub nodes: usize,
    pub edges: usize,
    pub degraded: bool,
}

/// Outcome of a batch sweep over the session store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub merged: Vec<SessionId>,
    pub already_merged: Vec<SessionId>,
    pub failed: Vec<(SessionId, String)>,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.merged.is_empty() && self.already_merged.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct FlowMerger {
    graph: Mutex<MergedGraph>,
}

impl FlowMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a previously persisted graph.
    pub fn with_graph(graph: MergedGraph) -> Result<Self, MergeError> {
        graph.validate()?;
        Ok(Self {
            graph: Mutex::new(graph),
        })
    }

    /// Merge one completed session.
    ///
    /// Returns `MergeError::AlreadyMerged` without touching anything when
    /// the session id is already in the ledger.
    pub fn merge(&self, session: &SessionGraph) -> Result<MergeSummary, MergeError> {
        let mut graph = self.lock();

        if graph.contains_session(session.session_id) {
            return Err(MergeError::AlreadyMerged(session.session_id));
        }
        check_session(session)?;

        graph.absorb(session);

        tracing::debug!(
            session_id = %session.session_id,
            nodes = session.nodes.len(),
            edges = session.edges.len(),
            total_sessions = graph.total_sessions,
            "Session merged"
        );

        Ok(MergeSummary {
            session_id: session.session_id,
            nodes: session.nodes.len(),
            edges: session.edges.len(),
            degraded: session.is_degraded(),
        })
    }

    /// Merge every completed session in the store, in session id order.
    ///
    /// Merged and already-merged sessions are removed from the store. A
    /// session that fails is logged, left in place and does not stop the
    /// sweep.
    pub fn merge_completed(&self, store: &SessionGraphStore) -> MergeReport {
        let mut report = MergeReport::default();

        for session in store.list_completed() {
            let session_id = session.session_id;
            match self.merge(&session) {
                Ok(_) => {
                    store.remove(session_id);
                    report.merged.push(session_id);
                }
                Err(MergeError::AlreadyMerged(_)) => {
                    store.remove(session_id);
                    report.already_merged.push(session_id);
                }
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "Skipping session merge");
                    report.failed.push((session_id, e.to_string()));
                }
            }
        }

        if !report.is_empty() {
            tracing::info!(
                merged = report.merged.len(),
                already_merged = report.already_merged.len(),
                failed = report.failed.len(),
                "Merge sweep complete"
            );
        }
        report
    }

    /// Copy of the current merged graph.
    pub fn snapshot(&self) -> MergedGraph {
        self.lock().clone()
    }

    /// Replace the merged graph and its ledger in one step.
    pub fn restore(&self, restored: MergedGraph) -> Result<(), MergeError> {
        restored.validate()?;
        *self.lock() = restored;
        Ok(())
    }

    pub fn total_sessions(&self) -> u64 {
        self.lock().total_sessions
    }

    fn lock(&self) -> MutexGuard<'_, MergedGraph> {
        // A panic while holding the lock cannot leave a half-merged session:
        // `absorb` runs only after every check has passed.
        self.graph.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
