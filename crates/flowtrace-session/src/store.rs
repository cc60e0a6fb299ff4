//! Session graph store: completed session graphs waiting to be merged.
//!
//! Only completed graphs are ever stored, so every reader sees a frozen
//! snapshot. The map is the one structure shared between the builder side
//! (writer) and the merger (reader), hence the sharded `DashMap`.

use std::sync::Arc;

use dashmap::DashMap;

use flowtrace_core::SessionId;

use crate::error::StoreError;
use crate::graph::SessionGraph;

#[derive(Debug, Default)]
pub struct SessionGraphStore {
    sessions: DashMap<SessionId, Arc<SessionGraph>>,
}

impl SessionGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a completed graph. Graphs are immutable once stored.
    pub fn put(&self, graph: SessionGraph) -> Result<(), StoreError> {
        let session_id = graph.session_id;
        if !graph.is_completed() {
            return Err(StoreError::NotCompleted(session_id));
        }

        match self.sessions.entry(session_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::AlreadyStored(session_id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(graph));
                tracing::debug!(session_id = %session_id, "Session graph stored");
                Ok(())
            }
        }
    }

    pub fn get(&self, session_id: SessionId) -> Result<Arc<SessionGraph>, StoreError> {
        self.sessions
            .get(&session_id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::UnknownSession(session_id))
    }

    /// All stored graphs, ordered by session id.
    ///
    /// Returns cloned handles so no shard lock is held by the caller.
    pub fn list_completed(&self) -> Vec<Arc<SessionGraph>> {
        let mut graphs: Vec<Arc<SessionGraph>> =
            self.sessions.iter().map(|entry| entry.value().clone()).collect();
        graphs.sort_by_key(|g| g.session_id);
        graphs
    }

    /// Drop a graph, typically right after it was merged.
    pub fn remove(&self, session_id: SessionId) -> Option<Arc<SessionGraph>> {
        self.sessions.remove(&session_id).map(|(_, graph)| graph)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
