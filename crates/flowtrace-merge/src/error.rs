//! Error types for the flowtrace-merge crate.

use flowtrace_core::SessionId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// The session is already part of the merged graph. Expected under
    /// at-least-once delivery; not a failure.
    #[error("Session {0} already merged")]
    AlreadyMerged(SessionId),

    #[error("Session {session_id} is still in flight")]
    NotCompleted { session_id: SessionId },

    #[error("Session {session_id} has an invalid graph: {reason}")]
    InvalidGraph {
        session_id: SessionId,
        reason: String,
    },

    #[error("Merged graph is inconsistent: {0}")]
    Inconsistent(String),
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    #[error("Integrity check failed for snapshot {0}: stored hash does not match content")]
    IntegrityViolation(String),

    #[error("Snapshot graph is inconsistent: {0}")]
    Inconsistent(#[from] MergeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
