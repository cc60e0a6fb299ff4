//! Error types for the flowtrace-session crate.

use flowtrace_core::SessionId;
use thiserror::Error;

/// Why an event did not make it into the queue.
///
/// Producers may inspect these but never have to: every rejection is
/// already counted in the queue statistics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Event queue full, event dropped")]
    QueueFull,

    #[error("Malformed event rejected: {0}")]
    MalformedEvent(String),

    #[error("Event queue shut down")]
    Closed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Session graph not found: {0}")]
    UnknownSession(SessionId),

    #[error("Session {0} is still in flight and cannot be stored")]
    NotCompleted(SessionId),

    #[error("Session {0} already stored; completed graphs are immutable")]
    AlreadyStored(SessionId),
}
