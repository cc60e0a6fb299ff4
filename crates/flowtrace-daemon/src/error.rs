//! Error types for the flowtrace-daemon crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Config error: {0}")]
    Config(#[from] flowtrace_core::FlowtraceError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] flowtrace_merge::SnapshotError),

    #[error("Merge error: {0}")]
    Merge(#[from] flowtrace_merge::MergeError),

    #[error("Graph builder task failed: {0}")]
    Consumer(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
