//! Merged graph persistence with BLAKE3 tamper evidence.
//!
//! The merged graph and its idempotency ledger live in one document, so
//! they are always saved and restored together. Saves go through a
//! temporary sibling file and a rename; a reader never observes a
//! half-written snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::merged::MergedGraph;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergedSnapshot {
    pub graph: MergedGraph,
    /// BLAKE3 hex digest of the graph's canonical JSON.
    pub content_hash: String,
    pub saved_at: DateTime<Utc>,
}

/// Compute the BLAKE3 hash of a merged graph.
///
/// All collections in the graph are ordered, so equal graphs hash equally.
pub fn compute_graph_hash(graph: &MergedGraph) -> Result<String, SnapshotError> {
    let json = serde_json::to_vec(graph)?;
    Ok(blake3::hash(&json).to_hex().to_string())
}

impl MergedSnapshot {
    pub fn capture(graph: MergedGraph) -> Result<Self, SnapshotError> {
        graph.validate()?;
        let content_hash = compute_graph_hash(&graph)?;
        Ok(Self {
            graph,
            content_hash,
            saved_at: Utc::now(),
        })
    }

    /// Verify that the stored hash matches a freshly computed one.
    pub fn verify_integrity(&self) -> bool {
        compute_graph_hash(&self.graph)
            .map(|hash| hash == self.content_hash)
            .unwrap_or(false)
    }

    /// Write the snapshot to `path`, replacing any previous one.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = temp_path(path);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;

        tracing::info!(
            path = %path.display(),
            total_sessions = self.graph.total_sessions,
            content_hash = %self.content_hash,
            "Merged graph snapshot saved"
        );
        Ok(())
    }

    /// Read a snapshot, checking its hash and ledger before returning it.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        if !path.exists() {
            return Err(SnapshotError::NotFound(path.display().to_string()));
        }
        let json = fs::read_to_string(path)?;
        let snapshot: MergedSnapshot = serde_json::from_str(&json)?;

        if !snapshot.verify_integrity() {
            return Err(SnapshotError::IntegrityViolation(path.display().to_string()));
        }
        snapshot.graph.validate()?;

        tracing::debug!(
            path = %path.display(),
            total_sessions = snapshot.graph.total_sessions,
            "Merged graph snapshot loaded"
        );
        Ok(snapshot)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
