//! flowtrace-merge: Consolidation of session call graphs.
//!
//! Folds any number of completed session graphs into one `MergedGraph`
//! that counts how often each function ran and how many sessions used each
//! call edge, and remembers every input/output shape signature seen per
//! function. Merging is idempotent per session id and independent of the
//! order in which sessions arrive. The stats pass ranks frequent paths and
//! flags error hotspots and shape drift; snapshots persist the graph
//! together with its idempotency ledger.

pub mod error;
pub mod merged;
pub mod merger;
pub mod snapshot;
pub mod stats;

pub use error::{MergeError, SnapshotError};
pub use merged::{EdgeStats, MergedGraph, MergedNode};
pub use merger::{FlowMerger, MergeReport, MergeSummary};
pub use snapshot::MergedSnapshot;
pub use stats::{Anomaly, FrequentPath, StatsExtractor, StatsReport};
