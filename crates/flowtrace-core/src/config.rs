//! Configuration management for the flowtrace pipeline.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (FLOWTRACE__ prefix, `__` separator)
//! 2. Config file (flowtrace.toml), `[trace]` section
//! 3. Defaults

use serde::Deserialize;

use crate::error::Result;

/// Tracing pipeline configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TraceConfig {
    /// Master switch. When false no events are produced.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of buffered events before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum events handed to the builder per drain.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    /// Out-of-order events parked per session before a sequence gap is skipped.
    #[serde(default = "default_reorder_window")]
    pub reorder_window: usize,

    /// Producers number events in increasing order but may skip numbers.
    /// Missing numbers are then not reported as lost events.
    #[serde(default)]
    pub sparse_sequences: bool,

    /// How many completed session ids the builder remembers to reject late events.
    #[serde(default = "default_sealed_memory")]
    pub sealed_session_memory: usize,

    /// Interval between batch merge sweeps in seconds.
    #[serde(default = "default_merge_interval")]
    pub merge_interval_secs: u64,

    /// Merge each session as soon as it completes instead of waiting for a sweep.
    #[serde(default)]
    pub streaming_merge: bool,

    /// Where the merged graph snapshot is written on shutdown.
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_max_batch() -> usize {
    256
}

fn default_reorder_window() -> usize {
    1024
}

fn default_sealed_memory() -> usize {
    65_536
}

fn default_merge_interval() -> u64 {
    30
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            queue_capacity: default_queue_capacity(),
            max_batch: default_max_batch(),
            reorder_window: default_reorder_window(),
            sparse_sequences: false,
            sealed_session_memory: default_sealed_memory(),
            merge_interval_secs: default_merge_interval(),
            streaming_merge: false,
            snapshot_path: None,
        }
    }
}

impl TraceConfig {
    /// Load from `{file_prefix}.toml` (optional) and `FLOWTRACE__TRACE__*` variables.
    ///
    /// A missing `[trace]` section yields the defaults.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("FLOWTRACE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        match cfg.get::<TraceConfig>("trace") {
            Ok(c) => Ok(c),
            Err(config::ConfigError::NotFound(_)) => Ok(TraceConfig::default()),
            Err(e) => Err(e.into()),
        }
    }
}
