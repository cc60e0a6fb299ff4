//! flowtrace-daemon: The running tracer.
//!
//! Wires the event queue, the single graph-building consumer task, the
//! session store and the merger into a `TracePipeline`, runs periodic
//! merge sweeps, and replays recorded event streams from disk.

pub mod error;
pub mod pipeline;
pub mod replay;
pub mod scheduler;

pub use error::DaemonError;
pub use pipeline::{PipelineReport, TracePipeline};
