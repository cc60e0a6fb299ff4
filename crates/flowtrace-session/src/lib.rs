//! flowtrace-session: Per-session call graph capture.
//!
//! Instrumented call sites push `CallEvent`s into a bounded queue without
//! ever blocking. A single consumer drains the queue into the
//! `SessionGraphBuilder`, which keeps one call stack per session and grows
//! that session's directed call graph. Completed graphs are handed to the
//! `SessionGraphStore`, where the merger picks them up.

pub mod builder;
pub mod error;
pub mod graph;
pub mod tracer;
pub mod queue;
pub mod store;

pub use builder::{BuilderStats, SessionGraphBuilder};
pub use error::{QueueError, StoreError};
pub use graph::{Degradation, EdgeKey, NodeInfo, SessionGraph, MAX_DEGRADATIONS};
pub use tracer::{CallContext, CallHooks, CallOutcome, CallSpan, SessionTracer};
pub use queue::{event_queue, EventReceiver, EventSender, QueueCounters};
pub use store::SessionGraphStore;
