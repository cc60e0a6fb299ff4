//! flowtrace-core: Shared types, configuration, and error handling for the flowtrace tracer.
//!
//! This crate provides the foundational types used across all flowtrace components:
//! - Session identifiers, call outcomes (branches) and field shapes
//! - The `CallEvent` record produced by instrumented call sites
//! - Configuration management
//! - Common error types

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::TraceConfig;
pub use error::FlowtraceError;
pub use events::{CallEvent, EventKind};
pub use types::{Branch, SessionId, Shape, ShapeSignature};
