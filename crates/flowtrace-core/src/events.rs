//! Call events emitted by instrumented call sites.
//!
//! A `CallEvent` is immutable once produced. Events of one session are
//! ordered by `sequence_no`, which starts at 0 and increases by one per
//! event; timestamps are informational only and may tie.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FlowtraceError, Result};
use crate::types::{Branch, SessionId, Shape};

/// Which part of a call an event describes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The function started: its frame is pushed on the session stack.
    Enter,
    /// The function returned: its frame is popped and the outcome recorded.
    Exit,
    /// A complete call reported in one record; the stack is left untouched.
    #[default]
    Call,
}

/// One observed function invocation (or half of one).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallEvent {
    pub session_id: SessionId,
    pub function_name: String,
    /// Explicit caller. When absent the builder uses the top of the
    /// session's call stack, or treats the call as the session root.
    #[serde(default)]
    pub caller_name: Option<String>,
    #[serde(default)]
    pub input_shape: Shape,
    #[serde(default)]
    pub output_shape: Shape,
    pub result: Branch,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub sequence_no: u64,
    #[serde(default)]
    pub kind: EventKind,
}

impl CallEvent {
    /// Create a successful event stamped with the current time.
    pub fn new(
        session_id: SessionId,
        sequence_no: u64,
        kind: EventKind,
        function_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            function_name: function_name.into(),
            caller_name: None,
            input_shape: Shape::new(),
            output_shape: Shape::new(),
            result: Branch::Success,
            started_at: now,
            ended_at: now,
            sequence_no,
            kind,
        }
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller_name = Some(caller.into());
        self
    }

    pub fn with_input(mut self, shape: Shape) -> Self {
        self.input_shape = shape;
        self
    }

    pub fn with_output(mut self, shape: Shape) -> Self {
        self.output_shape = shape;
        self
    }

    pub fn with_result(mut self, result: Branch) -> Self {
        self.result = result;
        self
    }

    pub fn with_times(mut self, started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self.ended_at = ended_at;
        self
    }

    /// Wall-clock duration in microseconds, zero if the clock went backwards.
    pub fn duration_us(&self) -> u64 {
        (self.ended_at - self.started_at)
            .num_microseconds()
            .map(|us| us.max(0) as u64)
            .unwrap_or(0)
    }

    /// Reject events that must never enter a graph.
    pub fn validate(&self) -> Result<()> {
        if self.function_name.trim().is_empty() {
            return Err(FlowtraceError::MalformedEvent(format!(
                "empty function name (session {}, seq {})",
                self.session_id, self.sequence_no
            )));
        }
        if matches!(self.caller_name.as_deref(), Some(c) if c.trim().is_empty()) {
            return Err(FlowtraceError::MalformedEvent(format!(
                "empty caller name for {}",
                self.function_name
            )));
        }
        if self.ended_at < self.started_at {
            return Err(FlowtraceError::MalformedEvent(format!(
                "{} ended before it started",
                self.function_name
            )));
        }
        Ok(())
    }

    /// Parse and validate one serialized record.
    pub fn from_json(line: &str) -> Result<Self> {
        let event: CallEvent = serde_json::from_str(line)
            .map_err(|e| FlowtraceError::MalformedEvent(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }
}
