//! Instrumentation capability used by traced code.
//!
//! Any call site can wrap a unit of work with [`CallHooks::on_enter`] and
//! [`CallHooks::on_exit`]. [`SessionTracer`] is the queue-backed
//! implementation for one session:
//!
//! ```no_run
//! # use flowtrace_core::{Branch, SessionId, Shape};
//! # use flowtrace_session::{event_queue, SessionTracer};
//! let (sender, _receiver) = event_queue(1024);
//! let tracer = SessionTracer::new(SessionId::new(), sender);
//!
//! let span = tracer.span("main_handler", Shape::from_pairs([("user_id", "int")]));
//! let inner = tracer.span("validate_input", Shape::new());
//! inner.finish(Branch::Success, Shape::from_pairs([("valid", "bool")]));
//! span.finish(Branch::Success, Shape::new());
//! ```
//!
//! Tracing never fails from the caller's point of view: rejected events
//! are counted by the queue and otherwise ignored.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use flowtrace_core::{Branch, CallEvent, EventKind, SessionId, Shape};

use crate::queue::EventSender;

/// What is known about a call when it starts.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub function_name: String,
    /// Explicit caller; `None` lets the builder use the session's call stack.
    pub caller_name: Option<String>,
    pub input_shape: Shape,
    pub started_at: DateTime<Utc>,
}

impl CallContext {
    pub fn new(function_name: impl Into<String>, input_shape: Shape) -> Self {
        Self {
            function_name: function_name.into(),
            caller_name: None,
            input_shape,
            started_at: Utc::now(),
        }
    }
}

/// How a call ended.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub result: Branch,
    pub output_shape: Shape,
}

/// Hooks invoked around a unit of work.
pub trait CallHooks: Send + Sync {
    fn on_enter(&self, ctx: &CallContext);
    fn on_exit(&self, ctx: &CallContext, outcome: CallOutcome);
}

/// Emits the calls of one session onto the event queue.
#[derive(Debug)]
pub struct SessionTracer {
    session_id: SessionId,
    sender: Option<EventSender>,
    next_seq: AtomicU64,
}

impl SessionTracer {
    pub fn new(session_id: SessionId, sender: EventSender) -> Self {
        Self {
            session_id,
            sender: Some(sender),
            next_seq: AtomicU64::new(0),
        }
    }

    /// A tracer that records nothing, for when tracing is switched off.
    pub fn disabled(session_id: SessionId) -> Self {
        Self {
            session_id,
            sender: None,
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Start a call; finish it with [`CallSpan::finish`].
    pub fn span(&self, function_name: impl Into<String>, input_shape: Shape) -> CallSpan<'_> {
        let ctx = CallContext::new(function_name, input_shape);
        self.on_enter(&ctx);
        CallSpan {
            tracer: self,
            ctx: Some(ctx),
        }
    }

    /// Report a call that already finished, as a single record.
    pub fn record_call(&self, ctx: CallContext, outcome: CallOutcome) {
        let mut event = self.event(EventKind::Call, &ctx);
        event.result = outcome.result;
        event.output_shape = outcome.output_shape;
        event.ended_at = Utc::now().max(ctx.started_at);
        self.emit(event);
    }

    fn event(&self, kind: EventKind, ctx: &CallContext) -> CallEvent {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut event = CallEvent::new(self.session_id, seq, kind, ctx.function_name.clone())
            .with_input(ctx.input_shape.clone());
        event.caller_name = ctx.caller_name.clone();
        event.started_at = ctx.started_at;
        event.ended_at = ctx.started_at;
        event
    }

    fn emit(&self, event: CallEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(e) = sender.enqueue(event) {
            tracing::trace!(session_id = %self.session_id, error = %e, "Call event not recorded");
        }
    }
}

impl CallHooks for SessionTracer {
    fn on_enter(&self, ctx: &CallContext) {
        if !self.is_enabled() {
            return;
        }
        let mut event = self.event(EventKind::Enter, ctx);
        event.result = Branch::Partial;
        self.emit(event);
    }

    fn on_exit(&self, ctx: &CallContext, outcome: CallOutcome) {
        if !self.is_enabled() {
            return;
        }
        let mut event = self.event(EventKind::Exit, ctx);
        event.result = outcome.result;
        event.output_shape = outcome.output_shape;
        event.ended_at = Utc::now().max(ctx.started_at);
        self.emit(event);
    }
}

/// An open call. Dropping it without `finish` records a partial outcome.
#[derive(Debug)]
pub struct CallSpan<'a> {
    tracer: &'a SessionTracer,
    ctx: Option<CallContext>,
}

impl CallSpan<'_> {
    pub fn finish(mut self, result: Branch, output_shape: Shape) {
        if let Some(ctx) = self.ctx.take() {
            self.tracer.on_exit(
                &ctx,
                CallOutcome {
                    result,
                    output_shape,
                },
            );
        }
    }
}

impl Drop for CallSpan<'_> {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.tracer.on_exit(
                &ctx,
                CallOutcome {
                    result: Branch::Partial,
                    output_shape: Shape::new(),
                },
            );
        }
    }
}
