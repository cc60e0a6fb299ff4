//! Session graph builder.
//!
//! Owns every in-flight session: its graph, its call stack and a small
//! reorder buffer. Events are applied strictly in `sequence_no` order per
//! session, so producers racing on the queue cannot scramble a stack.
//! Sessions never share state; one builder serves all of them from a
//! single consumer task.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

use flowtrace_core::{Branch, CallEvent, EventKind, SessionId, Shape, TraceConfig};

use crate::graph::{Degradation, EdgeKey, SessionGraph};

/// Counters describing what the builder did with the events it saw.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct BuilderStats {
    /// Events folded into a session graph.
    pub applied: u64,
    /// Events whose sequence number was already applied (redelivery).
    pub duplicates: u64,
    /// Events for sessions that had already completed.
    pub late: u64,
    /// Sessions sealed and handed out.
    pub completed: u64,
    /// Sealed sessions that carry at least one degradation.
    pub degraded: u64,
}

#[derive(Debug)]
struct Frame {
    function_name: String,
    caller: Option<String>,
    started_at: DateTime<Utc>,
}

/// Position of a session in its own event sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// Nothing applied yet; the first sequence number is not known.
    Unstarted,
    /// The sequence number expected next.
    Next(u64),
    /// `u64::MAX` was applied; nothing can follow it.
    Exhausted,
}

impl Cursor {
    fn after(seq: u64) -> Self {
        seq.checked_add(1).map_or(Self::Exhausted, Self::Next)
    }
}

#[derive(Debug)]
struct SessionState {
    graph: SessionGraph,
    stack: Vec<Frame>,
    cursor: Cursor,
    parked: BTreeMap<u64, CallEvent>,
}

impl SessionState {
    fn new(session_id: SessionId) -> Self {
        Self {
            graph: SessionGraph::new(session_id),
            stack: Vec::new(),
            cursor: Cursor::Unstarted,
            parked: BTreeMap::new(),
        }
    }

    /// Already applied, or can never be applied.
    fn is_behind(&self, seq: u64) -> bool {
        match self.cursor {
            Cursor::Unstarted => false,
            Cursor::Next(next) => seq < next,
            Cursor::Exhausted => true,
        }
    }

    /// A session may always start at 0; later starts are only known once
    /// the lowest buffered event is chosen as the origin.
    fn is_next(&self, seq: u64) -> bool {
        match self.cursor {
            Cursor::Unstarted => seq == 0,
            Cursor::Next(next) => seq == next,
            Cursor::Exhausted => false,
        }
    }

    /// Apply parked events as long as they continue the sequence.
    fn apply_ready(&mut self) -> u64 {
        let mut applied = 0;
        while let Cursor::Next(next) = self.cursor {
            let Some(event) = self.parked.remove(&next) else {
                break;
            };
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Resume at the lowest parked event.
    ///
    /// Choosing the origin of an unstarted session is not a gap. Any other
    /// jump is recorded as `SequenceGap` when `report` is set.
    fn skip_gap(&mut self, report: bool) -> u64 {
        let Some((&resumed_at, _)) = self.parked.first_key_value() else {
            return 0;
        };
        match self.cursor {
            Cursor::Next(expected) if report => {
                self.graph.degrade(Degradation::SequenceGap {
                    expected,
                    resumed_at,
                });
            }
            Cursor::Exhausted => {
                self.parked.clear();
                return 0;
            }
            _ => {}
        }
        self.cursor = Cursor::Next(resumed_at);
        self.apply_ready()
    }

    /// Apply everything parked, in order.
    fn flush(&mut self, report: bool) -> u64 {
        let mut applied = 0;
        while !self.parked.is_empty() {
            applied += self.skip_gap(report);
        }
        applied
    }

    fn apply(&mut self, event: CallEvent) {
        self.cursor = Cursor::after(event.sequence_no);
        match event.kind {
            EventKind::Enter => self.enter(event),
            EventKind::Exit => self.exit(event),
            EventKind::Call => self.call(event),
        }
    }

    fn resolve_caller(&self, explicit: Option<String>) -> Option<String> {
        explicit.or_else(|| self.stack.last().map(|f| f.function_name.clone()))
    }

    fn enter(&mut self, event: CallEvent) {
        let caller = self.resolve_caller(event.caller_name);

        let node = self.graph.node_mut(&event.function_name);
        node.occurrences = node.occurrences.saturating_add(1);
        node.last_input_shape = event.input_shape;
        node.result = Branch::Partial;

        self.stack.push(Frame {
            function_name: event.function_name,
            caller,
            started_at: event.started_at,
        });
    }

    fn exit(&mut self, event: CallEvent) {
        let top = self.stack.last().map(|f| f.function_name.clone());
        if top.as_deref() == Some(event.function_name.as_str()) {
            if let Some(frame) = self.stack.pop() {
                self.close_frame(frame, event.result, event.output_shape, event.ended_at);
            }
            return;
        }

        self.graph.degrade(Degradation::StackCorruption {
            expected: top,
            found: event.function_name.clone(),
            sequence_no: event.sequence_no,
        });

        let position = self
            .stack
            .iter()
            .rposition(|f| f.function_name == event.function_name);

        match position {
            Some(index) => {
                // Frames above the match never exited.
                while self.stack.len() > index + 1 {
                    if let Some(abandoned) = self.stack.pop() {
                        let ended_at = event.ended_at;
                        self.close_frame(abandoned, Branch::Partial, Shape::new(), ended_at);
                    }
                }
                if let Some(frame) = self.stack.pop() {
                    self.close_frame(frame, event.result, event.output_shape, event.ended_at);
                }
            }
            // No matching enter: keep what the exit tells us as a standalone call.
            None => self.call(event),
        }
    }

    fn call(&mut self, event: CallEvent) {
        let duration_us = event.duration_us();
        let caller = self.resolve_caller(event.caller_name);

        let node = self.graph.node_mut(&event.function_name);
        node.occurrences = node.occurrences.saturating_add(1);
        node.last_input_shape = event.input_shape;
        node.last_output_shape = event.output_shape;
        node.result = event.result;
        node.total_duration_us = node.total_duration_us.saturating_add(duration_us);

        self.graph.record_edge(EdgeKey {
            from: caller,
            to: event.function_name,
            branch: event.result,
        });
    }

    fn close_frame(
        &mut self,
        frame: Frame,
        result: Branch,
        output_shape: Shape,
        ended_at: DateTime<Utc>,
    ) {
        let duration_us = (ended_at - frame.started_at)
            .num_microseconds()
            .map(|us| us.max(0) as u64)
            .unwrap_or(0);

        let node = self.graph.node_mut(&frame.function_name);
        node.last_output_shape = output_shape;
        node.result = result;
        node.total_duration_us = node.total_duration_us.saturating_add(duration_us);

        self.graph.record_edge(EdgeKey {
            from: frame.caller,
            to: frame.function_name,
            branch: result,
        });
    }

    /// Flush everything still pending and freeze the graph.
    fn seal(mut self, report_gaps: bool) -> SessionGraph {
        self.flush(report_gaps);

        while let Some(frame) = self.stack.pop() {
            self.graph.degrade(Degradation::UnterminatedCall {
                function_name: frame.function_name.clone(),
            });
            let started_at = frame.started_at;
            self.close_frame(frame, Branch::Partial, Shape::new(), started_at);
        }

        self.graph.prune_dangling_edges();
        self.graph.completed_at = Some(Utc::now());
        self.graph
    }
}

/// Builds one call graph per session from an ordered event stream.
#[derive(Debug)]
pub struct SessionGraphBuilder {
    sessions: HashMap<SessionId, SessionState>,
    sealed: HashSet<SessionId>,
    sealed_order: VecDeque<SessionId>,
    reorder_window: usize,
    sealed_memory: usize,
    sparse_sequences: bool,
    stats: BuilderStats,
}

impl Default for SessionGraphBuilder {
    fn default() -> Self {
        Self::new(&TraceConfig::default())
    }
}

impl SessionGraphBuilder {
    pub fn new(config: &TraceConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            sealed: HashSet::new(),
            sealed_order: VecDeque::new(),
            reorder_window: config.reorder_window.max(1),
            sealed_memory: config.sealed_session_memory,
            sparse_sequences: config.sparse_sequences,
            stats: BuilderStats::default(),
        }
    }

    /// Fold a drained batch into the session graphs.
    ///
    /// A batch is ordered per session, so once it is applied a session
    /// that has not started yet begins at its lowest buffered event. With
    /// sparse sequences every buffered event is applied as well.
    pub fn apply_batch(&mut self, events: Vec<CallEvent>) {
        let mut touched = BTreeSet::new();
        for event in events {
            touched.insert(event.session_id);
            self.apply(event);
        }

        for session_id in touched {
            let Some(state) = self.sessions.get_mut(&session_id) else {
                continue;
            };
            if self.sparse_sequences {
                self.stats.applied += state.flush(false);
            } else if state.cursor == Cursor::Unstarted {
                self.stats.applied += state.skip_gap(false);
            }
        }
    }

    /// Fold a single event into its session graph.
    pub fn apply(&mut self, event: CallEvent) {
        let session_id = event.session_id;
        if self.sealed.contains(&session_id) {
            self.stats.late += 1;
            tracing::debug!(
                session_id = %session_id,
                sequence_no = event.sequence_no,
                "Event for completed session ignored"
            );
            return;
        }

        let state = self
            .sessions
            .entry(session_id)
            .or_insert_with(|| SessionState::new(session_id));

        let seq = event.sequence_no;
        if state.is_behind(seq) || state.parked.contains_key(&seq) {
            self.stats.duplicates += 1;
            tracing::debug!(session_id = %session_id, sequence_no = seq, "Duplicate event ignored");
            return;
        }

        if !state.is_next(seq) {
            state.parked.insert(seq, event);
            if state.parked.len() > self.reorder_window {
                self.stats.applied += state.skip_gap(!self.sparse_sequences);
            }
            return;
        }

        state.apply(event);
        self.stats.applied += 1 + state.apply_ready();
    }

    /// Seal a session: no further events are accepted for it.
    ///
    /// Returns `None` when the session produced no events or was already
    /// completed.
    pub fn complete(&mut self, session_id: SessionId) -> Option<SessionGraph> {
        let state = self.sessions.remove(&session_id)?;
        let parked = state.parked.len() as u64;
        let graph = state.seal(!self.sparse_sequences);

        self.stats.applied += parked;
        self.stats.completed += 1;
        if graph.is_degraded() {
            self.stats.degraded += 1;
        }
        self.remember_sealed(session_id);

        tracing::debug!(
            session_id = %session_id,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            degraded = graph.is_degraded(),
            "Session graph completed"
        );
        Some(graph)
    }

    /// Look at a session that is still being built.
    pub fn in_flight(&self, session_id: SessionId) -> Option<&SessionGraph> {
        self.sessions.get(&session_id).map(|s| &s.graph)
    }

    /// Ids of all sessions still being built.
    pub fn in_flight_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn stats(&self) -> BuilderStats {
        self.stats
    }

    fn remember_sealed(&mut self, session_id: SessionId) {
        if self.sealed_memory == 0 {
            return;
        }
        if self.sealed.insert(session_id) {
            self.sealed_order.push_back(session_id);
        }
        while self.sealed_order.len() > self.sealed_memory {
            if let Some(oldest) = self.sealed_order.pop_front() {
                self.sealed.remove(&oldest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Script {
        session: SessionId,
        seq: u64,
        events: Vec<CallEvent>,
    }

    impl Script {
        fn new() -> Self {
            Self {
                session: SessionId::new(),
                seq: 0,
                events: Vec::new(),
            }
        }

        fn push(&mut self, kind: EventKind, name: &str, result: Branch) -> &mut CallEvent {
            let event = CallEvent::new(self.session, self.seq, kind, name).with_result(result);
            self.seq += 1;
            self.events.push(event);
            self.events.last_mut().unwrap()
        }

        fn enter(&mut self, name: &str) -> &mut Self {
            self.push(EventKind::Enter, name, Branch::Partial);
            self
        }

        fn exit(&mut self, name: &str, result: Branch) -> &mut Self {
            self.push(EventKind::Exit, name, result);
            self
        }

        fn call(&mut self, name: &str, result: Branch) -> &mut Self {
            self.push(EventKind::Call, name, result);
            self
        }
    }

    fn build(script: &Script) -> SessionGraph {
        let mut builder = SessionGraphBuilder::default();
        builder.apply_batch(script.events.clone());
        builder.complete(script.session).unwrap()
    }

    #[test]
    fn nested_calls_resolve_caller_from_stack() {
        let mut s = Script::new();
        s.enter("main_handler")
            .enter("validate_input")
            .exit("validate_input", Branch::Success)
            .call("audit", Branch::Success)
            .exit("main_handler", Branch::Success);

        let graph = build(&s);
        assert!(!graph.is_degraded());
        assert!(graph.contains_edge(None, "main_handler", Branch::Success));
        assert!(graph.contains_edge(Some("main_handler"), "validate_input", Branch::Success));
        assert!(graph.contains_edge(Some("main_handler"), "audit", Branch::Success));
        assert_eq!(graph.roots().len(), 1);
    }

    #[test]
    fn distinct_branches_are_distinct_edges() {
        let mut s = Script::new();
        s.enter("main")
            .call("fetch", Branch::Success)
            .call("fetch", Branch::Error)
            .call("fetch", Branch::Success)
            .exit("main", Branch::Partial);

        let graph = build(&s);
        assert_eq!(graph.edges[&EdgeKey::new(Some("main"), "fetch", Branch::Success)], 2);
        assert_eq!(graph.edges[&EdgeKey::new(Some("main"), "fetch", Branch::Error)], 1);
        assert_eq!(graph.node("fetch").unwrap().occurrences, 3);
        assert_eq!(graph.node("fetch").unwrap().result, Branch::Success);
    }

    #[test]
    fn last_write_wins_for_shapes() {
        let mut s = Script::new();
        s.enter("main");
        s.push(EventKind::Call, "parse", Branch::Success).input_shape =
            Shape::from_pairs([("a", "int")]);
        s.push(EventKind::Call, "parse", Branch::Success).input_shape =
            Shape::from_pairs([("a", "int"), ("b", "str")]);
        s.exit("main", Branch::Success);

        let graph = build(&s);
        let node = graph.node("parse").unwrap();
        assert_eq!(node.last_input_shape.len(), 2);
        assert_eq!(node.occurrences, 2);
    }

    #[test]
    fn recursion_keeps_self_loop() {
        let mut s = Script::new();
        s.enter("walk")
            .enter("walk")
            .enter("walk")
            .exit("walk", Branch::Success)
            .exit("walk", Branch::Success)
            .exit("walk", Branch::Success);

        let graph = build(&s);
        assert!(!graph.is_degraded());
        assert_eq!(graph.edges[&EdgeKey::new(Some("walk"), "walk", Branch::Success)], 2);
        assert_eq!(graph.node("walk").unwrap().occurrences, 3);
        assert!(graph.is_dag_except_self_loops());
    }

    #[test]
    fn out_of_order_events_are_applied_by_sequence() {
        let mut s = Script::new();
        s.enter("main")
            .enter("child")
            .exit("child", Branch::Success)
            .exit("main", Branch::Success);

        let mut shuffled = s.events.clone();
        shuffled.reverse();

        let mut builder = SessionGraphBuilder::default();
        for event in shuffled {
            builder.apply(event);
        }
        assert_eq!(builder.stats().applied, 4);

        let graph = builder.complete(s.session).unwrap();
        assert!(!graph.is_degraded());
        assert!(graph.contains_edge(Some("main"), "child", Branch::Success));
    }

    #[test]
    fn redelivered_events_are_ignored() {
        let mut s = Script::new();
        s.enter("main").call("child", Branch::Success).exit("main", Branch::Success);

        let mut builder = SessionGraphBuilder::default();
        builder.apply_batch(s.events.clone());
        builder.apply_batch(s.events.clone());
        assert_eq!(builder.stats().duplicates, 3);

        let graph = builder.complete(s.session).unwrap();
        assert_eq!(graph.node("child").unwrap().occurrences, 1);
    }

    #[test]
    fn mismatched_exit_marks_degraded_instead_of_failing() {
        let mut s = Script::new();
        s.enter("main")
            .enter("child")
            .exit("main", Branch::Success);

        let graph = build(&s);
        assert!(graph.is_degraded());
        assert!(matches!(
            &graph.degradations[0],
            Degradation::StackCorruption { expected: Some(e), found, .. }
                if e == "child" && found == "main"
        ));
        assert!(graph.contains_edge(Some("main"), "child", Branch::Partial));
        assert!(graph.contains_edge(None, "main", Branch::Success));
    }

    #[test]
    fn exit_without_enter_becomes_standalone_call() {
        let mut s = Script::new();
        s.exit("orphan", Branch::Error);

        let graph = build(&s);
        assert!(graph.is_degraded());
        assert!(graph.contains_edge(None, "orphan", Branch::Error));
    }

    #[test]
    fn completion_closes_open_frames_as_partial() {
        let mut s = Script::new();
        s.enter("main").enter("slow");

        let graph = build(&s);
        let unterminated = graph
            .degradations
            .iter()
            .filter(|d| matches!(d, Degradation::UnterminatedCall { .. }))
            .count();
        assert_eq!(unterminated, 2);
        assert!(graph.contains_edge(Some("main"), "slow", Branch::Partial));
        assert!(graph.contains_edge(None, "main", Branch::Partial));
    }

    #[test]
    fn sequence_gap_is_skipped_on_completion() {
        let mut s = Script::new();
        s.enter("main").call("lost", Branch::Success).call("kept", Branch::Success);
        s.exit("main", Branch::Success);
        s.events.remove(1);

        let graph = build(&s);
        assert!(graph
            .degradations
            .contains(&Degradation::SequenceGap { expected: 1, resumed_at: 2 }));
        assert!(graph.node("lost").is_none());
        assert!(graph.contains_edge(Some("main"), "kept", Branch::Success));
    }

    #[test]
    fn reorder_window_overflow_skips_gap_early() {
        let config = TraceConfig {
            reorder_window: 2,
            ..TraceConfig::default()
        };
        let mut builder = SessionGraphBuilder::new(&config);
        let session = SessionId::new();

        for seq in [0, 2, 3, 4] {
            builder.apply(CallEvent::new(session, seq, EventKind::Call, format!("f{seq}")));
        }
        let graph = builder.in_flight(session).unwrap();
        assert_eq!(graph.nodes.len(), 4);
        assert_eq!(
            graph.degradations,
            vec![Degradation::SequenceGap { expected: 1, resumed_at: 2 }]
        );
    }

    #[test]
    fn one_based_sequences_are_not_degraded() {
        let session = SessionId::new();
        let events = vec![
            CallEvent::new(session, 1, EventKind::Call, "main"),
            CallEvent::new(session, 2, EventKind::Call, "child").with_caller("main"),
        ];

        let mut builder = SessionGraphBuilder::default();
        builder.apply_batch(events.clone());
        assert_eq!(builder.in_flight(session).unwrap().nodes.len(), 2);

        let graph = builder.complete(session).unwrap();
        assert!(!graph.is_degraded());
        assert!(graph.contains_edge(Some("main"), "child", Branch::Success));

        // Applied one by one, the origin is chosen at completion.
        let mut builder = SessionGraphBuilder::default();
        for event in events {
            builder.apply(event);
        }
        let graph = builder.complete(session).unwrap();
        assert!(!graph.is_degraded());
        assert_eq!(builder.stats().applied, 2);
    }

    #[test]
    fn sparse_sequences_skip_numbers_silently() {
        let config = TraceConfig {
            sparse_sequences: true,
            reorder_window: 2,
            ..TraceConfig::default()
        };
        let mut builder = SessionGraphBuilder::new(&config);
        let session = SessionId::new();

        for i in 0..10u64 {
            let event = CallEvent::new(session, i * 10 + 5, EventKind::Call, format!("f{i}"));
            builder.apply_batch(vec![event]);
            assert_eq!(builder.in_flight(session).unwrap().nodes.len(), i as usize + 1);
        }
        // Older than what was already applied.
        builder.apply(CallEvent::new(session, 7, EventKind::Call, "stale"));
        assert_eq!(builder.stats().duplicates, 1);

        let graph = builder.complete(session).unwrap();
        assert!(!graph.is_degraded());
        assert_eq!(graph.nodes.len(), 10);
    }

    #[test]
    fn strided_sequences_keep_degradations_bounded() {
        let config = TraceConfig {
            reorder_window: 1,
            ..TraceConfig::default()
        };
        let mut builder = SessionGraphBuilder::new(&config);
        let session = SessionId::new();

        for i in 0..1_000u64 {
            builder.apply_batch(vec![CallEvent::new(session, i * 2, EventKind::Call, "tick")]);
        }
        let graph = builder.complete(session).unwrap();
        assert!(graph.is_degraded());
        assert_eq!(graph.degradations.len(), crate::graph::MAX_DEGRADATIONS);
        assert_eq!(
            graph.degradations.len() as u64 + graph.suppressed_degradations,
            999
        );
        assert_eq!(graph.node("tick").unwrap().occurrences, 1_000);
    }

    #[test]
    fn max_sequence_number_does_not_overflow() {
        let session = SessionId::new();
        let mut builder = SessionGraphBuilder::default();
        builder.apply(CallEvent::new(session, 0, EventKind::Call, "main"));
        builder.apply(CallEvent::new(session, u64::MAX, EventKind::Call, "last"));

        let graph = builder.complete(session).unwrap();
        assert!(graph.node("last").is_some());
        assert!(graph.degradations.contains(&Degradation::SequenceGap {
            expected: 1,
            resumed_at: u64::MAX,
        }));

        // Nothing can follow the largest sequence number.
        let other = SessionId::new();
        builder.apply_batch(vec![CallEvent::new(other, u64::MAX, EventKind::Call, "only")]);
        builder.apply(CallEvent::new(other, 3, EventKind::Call, "after"));
        assert_eq!(builder.stats().duplicates, 1);
        let graph = builder.complete(other).unwrap();
        assert!(graph.node("after").is_none());
        assert!(!graph.is_degraded());
    }

    #[test]
    fn events_after_completion_are_late() {
        let mut s = Script::new();
        s.call("main", Branch::Success);

        let mut builder = SessionGraphBuilder::default();
        builder.apply_batch(s.events.clone());
        assert!(builder.complete(s.session).is_some());

        builder.apply(CallEvent::new(s.session, 1, EventKind::Call, "straggler"));
        assert_eq!(builder.stats().late, 1);
        assert!(builder.complete(s.session).is_none());
    }

    #[test]
    fn sessions_do_not_interfere() {
        let mut a = Script::new();
        let mut b = Script::new();
        a.enter("a_main");
        b.enter("b_main");
        a.call("a_child", Branch::Success);
        b.call("b_child", Branch::Error);
        a.exit("a_main", Branch::Success);
        b.exit("b_main", Branch::Success);

        let mut interleaved = Vec::new();
        for (x, y) in a.events.iter().zip(b.events.iter()) {
            interleaved.push(y.clone());
            interleaved.push(x.clone());
        }

        let mut builder = SessionGraphBuilder::default();
        builder.apply_batch(interleaved);
        let ga = builder.complete(a.session).unwrap();
        let gb = builder.complete(b.session).unwrap();

        assert!(ga.contains_edge(Some("a_main"), "a_child", Branch::Success));
        assert!(gb.contains_edge(Some("b_main"), "b_child", Branch::Error));
        assert!(ga.node("b_child").is_none());
        assert!(!ga.is_degraded() && !gb.is_degraded());
    }

    #[test]
    fn explicit_caller_overrides_stack() {
        let mut s = Script::new();
        s.call("worker", Branch::Success);
        s.push(EventKind::Call, "callback", Branch::Success).caller_name = Some("worker".into());

        let graph = build(&s);
        assert!(graph.contains_edge(Some("worker"), "callback", Branch::Success));
    }

    #[test]
    fn duration_is_accumulated() {
        let session = SessionId::new();
        let start = Utc::now();
        let events = vec![
            CallEvent::new(session, 0, EventKind::Enter, "main").with_times(start, start),
            CallEvent::new(session, 1, EventKind::Exit, "main")
                .with_times(start, start + chrono::Duration::milliseconds(5)),
        ];
        let mut builder = SessionGraphBuilder::default();
        builder.apply_batch(events);
        let graph = builder.complete(session).unwrap();
        assert_eq!(graph.node("main").unwrap().total_duration_us, 5_000);
    }
}
