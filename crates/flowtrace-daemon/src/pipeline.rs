//! The tracing pipeline.
//!
//! Producers enqueue events and never wait. One consumer task drains the
//! queue into the `SessionGraphBuilder`, the only place session graphs are
//! mutated. Completion signals travel on a separate unbounded channel so
//! they are never dropped under backpressure; before sealing a session the
//! consumer applies everything already buffered, which covers the events
//! the producer enqueued before signalling. Sealed graphs go to the store,
//! where the merger picks them up on a schedule, on demand, or right away
//! in streaming mode.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use flowtrace_core::{CallEvent, SessionId, TraceConfig};
use flowtrace_merge::{
    FlowMerger, MergeError, MergeReport, MergedGraph, MergedSnapshot, StatsExtractor, StatsReport,
};
use flowtrace_session::{
    event_queue, BuilderStats, EventReceiver, EventSender, QueueCounters, QueueError,
    SessionGraph, SessionGraphBuilder, SessionGraphStore, SessionTracer, StoreError,
};

use crate::error::Result;
use crate::scheduler::MergeScheduler;

/// Final accounting returned by a graceful shutdown.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub queue: QueueCounters,
    pub builder: BuilderStats,
    pub final_merge: MergeReport,
    pub total_sessions: u64,
    /// Sessions that never received a completion signal.
    pub incomplete_sessions: usize,
    pub snapshot_path: Option<String>,
}

struct ConsumerExit {
    stats: BuilderStats,
    incomplete_sessions: usize,
}

/// Where sealed session graphs go.
#[derive(Clone)]
struct CompletionSink {
    store: Arc<SessionGraphStore>,
    streaming: Option<Arc<FlowMerger>>,
}

impl CompletionSink {
    fn accept(&self, graph: SessionGraph) {
        let session_id = graph.session_id;
        if let Err(e) = self.store.put(graph) {
            tracing::warn!(session_id = %session_id, error = %e, "Completed session not stored");
            return;
        }

        let Some(merger) = &self.streaming else {
            return;
        };
        let Ok(stored) = self.store.get(session_id) else {
            return;
        };
        match merger.merge(&stored) {
            Ok(_) | Err(MergeError::AlreadyMerged(_)) => {
                self.store.remove(session_id);
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Streaming merge skipped");
            }
        }
    }
}

pub struct TracePipeline {
    config: TraceConfig,
    sender: EventSender,
    completions: mpsc::UnboundedSender<SessionId>,
    store: Arc<SessionGraphStore>,
    merger: Arc<FlowMerger>,
    consumer: JoinHandle<ConsumerExit>,
    scheduler: Option<JoinHandle<()>>,
}

impl TracePipeline {
    /// Start the pipeline with an empty merged graph. Must be called from
    /// within a tokio runtime.
    pub fn start(config: TraceConfig) -> Self {
        Self::with_merger(config, FlowMerger::new())
    }

    /// Start from the configured snapshot when one exists.
    pub fn resume(config: TraceConfig) -> Result<Self> {
        let merger = match config.snapshot_path.as_deref().map(Path::new) {
            Some(path) if path.exists() => {
                let snapshot = MergedSnapshot::load(path)?;
                tracing::info!(
                    path = %path.display(),
                    total_sessions = snapshot.graph.total_sessions,
                    "Resuming from snapshot"
                );
                FlowMerger::with_graph(snapshot.graph)?
            }
            _ => FlowMerger::new(),
        };
        Ok(Self::with_merger(config, merger))
    }

    pub fn with_merger(config: TraceConfig, merger: FlowMerger) -> Self {
        let (sender, receiver) = event_queue(config.queue_capacity);
        let (completions, completion_rx) = mpsc::unbounded_channel();
        let store = Arc::new(SessionGraphStore::new());
        let merger = Arc::new(merger);

        let sink = CompletionSink {
            store: store.clone(),
            streaming: config.streaming_merge.then(|| merger.clone()),
        };
        let builder = SessionGraphBuilder::new(&config);
        let consumer = tokio::spawn(run_consumer(
            receiver,
            completion_rx,
            builder,
            sink,
            config.max_batch,
        ));

        let scheduler = (!config.streaming_merge && config.merge_interval_secs > 0).then(|| {
            MergeScheduler::new(
                merger.clone(),
                store.clone(),
                Duration::from_secs(config.merge_interval_secs),
            )
            .spawn()
        });

        tracing::info!(
            enabled = config.enabled,
            queue_capacity = config.queue_capacity,
            streaming_merge = config.streaming_merge,
            "Trace pipeline started"
        );

        Self {
            config,
            sender,
            completions,
            store,
            merger,
            consumer,
            scheduler,
        }
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Instrumentation handle for one session. Records nothing when
    /// tracing is disabled.
    pub fn tracer(&self, session_id: SessionId) -> SessionTracer {
        if self.config.enabled {
            SessionTracer::new(session_id, self.sender.clone())
        } else {
            SessionTracer::disabled(session_id)
        }
    }

    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Accept an event from the instrumentation layer without waiting.
    pub fn ingest(&self, event: CallEvent) -> std::result::Result<(), QueueError> {
        self.sender.enqueue(event)
    }

    /// Signal that no more events will arrive for `session_id`.
    pub fn complete_session(&self, session_id: SessionId) {
        if self.completions.send(session_id).is_err() {
            tracing::warn!(session_id = %session_id, "Completion signal after consumer exit");
        }
    }

    /// Merge every completed session now.
    pub fn merge_now(&self) -> MergeReport {
        self.merger.merge_completed(&self.store)
    }

    /// A completed session that has not been merged and removed yet.
    pub fn get_session_graph(
        &self,
        session_id: SessionId,
    ) -> std::result::Result<Arc<SessionGraph>, StoreError> {
        self.store.get(session_id)
    }

    pub fn get_merged_graph(&self) -> MergedGraph {
        self.merger.snapshot()
    }

    pub fn stats(&self, top: usize) -> StatsReport {
        StatsExtractor::new(&self.merger.snapshot()).report(top)
    }

    pub fn merger(&self) -> Arc<FlowMerger> {
        self.merger.clone()
    }

    pub fn store(&self) -> Arc<SessionGraphStore> {
        self.store.clone()
    }

    pub fn queue_counters(&self) -> QueueCounters {
        self.sender.counters()
    }

    /// Stop accepting events, build graphs from everything buffered, run a
    /// final merge and write the configured snapshot.
    pub async fn shutdown(self) -> Result<PipelineReport> {
        self.sender.shutdown();
        let exit = self.consumer.await?;

        if let Some(scheduler) = self.scheduler {
            scheduler.abort();
        }

        let final_merge = self.merger.merge_completed(&self.store);

        let snapshot_path = match &self.config.snapshot_path {
            Some(path) => {
                MergedSnapshot::capture(self.merger.snapshot())?.save(Path::new(path))?;
                Some(path.clone())
            }
            None => None,
        };

        if exit.incomplete_sessions > 0 {
            tracing::warn!(
                sessions = exit.incomplete_sessions,
                "Sessions never completed; their events were not merged"
            );
        }

        let report = PipelineReport {
            queue: self.sender.counters(),
            builder: exit.stats,
            final_merge,
            total_sessions: self.merger.total_sessions(),
            incomplete_sessions: exit.incomplete_sessions,
            snapshot_path,
        };

        tracing::info!(
            total_sessions = report.total_sessions,
            dropped = report.queue.dropped,
            malformed = report.queue.malformed,
            "Trace pipeline stopped"
        );
        Ok(report)
    }

    /// Stop immediately. Buffered events and unmerged sessions are lost.
    pub fn cancel(self) {
        self.sender.shutdown();
        self.consumer.abort();
        if let Some(scheduler) = self.scheduler {
            scheduler.abort();
        }
        tracing::info!("Trace pipeline cancelled");
    }
}

async fn run_consumer(
    mut receiver: EventReceiver,
    mut completions: mpsc::UnboundedReceiver<SessionId>,
    mut builder: SessionGraphBuilder,
    sink: CompletionSink,
    max_batch: usize,
) -> ConsumerExit {
    loop {
        tokio::select! {
            batch = receiver.drain(max_batch) => match batch {
                Some(events) => builder.apply_batch(events),
                None => break,
            },
            Some(session_id) = completions.recv() => {
                flush_buffered(&mut receiver, &mut builder, max_batch);
                if let Some(graph) = builder.complete(session_id) {
                    sink.accept(graph);
                }
            }
        }
    }

    // The queue is drained; honour completions that raced with shutdown.
    while let Ok(session_id) = completions.try_recv() {
        if let Some(graph) = builder.complete(session_id) {
            sink.accept(graph);
        }
    }

    ConsumerExit {
        stats: builder.stats(),
        incomplete_sessions: builder.in_flight_sessions().len(),
    }
}

fn flush_buffered(receiver: &mut EventReceiver, builder: &mut SessionGraphBuilder, max_batch: usize) {
    loop {
        let batch = receiver.try_drain(max_batch);
        if batch.is_empty() {
            break;
        }
        builder.apply_batch(batch);
    }
}
