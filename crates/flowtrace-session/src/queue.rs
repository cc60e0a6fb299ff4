//! Bounded event queue between instrumented call sites and the graph builder.
//!
//! Producers call [`EventSender::enqueue`], which never waits: when the
//! buffer is full the incoming event is dropped and counted. The single
//! consumer awaits batches with [`EventReceiver::drain`]. After
//! [`EventSender::shutdown`] the receiver keeps handing out whatever is
//! still buffered and only then reports end-of-stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use flowtrace_core::{CallEvent, SessionId};

use crate::error::QueueError;

#[derive(Debug, Default)]
struct QueueStats {
    accepted: AtomicU64,
    dropped: AtomicU64,
    malformed: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of the queue counters.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct QueueCounters {
    /// Events buffered for the consumer.
    pub accepted: u64,
    /// Events dropped because the buffer was full.
    pub dropped: u64,
    /// Events rejected by validation.
    pub malformed: u64,
    /// Events offered after shutdown.
    pub rejected: u64,
}

impl QueueStats {
    fn snapshot(&self) -> QueueCounters {
        QueueCounters {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Create a queue holding at most `capacity` events.
pub fn event_queue(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let stats = Arc::new(QueueStats::default());

    let sender = EventSender {
        tx,
        stats: stats.clone(),
        shutdown: Arc::new(shutdown_tx),
    };
    let receiver = EventReceiver {
        rx,
        shutdown: shutdown_rx,
        closing: false,
        stats,
    };
    (sender, receiver)
}

/// Producer half. Cheap to clone; one per call site or request is fine.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<CallEvent>,
    stats: Arc<QueueStats>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl EventSender {
    /// Offer an event without waiting.
    pub fn enqueue(&self, event: CallEvent) -> Result<(), QueueError> {
        if let Err(e) = event.validate() {
            self.stats.malformed.fetch_add(1, Ordering::Relaxed);
            return Err(QueueError::MalformedEvent(e.to_string()));
        }
        if self.is_shut_down() {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(QueueError::Closed);
        }

        match self.tx.try_send(event) {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    session_id = %event.session_id,
                    sequence_no = event.sequence_no,
                    "Event queue full, dropping event"
                );
                Err(QueueError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                Err(QueueError::Closed)
            }
        }
    }

    /// Parse a serialized record and offer it. Returns the record's session.
    pub fn enqueue_json(&self, line: &str) -> Result<SessionId, QueueError> {
        let event = match CallEvent::from_json(line) {
            Ok(event) => event,
            Err(e) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                return Err(QueueError::MalformedEvent(e.to_string()));
            }
        };
        let session_id = event.session_id;
        self.enqueue(event)?;
        Ok(session_id)
    }

    /// Offer an event, waiting for buffer space instead of dropping.
    ///
    /// Only for bulk ingest such as replaying a recorded trace. Traced code
    /// must use [`enqueue`](Self::enqueue).
    pub async fn enqueue_wait(&self, event: CallEvent) -> Result<(), QueueError> {
        if let Err(e) = event.validate() {
            self.stats.malformed.fetch_add(1, Ordering::Relaxed);
            return Err(QueueError::MalformedEvent(e.to_string()));
        }
        if self.is_shut_down() {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(QueueError::Closed);
        }
        match self.tx.send(event).await {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(_) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                Err(QueueError::Closed)
            }
        }
    }

    /// Stop accepting events. Already buffered events are still delivered.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn counters(&self) -> QueueCounters {
        self.stats.snapshot()
    }
}

enum Wake {
    Event(Option<CallEvent>),
    Shutdown,
}

/// Consumer half. Exactly one exists per queue.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<CallEvent>,
    shutdown: watch::Receiver<bool>,
    closing: bool,
    stats: Arc<QueueStats>,
}

impl EventReceiver {
    /// Wait for at least one event and return up to `max_batch` of them.
    ///
    /// Returns `None` once the queue is shut down (or every sender is gone)
    /// and the buffer is empty. Within a batch, events are ordered by
    /// session and then `sequence_no`. Cancel-safe.
    pub async fn drain(&mut self, max_batch: usize) -> Option<Vec<CallEvent>> {
        let first = self.next_event().await?;
        let mut batch = vec![first];
        self.fill(&mut batch, max_batch.max(1));
        order_batch(&mut batch);
        Some(batch)
    }

    /// Take up to `max_batch` already-buffered events without waiting.
    pub fn try_drain(&mut self, max_batch: usize) -> Vec<CallEvent> {
        let mut batch = Vec::new();
        self.fill(&mut batch, max_batch.max(1));
        order_batch(&mut batch);
        batch
    }

    pub fn counters(&self) -> QueueCounters {
        self.stats.snapshot()
    }

    fn fill(&mut self, batch: &mut Vec<CallEvent>, max_batch: usize) {
        while batch.len() < max_batch {
            match self.rx.try_recv() {
                Ok(event) => batch.push(event),
                Err(_) => break,
            }
        }
    }

    async fn next_event(&mut self) -> Option<CallEvent> {
        if !self.closing && *self.shutdown.borrow() {
            self.begin_close();
        }
        if self.closing {
            return self.rx.recv().await;
        }

        let wake = tokio::select! {
            biased;
            event = self.rx.recv() => Wake::Event(event),
            _ = self.shutdown.changed() => Wake::Shutdown,
        };

        match wake {
            Wake::Event(event) => event,
            Wake::Shutdown => {
                self.begin_close();
                self.rx.recv().await
            }
        }
    }

    fn begin_close(&mut self) {
        tracing::debug!("Event queue shutting down, draining buffered events");
        self.closing = true;
        self.rx.close();
    }
}

fn order_batch(batch: &mut [CallEvent]) {
    batch.sort_by_key(|e| (e.session_id, e.sequence_no));
}
