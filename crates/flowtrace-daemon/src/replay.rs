//! Replay a recorded event stream (one JSON `CallEvent` per line) through
//! a running pipeline.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use flowtrace_core::{CallEvent, SessionId};
use flowtrace_session::QueueError;

use crate::error::Result;
use crate::pipeline::TracePipeline;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Non-blank lines read.
    pub lines: u64,
    pub accepted: u64,
    pub malformed: u64,
    /// Distinct sessions seen; each is completed at end of input.
    pub sessions: usize,
}

/// Feed every line of `reader` into the pipeline, then complete every
/// session that appeared. Waits for queue space rather than dropping.
pub async fn replay<R>(pipeline: &TracePipeline, reader: R) -> Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
{
    let sender = pipeline.sender();
    let mut lines = reader.lines();
    let mut sessions: BTreeSet<SessionId> = BTreeSet::new();
    let mut summary = ReplaySummary::default();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.lines += 1;

        let event = match CallEvent::from_json(line) {
            Ok(event) => event,
            Err(e) => {
                summary.malformed += 1;
                tracing::warn!(line = summary.lines, error = %e, "Skipping malformed record");
                continue;
            }
        };

        let session_id = event.session_id;
        match sender.enqueue_wait(event).await {
            Ok(()) => {
                summary.accepted += 1;
                sessions.insert(session_id);
            }
            Err(QueueError::MalformedEvent(reason)) => {
                summary.malformed += 1;
                tracing::warn!(line = summary.lines, reason = %reason, "Skipping invalid record");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Replay stopped early");
                break;
            }
        }
    }

    for session_id in &sessions {
        pipeline.complete_session(*session_id);
    }
    summary.sessions = sessions.len();

    tracing::info!(
        lines = summary.lines,
        accepted = summary.accepted,
        malformed = summary.malformed,
        sessions = summary.sessions,
        "Replay finished"
    );
    Ok(summary)
}

pub async fn replay_file(pipeline: &TracePipeline, path: &Path) -> Result<ReplaySummary> {
    let file = tokio::fs::File::open(path).await?;
    replay(pipeline, BufReader::new(file)).await
}
