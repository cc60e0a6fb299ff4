//! Periodic merge trigger.
//!
//! Sweeps the session store at a fixed interval and folds every completed
//! session into the merged graph. Sweeps run on the blocking pool so a
//! large backlog never stalls the async workers.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use flowtrace_merge::FlowMerger;
use flowtrace_session::SessionGraphStore;

pub struct MergeScheduler {
    merger: Arc<FlowMerger>,
    store: Arc<SessionGraphStore>,
    period: Duration,
}

impl MergeScheduler {
    pub fn new(merger: Arc<FlowMerger>, store: Arc<SessionGraphStore>, period: Duration) -> Self {
        Self {
            merger,
            store,
            period,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run sweeps forever; stop it by aborting the task.
    pub async fn run(self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing is stored yet.
        ticker.tick().await;

        tracing::info!(interval_secs = self.period.as_secs(), "Merge scheduler started");

        loop {
            ticker.tick().await;

            if self.store.is_empty() {
                continue;
            }

            let merger = self.merger.clone();
            let store = self.store.clone();
            match tokio::task::spawn_blocking(move || merger.merge_completed(&store)).await {
                Ok(report) if !report.failed.is_empty() => {
                    tracing::warn!(failed = report.failed.len(), "Scheduled merge sweep had failures");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Scheduled merge sweep panicked"),
            }
        }
    }
}
