use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::manager::SyncQueueManager;

/// Wakes a running `FlushWorker` ahead of its next tick.
#[derive(Debug, Clone, Default)]
pub struct FlushTrigger {
    notify: Arc<Notify>,
}

impl FlushTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connectivity_restored(&self) {
        self.notify.notify_one();
    }
}

/// Periodic flusher. Flushes once on start, then on every tick or trigger,
/// until the shutdown channel reads `true` or its sender goes away.
pub struct FlushWorker {
    manager: SyncQueueManager,
    interval: Duration,
    trigger: FlushTrigger,
}

impl FlushWorker {
    pub fn new(manager: SyncQueueManager, interval: Duration) -> Self {
        Self {
            manager,
            interval,
            trigger: FlushTrigger::new(),
        }
    }

    pub fn trigger(&self) -> FlushTrigger {
        self.trigger.clone()
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<usize> {
        tokio::spawn(self.run(shutdown))
    }

    /// Returns how many flushes ran.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> usize {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut runs = 0;

        info!(interval_secs = self.interval.as_secs(), "flush worker started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
                _ = self.trigger.notify.notified() => {
                    debug!("flush triggered");
                }
            }

            let report = self.manager.flush().await;
            runs += 1;
            debug!(
                synced = report.synced,
                still_pending = report.still_pending,
                failed_terminal = report.failed_terminal,
                deferred = report.deferred_no_connectivity,
                "worker flush complete"
            );
        }

        info!(runs, "flush worker stopped");
        runs
    }
}
