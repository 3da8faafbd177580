//! Periodic cleanup task.
//!
//! Holds only a weak reference to the manager, so dropping the last
//! `CacheManager` handle ends the task on its next tick.

use crate::manager::ManagerInner;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Handle to the background sweep task.
pub struct CleanupScheduler {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl CleanupScheduler {
    /// Start sweeping every `interval`. The first sweep runs one interval
    /// after start, not immediately.
    ///
    /// Must be called inside a tokio runtime. `interval` must be non-zero.
    pub(crate) fn spawn(manager: Weak<ManagerInner>, interval: Duration) -> Self {
        let (shutdown, mut signal) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            // a slow sweep must not be followed by a burst of catch-up sweeps
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            debug!("Cleanup scheduler started (every {:?})", interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(inner) = manager.upgrade() else {
                            debug!("Cache manager dropped, cleanup scheduler exiting");
                            break;
                        };
                        let report = inner.run_cleanup().await;
                        debug!(
                            "Scheduled cleanup: {} expired, {} evicted, {} skipped",
                            report.expired(),
                            report.evicted(),
                            report.skipped.len()
                        );
                    }
                    changed = signal.changed() => {
                        if changed.is_err() || *signal.borrow() {
                            debug!("Cleanup scheduler stopped");
                            break;
                        }
                    }
                }
            }
        });

        CleanupScheduler {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Signal the task and wait for it; an in-flight sweep completes first.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Cleanup scheduler ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
