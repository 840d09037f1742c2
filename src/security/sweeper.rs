//! Periodic garbage collection for the in-memory security stores.
//!
//! Expired rate-limit windows and CSRF tokens are only removed lazily on the
//! request path; a sweeper bounds memory for callers that never come back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::observability::metrics;
use crate::security::now_millis;

/// A store that can drop its expired entries.
pub trait Sweepable: Send + Sync {
    /// Store name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Remove everything expired at `now` (ms since epoch); returns the count removed.
    fn sweep(&self, now: u64) -> usize;

    /// Number of live entries.
    fn size(&self) -> usize;
}

/// Background task sweeping one store at a fixed interval.
pub struct Sweeper {
    store: Arc<dyn Sweepable>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(store: Arc<dyn Sweepable>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run a single pass.
    pub fn sweep_once(&self, now: u64) -> usize {
        let removed = self.store.sweep(now);
        let remaining = self.store.size();
        metrics::record_store_size(self.store.name(), remaining);

        if removed > 0 {
            tracing::debug!(store = self.store.name(), removed, remaining, "Swept expired entries");
        }
        removed
    }

    /// Sweep until the shutdown signal fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            store = self.store.name(),
            interval_secs = self.interval.as_secs(),
            "Sweeper starting"
        );

        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once(now_millis());
                }
                _ = shutdown.recv() => {
                    tracing::info!(store = self.store.name(), "Sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Spawn onto the runtime.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
