//! Process-wide write tallies.
//!
//! Each counter only ever grows and is updated on its own; derived values
//! such as the outstanding count are computed on read and never stored.
//! Every reconciliation pings a [`Notify`] so backpressure waits can sleep
//! until something changes instead of polling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::batch::BatchReport;

#[derive(Debug, Default)]
pub struct Counters {
    total_sent: AtomicU64,
    total_ok: AtomicU64,
    total_failed: AtomicU64,
    total_bytes: AtomicU64,
    total_elapsed_ms: AtomicU64,
    batches_sent: AtomicU64,
    batches_responded: AtomicU64,
    changed: Notify,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a batch about to be submitted.
    pub fn record_dispatch(&self, items: u64) {
        self.total_sent.fetch_add(items, Ordering::SeqCst);
        self.batches_sent.fetch_add(1, Ordering::SeqCst);
    }

    /// Account for a reconciled batch and wake anyone waiting on the counters.
    pub fn record_report(&self, report: &BatchReport, elapsed: Duration) {
        self.total_ok.fetch_add(report.ok, Ordering::SeqCst);
        self.total_failed.fetch_add(report.failed, Ordering::SeqCst);
        self.total_bytes.fetch_add(report.size_bytes, Ordering::SeqCst);
        self.total_elapsed_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::SeqCst);
        self.batches_responded.fetch_add(1, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    pub fn total_sent(&self) -> u64 {
        self.total_sent.load(Ordering::SeqCst)
    }

    pub fn total_ok(&self) -> u64 {
        self.total_ok.load(Ordering::SeqCst)
    }

    pub fn total_failed(&self) -> u64 {
        self.total_failed.load(Ordering::SeqCst)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::SeqCst)
    }

    pub fn total_elapsed(&self) -> Duration {
        Duration::from_millis(self.total_elapsed_ms.load(Ordering::SeqCst))
    }

    pub fn batches_sent(&self) -> u64 {
        self.batches_sent.load(Ordering::SeqCst)
    }

    pub fn batches_responded(&self) -> u64 {
        self.batches_responded.load(Ordering::SeqCst)
    }

    /// Items sent but not yet acknowledged either way.
    pub fn total_outstanding(&self) -> u64 {
        // Acknowledgments are read before `total_sent`: items are counted as
        // sent before they can be acknowledged, so the later read is never
        // smaller.
        let acknowledged = self.total_ok() + self.total_failed();
        self.total_sent().saturating_sub(acknowledged)
    }

    /// Batches submitted but not yet reconciled.
    pub fn batches_in_flight(&self) -> u64 {
        let responded = self.batches_responded();
        self.batches_sent().saturating_sub(responded)
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let total_ok = self.total_ok();
        let total_failed = self.total_failed();
        let batches_responded = self.batches_responded();
        let total_sent = self.total_sent();
        CountersSnapshot {
            total_sent,
            total_ok,
            total_failed,
            total_outstanding: total_sent.saturating_sub(total_ok + total_failed),
            total_bytes: self.total_bytes(),
            total_elapsed_secs: self.total_elapsed().as_secs_f64(),
            batches_sent: self.batches_sent(),
            batches_responded,
        }
    }

    /// Wait until `done` holds or `budget` runs out.
    ///
    /// Re-evaluates `done` after every reconciliation. Returns whether the
    /// condition held when the wait ended.
    pub async fn wait_until<F>(&self, budget: Duration, mut done: F) -> bool
    where
        F: FnMut(&Self) -> bool,
    {
        let deadline = Instant::now() + budget;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register before checking so a reconciliation landing in between
            // is not missed.
            notified.as_mut().enable();

            if done(self) {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return done(self);
            }
        }
    }
}

/// Point-in-time copy of the counters, for health checks and final reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CountersSnapshot {
    pub total_sent: u64,
    pub total_ok: u64,
    pub total_failed: u64,
    pub total_outstanding: u64,
    pub total_bytes: u64,
    pub total_elapsed_secs: f64,
    pub batches_sent: u64,
    pub batches_responded: u64,
}

pub(crate) fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
