//! Batch submission and reconciliation.

use std::sync::Arc;

use doc_store::DocumentStore;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::accumulator::FlushTrigger;
use crate::backpressure::Backpressure;
use crate::batch::{BatchReport, FrozenBatch};
use crate::counters::{megabytes, Counters};

/// Submits frozen batches on their own tasks.
///
/// Callers only wait at the dispatch gate; the round trip to the store and
/// the reconciliation that follows run on a spawned task and are never
/// cancelled once started.
#[derive(Debug)]
pub struct Dispatcher<S> {
    store: Arc<S>,
    counters: Arc<Counters>,
    backpressure: Backpressure,
}

impl<S> Dispatcher<S>
where
    S: DocumentStore + 'static,
{
    pub fn new(store: Arc<S>, counters: Arc<Counters>, backpressure: Backpressure) -> Self {
        Self {
            store,
            counters,
            backpressure,
        }
    }

    /// Pass the dispatch gate, then submit the batch in the background.
    ///
    /// The returned handle resolves to the batch report once the store has
    /// answered. Dropping it does not cancel the submission.
    pub async fn dispatch(&self, batch: FrozenBatch, trigger: FlushTrigger) -> JoinHandle<BatchReport> {
        self.backpressure.dispatch_gate(&self.counters).await;

        tracing::debug!(
            "Writing to store: Items[{}] Size[{:.2} mb] Trigger[{}]",
            batch.len(),
            megabytes(batch.size_bytes() as u64),
            trigger
        );
        self.counters.record_dispatch(batch.len() as u64);

        tokio::spawn(submit(
            Arc::clone(&self.store),
            Arc::clone(&self.counters),
            batch,
        ))
    }
}

async fn submit<S>(store: Arc<S>, counters: Arc<Counters>, batch: FrozenBatch) -> BatchReport
where
    S: DocumentStore + ?Sized,
{
    let started = Instant::now();
    let result = store.bulk_submit(batch.requests()).await;
    let elapsed = started.elapsed();

    let report = match result {
        Ok(outcomes) => batch.reconcile(&outcomes),
        Err(e) => {
            // Counted as failed so the outstanding count settles and the
            // intake gate cannot stay shut on items that will never be acked.
            tracing::error!(
                "There was an error sending a batch of {} items: {e:#}",
                batch.len()
            );
            batch.fail_all()
        }
    };

    if report.failed > 0 {
        tracing::warn!(
            "Bulk uploading had {} failures of {}",
            report.failed,
            report.submitted
        );
    }
    if report.is_count_mismatch() {
        tracing::warn!(
            "Count mismatch: Sent[{}] Acknowledged[{}] Passed[{}] Failed[{}]",
            report.submitted,
            report.acknowledged,
            report.ok,
            report.failed
        );
    }

    counters.record_report(&report, elapsed);

    tracing::debug!(
        "Batch[{:.2}mb {} items with {} failures in {}ms] - Total[{:.2}mb {} items with {} failures in {:.1}s] {} outstanding",
        megabytes(report.size_bytes),
        report.ok,
        report.failed,
        elapsed.as_millis(),
        megabytes(counters.total_bytes()),
        counters.total_ok(),
        counters.total_failed(),
        counters.total_elapsed().as_secs_f64(),
        counters.total_outstanding()
    );

    report
}
