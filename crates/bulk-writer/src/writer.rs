//! The bulk writer.
//!
//! [`BulkWriter`] ties the pieces together: producers call [`BulkWriter::write`]
//! concurrently, each datum passes the intake gate, is enriched, has its
//! collection verified and lands in the shared accumulator. Whoever trips a
//! flush trigger (a producer or the background timer) takes the frozen batch
//! out of the lock and hands it to the dispatcher.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use doc_store::{DocumentStore, WriteRequest, REFRESH_INTERVAL_SETTING};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::accumulator::{Accumulator, FlushPolicy, FlushTrigger};
use crate::backpressure::{self, Backpressure, GateOutcome};
use crate::batch::FrozenBatch;
use crate::config::WriterConfig;
use crate::counters::{Counters, CountersSnapshot};
use crate::datum::{Datum, EnrichError, Enricher};
use crate::dispatcher::Dispatcher;
use crate::error::WriterError;
use crate::index::IndexRegistry;

const REFRESH_DISABLED: &str = "-1";

pub struct BulkWriter<S: DocumentStore + 'static> {
    shared: Arc<Shared<S>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

struct Shared<S: DocumentStore + 'static> {
    config: WriterConfig,
    store: Arc<S>,
    enricher: Enricher,
    accumulator: Mutex<Accumulator>,
    registry: Arc<IndexRegistry>,
    touched: Mutex<BTreeSet<String>>,
    counters: Arc<Counters>,
    backpressure: Backpressure,
    dispatcher: Dispatcher<S>,
    closed: AtomicBool,
    /// Held shared by every append from the closed check until its batch
    /// (if any) is recorded as dispatched; `close` takes it exclusively.
    ingest: RwLock<()>,
}

impl<S: DocumentStore + 'static> BulkWriter<S> {
    /// Start a writer with its own collection registry.
    pub async fn start(store: Arc<S>, config: WriterConfig) -> Result<Self, WriterError> {
        Self::start_with_registry(store, config, Arc::new(IndexRegistry::new())).await
    }

    /// Start a writer that shares `registry` with other writers, so each
    /// collection is verified once across all of them.
    ///
    /// Must be called from within a tokio runtime; the flush timer is
    /// spawned here.
    pub async fn start_with_registry(
        store: Arc<S>,
        config: WriterConfig,
        registry: Arc<IndexRegistry>,
    ) -> Result<Self, WriterError> {
        config.validate()?;

        let counters = Arc::new(Counters::new());
        let backpressure = Backpressure::new(&config);
        let shared = Arc::new(Shared {
            enricher: Enricher::new(&config),
            accumulator: Mutex::new(Accumulator::new(
                FlushPolicy::from(&config),
                Instant::now(),
            )),
            dispatcher: Dispatcher::new(
                Arc::clone(&store),
                Arc::clone(&counters),
                backpressure.clone(),
            ),
            config,
            store,
            registry,
            touched: Mutex::new(BTreeSet::new()),
            counters,
            backpressure,
            closed: AtomicBool::new(false),
            ingest: RwLock::new(()),
        });

        if shared.config.very_large_bulk {
            let mut upfront: BTreeSet<String> = shared.config.collections.iter().cloned().collect();
            upfront.insert(shared.config.index.clone());
            for collection in &upfront {
                shared.touch(collection).await?;
            }
        }

        let shutdown = CancellationToken::new();
        let timer = spawn_flush_timer(Arc::clone(&shared), shutdown.clone());

        tracing::info!(
            "Bulk writer started: index={} max_batch_items={} max_batch_bytes={} max_batch_age={:?} very_large_bulk={}",
            shared.config.index,
            shared.config.max_batch_items,
            shared.config.max_batch_bytes,
            shared.config.max_batch_age(),
            shared.config.very_large_bulk
        );

        Ok(Self {
            shared,
            timer: Mutex::new(Some(timer)),
            shutdown,
        })
    }

    /// Accept one datum.
    ///
    /// Records that cannot be turned into a write request are logged and
    /// dropped; only a collection that cannot be created is an error. A
    /// datum that reaches the accumulator after `close` has started is
    /// refused with [`WriterError::Closed`].
    pub async fn write(&self, datum: Datum) -> Result<(), WriterError> {
        self.ensure_open()?;

        self.shared
            .backpressure
            .intake_gate(&self.shared.counters)
            .await;
        // The gate may have held us across a close.
        self.ensure_open()?;

        let request = match self.shared.enricher.enrich(datum) {
            Ok(request) => request,
            Err(EnrichError::MissingDocument) => {
                tracing::debug!("Skipping datum without a document");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("Unable to write datum: {e}");
                return Ok(());
            }
        };

        self.shared.add(request).await
    }

    /// Accept an already built request, bypassing enrichment and the intake
    /// gate.
    pub async fn add(&self, request: WriteRequest) -> Result<(), WriterError> {
        self.ensure_open()?;
        self.shared.add(request).await
    }

    /// Send the current batch now, whatever its size or age.
    pub async fn flush(&self) {
        let _ingest = self.shared.ingest.read().await;
        self.shared.flush().await;
    }

    /// Flush, drain and finish collection housekeeping.
    ///
    /// Returns the final totals. Only the first call does any work; later
    /// calls return a fresh snapshot.
    pub async fn close(&self) -> CountersSnapshot {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return self.shared.counters.snapshot();
        }

        self.shutdown.cancel();
        let timer = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(timer) = timer {
            if let Err(e) = timer.await {
                tracing::warn!("Flush timer ended abnormally: {e}");
            }
        }

        // Wait out appends that passed the closed check before it flipped.
        // Once they are done every frozen batch has been counted as sent,
        // so the drain below sees all of them.
        let barrier = self.shared.ingest.write().await;
        self.shared.flush().await;
        drop(barrier);

        let counters = &self.shared.counters;
        match backpressure::drain(counters, self.shared.config.drain_wait()).await {
            GateOutcome::Exhausted { waited } => tracing::warn!(
                "Gave up waiting for acknowledgments after {waited:?}: {} items orphaned in {} batches",
                counters.total_outstanding(),
                counters.batches_in_flight()
            ),
            GateOutcome::Released { waited } => {
                tracing::debug!("All batches acknowledged after {waited:?}")
            }
            GateOutcome::Open => {}
        }

        if self.shared.config.very_large_bulk {
            self.shared.restore_refresh().await;
        }
        if self.shared.config.refresh_on_close {
            self.shared.refresh_touched().await;
        }

        let snapshot = counters.snapshot();
        tracing::info!(
            "Bulk writer closed: Sent[{}] Passed[{}] Failed[{}] Orphaned[{}] in {} batches",
            snapshot.total_sent,
            snapshot.total_ok,
            snapshot.total_failed,
            snapshot.total_outstanding,
            snapshot.batches_sent
        );
        snapshot
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &WriterConfig {
        &self.shared.config
    }

    pub fn counters(&self) -> &Counters {
        &self.shared.counters
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        self.shared.counters.snapshot()
    }

    pub fn total_sent(&self) -> u64 {
        self.shared.counters.total_sent()
    }

    pub fn total_ok(&self) -> u64 {
        self.shared.counters.total_ok()
    }

    pub fn total_failed(&self) -> u64 {
        self.shared.counters.total_failed()
    }

    pub fn total_outstanding(&self) -> u64 {
        self.shared.counters.total_outstanding()
    }

    pub fn total_bytes(&self) -> u64 {
        self.shared.counters.total_bytes()
    }

    pub fn total_elapsed_secs(&self) -> f64 {
        self.shared.counters.total_elapsed().as_secs_f64()
    }

    pub fn batches_sent(&self) -> u64 {
        self.shared.counters.batches_sent()
    }

    pub fn batches_responded(&self) -> u64 {
        self.shared.counters.batches_responded()
    }

    /// Requests waiting in the current, not yet flushed batch.
    pub fn pending(&self) -> usize {
        self.shared.lock_accumulator().len()
    }

    /// Collections this writer has written to or prepared, sorted.
    pub fn touched_collections(&self) -> Vec<String> {
        self.shared.touched()
    }

    fn ensure_open(&self) -> Result<(), WriterError> {
        if self.is_closed() {
            return Err(WriterError::Closed);
        }
        Ok(())
    }
}

impl<S: DocumentStore + 'static> Drop for BulkWriter<S> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if !self.is_closed() {
            let pending = self.pending();
            if pending > 0 {
                tracing::warn!("Bulk writer dropped without close: {pending} requests were never sent");
            }
        }
    }
}

impl<S: DocumentStore + 'static> Shared<S> {
    async fn add(&self, request: WriteRequest) -> Result<(), WriterError> {
        let _ingest = self.ingest.read().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(WriterError::Closed);
        }

        self.touch(request.collection()).await?;

        if let Some((batch, trigger)) = self.push(request) {
            self.dispatch(batch, trigger).await;
        }
        Ok(())
    }

    async fn flush(&self) {
        let batch = self.lock_accumulator().take(Instant::now());
        if let Some(batch) = batch {
            self.dispatch(batch, FlushTrigger::Forced).await;
        }
    }

    async fn flush_due(&self) {
        let due = self.lock_accumulator().poll(Instant::now());
        if let Some((batch, trigger)) = due {
            self.dispatch(batch, trigger).await;
        }
    }

    async fn dispatch(&self, batch: FrozenBatch, trigger: FlushTrigger) {
        // Reconciliation happens on the submission task; nobody needs to
        // wait for it here.
        drop(self.dispatcher.dispatch(batch, trigger).await);
    }

    fn push(&self, request: WriteRequest) -> Option<(FrozenBatch, FlushTrigger)> {
        self.lock_accumulator().push(request, Instant::now())
    }

    fn lock_accumulator(&self) -> std::sync::MutexGuard<'_, Accumulator> {
        self.accumulator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Make sure the collection exists and remember that this writer used it.
    async fn touch(&self, collection: &str) -> Result<(), WriterError> {
        if self.is_touched(collection) {
            return Ok(());
        }

        self.registry
            .ensure_index(self.store.as_ref(), collection)
            .await?;

        if self.mark_touched(collection) && self.config.very_large_bulk {
            self.set_refresh_interval(collection, REFRESH_DISABLED).await;
        }
        Ok(())
    }

    fn is_touched(&self, collection: &str) -> bool {
        self.touched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(collection)
    }

    fn mark_touched(&self, collection: &str) -> bool {
        self.touched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection.to_string())
    }

    fn touched(&self) -> Vec<String> {
        self.touched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    async fn set_refresh_interval(&self, collection: &str, interval: &str) {
        match self
            .store
            .update_setting(collection, REFRESH_INTERVAL_SETTING, interval)
            .await
        {
            Ok(()) => tracing::info!("Set {REFRESH_INTERVAL_SETTING} of {collection} to {interval}"),
            Err(e) => tracing::warn!(
                "Unable to set {REFRESH_INTERVAL_SETTING} of {collection} to {interval}: {e:#}"
            ),
        }
    }

    async fn restore_refresh(&self) {
        let interval = self.config.restore_refresh_interval.clone();
        for collection in self.touched() {
            self.set_refresh_interval(&collection, &interval).await;
        }
    }

    async fn refresh_touched(&self) {
        for collection in self.touched() {
            match self.store.refresh(&collection).await {
                Ok(()) => tracing::debug!("Refreshed {collection}"),
                Err(e) => tracing::warn!("Unable to refresh {collection}: {e:#}"),
            }
        }
    }
}

/// Tick at the max batch age and flush the batch once it is due.
fn spawn_flush_timer<S: DocumentStore + 'static>(
    shared: Arc<Shared<S>>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = shared.config.max_batch_age();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => shared.flush_due().await,
            }
        }
        tracing::debug!("Flush timer stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_store::InMemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn config() -> WriterConfig {
        WriterConfig {
            index: "tweets".to_string(),
            max_batch_items: 3,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let result = BulkWriter::start(
            store,
            WriterConfig {
                max_batch_items: 0,
                ..config()
            },
        )
        .await;

        assert!(matches!(result, Err(WriterError::Config(_))));
    }

    #[tokio::test]
    async fn test_touch_verifies_each_collection_once() {
        let store = Arc::new(InMemoryStore::new());
        let writer = BulkWriter::start(Arc::clone(&store), config()).await.unwrap();

        for _ in 0..5 {
            writer.write(Datum::new(json!({"a": 1}))).await.unwrap();
        }

        assert_eq!(store.create_calls(), 1);
        assert_eq!(writer.touched_collections(), vec!["tweets"]);
        assert_eq!(writer.pending(), 2);
        writer.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_stops_on_close() {
        let store = Arc::new(InMemoryStore::new());
        let writer = BulkWriter::start(Arc::clone(&store), config()).await.unwrap();

        writer.close().await;
        assert!(writer.timer.lock().unwrap().is_none());
        assert!(writer.shutdown.is_cancelled());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(store.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_add_bypasses_enrichment() {
        let store = Arc::new(InMemoryStore::new());
        let writer = BulkWriter::start(Arc::clone(&store), config()).await.unwrap();

        let request = WriteRequest::new("raw", "activity", chrono::Utc::now(), "not json");
        writer.add(request).await.unwrap();
        let snapshot = writer.close().await;

        assert_eq!(snapshot.total_ok, 1);
        assert_eq!(store.documents("raw").len(), 1);
    }
}
