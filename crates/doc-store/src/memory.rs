//! In-memory [`DocumentStore`] used by tests and dry runs.
//!
//! Nothing leaves the process. Every accepted request is kept so callers can
//! inspect what arrived, and a handful of knobs inject the failure modes the
//! writer has to cope with (slow acks, transport errors, rejected items,
//! refused creations, short acknowledgment lists).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{bail, Result};

use crate::request::{CreateAck, ItemOutcome, WriteRequest};
use crate::traits::DocumentStore;

#[derive(Debug, Default)]
struct Collection {
    documents: Vec<WriteRequest>,
    settings: HashMap<String, String>,
    refreshes: u64,
}

#[derive(Debug, Default)]
struct State {
    collections: BTreeMap<String, Collection>,
    batch_sizes: Vec<usize>,
    create_calls: u64,
    latency: Duration,
    admin_latency: Duration,
    unavailable: bool,
    refuse_create: bool,
    rejected_ids: HashSet<String>,
    ack_shortfall: usize,
}

/// A store that keeps everything in a shared map.
///
/// Clones share state, so a test can hand one clone to the writer and keep
/// another to assert against.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delay every bulk submission by `latency` before acknowledging.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// Delay exists/create calls by `latency`.
    pub fn set_admin_latency(&self, latency: Duration) {
        self.state().admin_latency = latency;
    }

    /// Make bulk submissions fail at the transport level.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Answer creation requests with [`CreateAck::NotAcknowledged`].
    pub fn set_refuse_create(&self, refuse: bool) {
        self.state().refuse_create = refuse;
    }

    /// Report a per-item failure for any request carrying this id.
    pub fn reject_id(&self, id: impl Into<String>) {
        self.state().rejected_ids.insert(id.into());
    }

    /// Drop the last `n` outcomes from every acknowledgment list.
    pub fn set_ack_shortfall(&self, n: usize) {
        self.state().ack_shortfall = n;
    }

    /// Pre-create a collection as if another process had done it.
    pub fn insert_collection(&self, name: impl Into<String>) {
        self.state().collections.entry(name.into()).or_default();
    }

    /// Sizes of every batch received, in arrival order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state().batch_sizes.clone()
    }

    /// Number of `create` calls received, including refused ones.
    pub fn create_calls(&self) -> u64 {
        self.state().create_calls
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.state().collections.keys().cloned().collect()
    }

    /// Documents accepted into a collection, in arrival order.
    pub fn documents(&self, collection: &str) -> Vec<WriteRequest> {
        self.state()
            .collections
            .get(collection)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }

    pub fn setting(&self, collection: &str, key: &str) -> Option<String> {
        self.state()
            .collections
            .get(collection)
            .and_then(|c| c.settings.get(key).cloned())
    }

    pub fn refresh_count(&self, collection: &str) -> u64 {
        self.state()
            .collections
            .get(collection)
            .map(|c| c.refreshes)
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryStore {
    async fn exists(&self, collection: &str) -> Result<bool> {
        let latency = self.state().admin_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(self.state().collections.contains_key(collection))
    }

    async fn create(&self, collection: &str) -> Result<CreateAck> {
        let latency = self.state().admin_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        state.create_calls += 1;
        if state.refuse_create {
            return Ok(CreateAck::NotAcknowledged);
        }
        if state.collections.contains_key(collection) {
            return Ok(CreateAck::AlreadyExists);
        }
        state
            .collections
            .insert(collection.to_string(), Collection::default());
        tracing::trace!("Created in-memory collection {collection}");
        Ok(CreateAck::Created)
    }

    async fn bulk_submit(&self, requests: &[WriteRequest]) -> Result<Vec<ItemOutcome>> {
        let latency = self.state().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        if state.unavailable {
            bail!("in-memory store is unavailable");
        }
        state.batch_sizes.push(requests.len());

        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            let rejected = request
                .id()
                .is_some_and(|id| state.rejected_ids.contains(id));
            if rejected {
                outcomes.push(ItemOutcome::failed(format!(
                    "document {:?} rejected",
                    request.id()
                )));
                continue;
            }
            state
                .collections
                .entry(request.collection().to_string())
                .or_default()
                .documents
                .push(request.clone());
            outcomes.push(ItemOutcome::Ok);
        }

        let keep = outcomes.len().saturating_sub(state.ack_shortfall);
        outcomes.truncate(keep);
        Ok(outcomes)
    }

    async fn update_setting(&self, collection: &str, key: &str, value: &str) -> Result<()> {
        self.state()
            .collections
            .entry(collection.to_string())
            .or_default()
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn refresh(&self, collection: &str) -> Result<()> {
        self.state()
            .collections
            .entry(collection.to_string())
            .or_default()
            .refreshes += 1;
        Ok(())
    }
}
