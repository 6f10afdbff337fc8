//! DocumentStore trait definition.
//!
//! The trait is the whole contract the bulk writer needs from a downstream
//! store: existence checks, idempotent creation, bulk submission with
//! per-item outcomes, and the two visibility knobs used by bulk loads.

use anyhow::Result;

use crate::request::{CreateAck, ItemOutcome, WriteRequest};

/// Setting key toggled by very-large-bulk mode.
pub const REFRESH_INTERVAL_SETTING: &str = "refresh_interval";

/// Trait for writing documents to a remote store.
///
/// # Usage Pattern
///
/// The writer is generic over the store so calls are statically dispatched:
///
/// ```ignore
/// let writer = BulkWriter::start(Arc::new(store), config, registry).await?;
/// writer.write(datum).await?;
/// ```
///
/// The CLI entry point picks a store once and everything downstream is
/// monomorphized for it.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Return whether the named collection already exists.
    async fn exists(&self, collection: &str) -> Result<bool>;

    /// Create the named collection.
    ///
    /// Implementations report a lost creation race as
    /// [`CreateAck::AlreadyExists`] rather than an error.
    async fn create(&self, collection: &str) -> Result<CreateAck>;

    /// Submit a batch of write requests.
    ///
    /// An `Err` means the batch never reached the store (transport failure)
    /// and no per-item outcome exists. On `Ok`, outcome `i` belongs to
    /// request `i`.
    async fn bulk_submit(&self, requests: &[WriteRequest]) -> Result<Vec<ItemOutcome>>;

    /// Update a per-collection setting such as [`REFRESH_INTERVAL_SETTING`].
    async fn update_setting(&self, collection: &str, key: &str, value: &str) -> Result<()>;

    /// Make everything written to the collection visible to readers.
    async fn refresh(&self, collection: &str) -> Result<()>;
}
