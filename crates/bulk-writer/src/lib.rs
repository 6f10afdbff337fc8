//! Bounded-memory asynchronous bulk writer for document stores.
//!
//! Producers hand [`Datum`]s to a [`BulkWriter`], which enriches them into
//! write requests, groups them into batches by size, count and age, and
//! submits each batch to a [`doc_store::DocumentStore`] without waiting for
//! the previous one to be acknowledged. Two soft gates keep memory bounded
//! when the store falls behind.

pub mod accumulator;
pub mod backpressure;
pub mod batch;
pub mod config;
pub mod counters;
pub mod datum;
pub mod dispatcher;
pub mod error;
pub mod index;
pub mod writer;

pub use accumulator::{Accumulator, FlushPolicy, FlushTrigger};
pub use backpressure::{Backpressure, GateOutcome};
pub use batch::{Batch, BatchReport, FrozenBatch};
pub use config::{ConfigError, WriterConfig};
pub use counters::{Counters, CountersSnapshot};
pub use datum::{Datum, Document, EnrichError, Enricher};
pub use dispatcher::Dispatcher;
pub use error::WriterError;
pub use index::IndexRegistry;
pub use writer::BulkWriter;
