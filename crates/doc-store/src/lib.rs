//! Document store trait abstraction.
//!
//! This crate defines the `DocumentStore` trait the bulk writer talks to,
//! along with the request and acknowledgment types that cross it. Concrete
//! stores (SurrealDB, the in-memory store) implement the trait so the writer
//! can be compiled once against a single interface.

mod memory;
mod request;
mod traits;

pub use memory::InMemoryStore;
pub use request::{CreateAck, ItemOutcome, WriteRequest};
pub use traits::{DocumentStore, REFRESH_INTERVAL_SETTING};
