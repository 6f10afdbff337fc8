//! SurrealDB document store.
//!
//! Implements `doc_store::DocumentStore` on top of a SurrealDB v2 connection.
//! Collections map to tables, a bulk submission becomes one multi-statement
//! query, and per-statement errors become per-item failures.

mod connect;
mod store;

pub use connect::{surreal_connect, surreal_connect_with_retries, SurrealOpts};
pub use store::SurrealStore;

pub use surrealdb::engine::any::Any as SurrealEngine;
pub use surrealdb::Surreal;
