//! Errors surfaced by the writer.
//!
//! Only conditions that leave a write with nowhere to go are errors. Bad
//! records, rejected items and transport failures are logged and counted
//! instead.

/// Error type for [`crate::BulkWriter`] operations.
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    /// The target collection does not exist and could not be created
    #[error("Unable to create collection '{collection}': {source:#}")]
    IndexCreation {
        collection: String,
        #[source]
        source: anyhow::Error,
    },

    /// Invalid writer configuration
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// The writer has already been closed
    #[error("writer is closed")]
    Closed,
}
