//! bulkwrite library
//!
//! Command-line plumbing around the `bulk-writer` engine: connection and
//! writer flags, the effective configuration, and JSON Lines input.
//!
//! # CLI Usage
//!
//! ```bash
//! # Load two files into SurrealDB, batching 500 documents at a time
//! bulkwrite jsonl --path a.jsonl --path b.jsonl \
//!   --to-namespace test --to-database test \
//!   --index tweets --max-batch-items 500
//!
//! # Same, without a server
//! bulkwrite jsonl --path a.jsonl --dry-run
//! ```

use std::path::PathBuf;

use clap::Parser;

pub mod config;
pub mod load;
pub mod source;

#[derive(Parser, Clone, Debug)]
pub struct SurrealArgs {
    /// SurrealDB endpoint URL
    #[arg(
        long,
        default_value = "ws://localhost:8000",
        env = "SURREAL_ENDPOINT"
    )]
    pub surreal_endpoint: String,

    /// SurrealDB username
    #[arg(long, default_value = "root", env = "SURREAL_USERNAME")]
    pub surreal_username: String,

    /// SurrealDB password
    #[arg(long, default_value = "root", env = "SURREAL_PASSWORD")]
    pub surreal_password: String,

    /// Target SurrealDB namespace
    #[arg(long, default_value = "test")]
    pub to_namespace: String,

    /// Target SurrealDB database
    #[arg(long, default_value = "test")]
    pub to_database: String,

    /// Dry run mode - write into an in-memory store instead
    #[arg(long)]
    pub dry_run: bool,
}

impl From<&SurrealArgs> for surreal_store::SurrealOpts {
    fn from(args: &SurrealArgs) -> Self {
        Self {
            endpoint: args.surreal_endpoint.clone(),
            username: args.surreal_username.clone(),
            password: args.surreal_password.clone(),
            namespace: args.to_namespace.clone(),
            database: args.to_database.clone(),
        }
    }
}

/// Writer settings. Flags override values from `--config`.
#[derive(Parser, Clone, Debug, Default)]
pub struct WriterArgs {
    /// YAML file with writer settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Collection for documents whose metadata names none
    #[arg(long)]
    pub index: Option<String>,

    /// Document type for documents whose metadata names none
    #[arg(long)]
    pub doc_type: Option<String>,

    /// Collections to prepare up front (repeatable)
    #[arg(long = "collection", value_name = "NAME")]
    pub collections: Vec<String>,

    /// Flush after this many documents
    #[arg(long)]
    pub max_batch_items: Option<usize>,

    /// Flush after this many payload bytes
    #[arg(long)]
    pub max_batch_bytes: Option<usize>,

    /// Flush after this long since the previous flush (e.g. "500ms", "10s")
    #[arg(long)]
    pub max_batch_age: Option<String>,

    /// How long to wait for acknowledgments when finishing (e.g. "5m")
    #[arg(long)]
    pub drain_wait: Option<String>,

    /// Disable collection refresh while loading
    #[arg(long)]
    pub very_large_bulk: bool,

    /// Refresh interval restored after a very large bulk load
    #[arg(long)]
    pub restore_refresh_interval: Option<String>,

    /// Refresh every written collection when finished
    #[arg(long)]
    pub refresh_on_close: bool,

    /// Top-level document field to drop (repeatable)
    #[arg(long = "exclude-field", value_name = "FIELD")]
    pub exclude_fields: Vec<String>,

    /// Merge nested `additionalProperties` objects into their parent
    #[arg(long)]
    pub hoist_additional_properties: bool,
}

#[derive(Parser, Clone, Debug)]
pub struct JsonlArgs {
    /// JSON Lines file to load (repeatable)
    #[arg(long = "path", value_name = "FILE", required = true)]
    pub paths: Vec<PathBuf>,

    #[command(flatten)]
    pub surreal: SurrealArgs,

    #[command(flatten)]
    pub writer: WriterArgs,
}
