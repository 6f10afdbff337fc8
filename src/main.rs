//! Command-line interface for bulkwrite
//!
//! # Usage Examples
//!
//! ```bash
//! # Load JSON Lines into SurrealDB
//! bulkwrite jsonl --path tweets.jsonl \
//!   --surreal-endpoint ws://localhost:8000 \
//!   --to-namespace test --to-database test \
//!   --index tweets --max-batch-items 500 --max-batch-age 5s
//!
//! # Large one-off import with refresh disabled while loading
//! bulkwrite jsonl --path dump.jsonl --config writer.yaml --very-large-bulk
//!
//! # Print the effective writer settings
//! bulkwrite config --config writer.yaml --max-batch-items 1000
//! ```
//!
//! Set `RUST_LOG=info` (or `debug` for per-batch detail) to see progress.

use bulkwrite::{JsonlArgs, WriterArgs};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bulkwrite")]
#[command(about = "Bulk load JSON documents into a document store")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load JSON Lines files
    Jsonl(JsonlArgs),

    /// Validate and print the effective writer configuration as YAML
    Config(WriterArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Jsonl(args) => {
            let report = bulkwrite::load::run(args).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Config(args) => {
            let config = bulkwrite::config::writer_config(&args)?;
            print!("{}", serde_yaml::to_string(&config)?);
        }
    }

    Ok(())
}
