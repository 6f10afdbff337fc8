//! JSON Lines load command.

use std::path::PathBuf;
use std::sync::Arc;

use bulk_writer::{BulkWriter, CountersSnapshot, WriterConfig};
use doc_store::{DocumentStore, InMemoryStore};
use serde::Serialize;
use surreal_store::{surreal_connect, SurrealOpts, SurrealStore};

use crate::source::{self, ReadStats};
use crate::JsonlArgs;

/// Outcome of a load, printed as JSON when the command finishes.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub files: usize,
    pub lines: u64,
    pub written: u64,
    pub skipped: u64,
    pub totals: CountersSnapshot,
}

/// Run the `jsonl` command.
pub async fn run(args: JsonlArgs) -> anyhow::Result<LoadReport> {
    let config = crate::config::writer_config(&args.writer)?;

    let report = if args.surreal.dry_run {
        tracing::info!("Running in dry-run mode - documents go to an in-memory store");
        load_files(Arc::new(InMemoryStore::new()), config, &args.paths).await?
    } else {
        let opts = SurrealOpts::from(&args.surreal);
        tracing::info!(
            "Target: {} {}/{}",
            opts.endpoint,
            opts.namespace,
            opts.database
        );
        let client = surreal_connect(&opts).await?;
        load_files(Arc::new(SurrealStore::new(client)), config, &args.paths).await?
    };

    if report.totals.total_failed > 0 || report.totals.total_outstanding > 0 {
        tracing::warn!(
            "Load finished with {} failed and {} unacknowledged documents",
            report.totals.total_failed,
            report.totals.total_outstanding
        );
    } else {
        tracing::info!("Load completed successfully");
    }
    Ok(report)
}

/// Load every file through one writer, closing it even when a file fails.
pub async fn load_files<S>(
    store: Arc<S>,
    config: WriterConfig,
    paths: &[PathBuf],
) -> anyhow::Result<LoadReport>
where
    S: DocumentStore + 'static,
{
    let writer = BulkWriter::start(store, config).await?;

    let mut read = ReadStats::default();
    let mut result = Ok(());
    for path in paths {
        match source::write_file(path, &writer).await {
            Ok(stats) => {
                read.lines += stats.lines;
                read.written += stats.written;
                read.skipped += stats.skipped;
            }
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }

    let totals = writer.close().await;
    result?;

    Ok(LoadReport {
        files: paths.len(),
        lines: read.lines,
        written: read.written,
        skipped: read.skipped,
        totals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn jsonl(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[tokio::test]
    async fn test_load_files_into_memory() {
        let first = jsonl(&[r#"{"a":1}"#, r#"{"a":2}"#]);
        let second = jsonl(&[r#"{"document":{"b":1},"metadata":{"index":"other"}}"#, "nope"]);
        let store = Arc::new(InMemoryStore::new());

        let report = load_files(
            Arc::clone(&store),
            WriterConfig {
                max_batch_items: 2,
                ..Default::default()
            },
            &[first.path().to_path_buf(), second.path().to_path_buf()],
        )
        .await
        .unwrap();

        assert_eq!(report.files, 2);
        assert_eq!(report.lines, 4);
        assert_eq!(report.written, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.totals.total_ok, 3);
        assert_eq!(store.documents("documents").len(), 2);
        assert_eq!(store.documents("other").len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_still_closes_writer() {
        let first = jsonl(&[r#"{"a":1}"#]);
        let store = Arc::new(InMemoryStore::new());

        let result = load_files(
            Arc::clone(&store),
            WriterConfig::default(),
            &[first.path().to_path_buf(), PathBuf::from("/nonexistent/input.jsonl")],
        )
        .await;

        assert!(result.is_err());
        // The document read before the failure was still flushed.
        assert_eq!(store.documents("documents").len(), 1);
    }
}
