//! JSON Lines input.
//!
//! Each non-blank line is one datum. A line holding an object with a
//! `document` key is read as an envelope:
//!
//! ```json
//! {"document": {"text": "hi"}, "metadata": {"index": "tweets", "id": "1"}, "timestamp": "2024-05-01T12:00:00Z"}
//! ```
//!
//! Any other JSON value is taken as the document itself, with no metadata.

use std::path::Path;

use anyhow::Context;
use bulk_writer::{BulkWriter, Datum, Document};
use chrono::{DateTime, Utc};
use doc_store::DocumentStore;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

const ENVELOPE_KEY: &str = "document";

#[derive(Debug, Deserialize)]
struct Envelope {
    document: Option<Value>,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// Lines read from one input.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadStats {
    pub lines: u64,
    pub written: u64,
    pub skipped: u64,
}

/// Parse one line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> anyhow::Result<Option<Datum>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(line).context("Failed to parse JSON line")?;
    let is_envelope = value
        .as_object()
        .is_some_and(|object| object.contains_key(ENVELOPE_KEY));
    if !is_envelope {
        return Ok(Some(Datum::new(value)));
    }

    let envelope: Envelope =
        serde_json::from_value(value).context("Failed to parse datum envelope")?;
    // A string document is raw JSON text, parsed later by the writer.
    let document = envelope.document.map(|document| match document {
        Value::String(text) => Document::Text(text),
        other => Document::Json(other),
    });

    Ok(Some(Datum {
        document,
        metadata: envelope.metadata,
        timestamp: envelope.timestamp,
    }))
}

/// Feed every line of `reader` to `writer`.
///
/// Malformed lines are logged and skipped. Only writer errors stop the read.
pub async fn write_lines<R, S>(
    reader: R,
    source: &str,
    writer: &BulkWriter<S>,
) -> anyhow::Result<ReadStats>
where
    R: AsyncBufRead + Unpin,
    S: DocumentStore + 'static,
{
    let mut stats = ReadStats::default();
    let mut lines = reader.lines();

    while let Some(line) = lines
        .next_line()
        .await
        .with_context(|| format!("Failed to read from {source}"))?
    {
        stats.lines += 1;
        match parse_line(&line) {
            Ok(Some(datum)) => {
                writer.write(datum).await?;
                stats.written += 1;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Skipping {source} line {}: {e:#}", stats.lines);
                stats.skipped += 1;
            }
        }

        if stats.lines % 10_000 == 0 {
            tracing::info!("Read {} lines from {source}", stats.lines);
        }
    }

    Ok(stats)
}

/// Feed a JSON Lines file to `writer`.
pub async fn write_file<S>(path: &Path, writer: &BulkWriter<S>) -> anyhow::Result<ReadStats>
where
    S: DocumentStore + 'static,
{
    let file = File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let source = path.display().to_string();

    let stats = write_lines(BufReader::new(file), &source, writer).await?;
    tracing::info!(
        "Finished {source}: {} lines, {} written, {} skipped",
        stats.lines,
        stats.written,
        stats.skipped
    );
    Ok(stats)
}
