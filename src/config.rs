//! Effective writer configuration for the CLI.
//!
//! Settings come from an optional YAML file first; any flag given on the
//! command line overrides the file.

mod duration;

use anyhow::Context;
use bulk_writer::WriterConfig;

pub use duration::parse_duration;

use crate::WriterArgs;

/// Build the writer configuration from `--config` plus flag overrides.
pub fn writer_config(args: &WriterArgs) -> anyhow::Result<WriterConfig> {
    let mut config = match &args.config {
        Some(path) => WriterConfig::from_file(path)
            .with_context(|| format!("Failed to load writer config from {path:?}"))?,
        None => WriterConfig::default(),
    };

    if let Some(index) = &args.index {
        config.index = index.clone();
    }
    if let Some(doc_type) = &args.doc_type {
        config.doc_type = doc_type.clone();
    }
    if !args.collections.is_empty() {
        config.collections = args.collections.clone();
    }
    if let Some(items) = args.max_batch_items {
        config.max_batch_items = items;
    }
    if let Some(bytes) = args.max_batch_bytes {
        config.max_batch_bytes = bytes;
    }
    if let Some(age) = &args.max_batch_age {
        config.max_batch_age_ms = millis(age, "--max-batch-age")?;
    }
    if let Some(drain) = &args.drain_wait {
        config.drain_wait_ms = millis(drain, "--drain-wait")?;
    }
    if args.very_large_bulk {
        config.very_large_bulk = true;
    }
    if let Some(interval) = &args.restore_refresh_interval {
        config.restore_refresh_interval = interval.clone();
    }
    if args.refresh_on_close {
        config.refresh_on_close = true;
    }
    if !args.exclude_fields.is_empty() {
        config.exclude_fields = args.exclude_fields.clone();
    }
    if args.hoist_additional_properties {
        config.hoist_additional_properties = true;
    }

    config.validate()?;
    Ok(config)
}

fn millis(value: &str, flag: &str) -> anyhow::Result<u64> {
    let duration = parse_duration(value).with_context(|| format!("Invalid {flag}"))?;
    Ok(duration.as_millis() as u64)
}
