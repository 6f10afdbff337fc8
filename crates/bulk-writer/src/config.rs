//! Writer configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default byte threshold that forces a flush (5 MiB).
pub const DEFAULT_MAX_BATCH_BYTES: usize = 5 * 1024 * 1024;
/// Default item threshold that forces a flush.
pub const DEFAULT_MAX_BATCH_ITEMS: usize = 100;
/// A document should wait no longer than this before it is flushed.
pub const DEFAULT_MAX_BATCH_AGE_MS: u64 = 10_000;
/// Outstanding items allowed per configured batch item before intake slows down.
pub const HIGH_WATER_BATCHES: u64 = 25;
/// Refresh interval put back on collections after a very large bulk load.
pub const DEFAULT_RESTORE_REFRESH_INTERVAL: &str = "5s";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Error reading the configuration file
    #[error("Failed to read writer config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Error parsing YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A value is outside its allowed range
    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Configuration for a [`crate::BulkWriter`].
///
/// Every field has a default, so a YAML file only needs to name the values it
/// overrides:
///
/// ```yaml
/// index: tweets
/// max_batch_items: 500
/// very_large_bulk: true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Collection used when a datum's metadata does not name one.
    pub index: String,

    /// Document type used when a datum's metadata does not name one.
    pub doc_type: String,

    /// Collections known up front. In very-large-bulk mode these get their
    /// refresh disabled at startup, before any document arrives.
    pub collections: Vec<String>,

    /// Flush once the current batch holds this many requests.
    pub max_batch_items: usize,

    /// Flush once the current batch payloads add up to this many bytes.
    pub max_batch_bytes: usize,

    /// Flush once this long has passed since the previous flush. Also the
    /// tick interval of the background flush timer.
    pub max_batch_age_ms: u64,

    /// Disable refresh on touched collections for the lifetime of the writer.
    pub very_large_bulk: bool,

    /// Refresh interval restored at close when `very_large_bulk` is set.
    pub restore_refresh_interval: String,

    /// Refresh every touched collection once the writer has drained.
    pub refresh_on_close: bool,

    /// Top-level document fields removed before serialization.
    pub exclude_fields: Vec<String>,

    /// Merge nested `additionalProperties` objects into their parent object.
    pub hoist_additional_properties: bool,

    /// Longest time a producer is held at the intake gate.
    pub intake_wait_ms: u64,

    /// Batches allowed in flight before new submissions wait.
    pub max_in_flight_batches: u64,

    /// Longest time a submission is held at the dispatch gate.
    pub dispatch_wait_ms: u64,

    /// Longest time `close` waits for in-flight batches to be acknowledged.
    pub drain_wait_ms: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            index: "documents".to_string(),
            doc_type: "activity".to_string(),
            collections: vec![],
            max_batch_items: DEFAULT_MAX_BATCH_ITEMS,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            max_batch_age_ms: DEFAULT_MAX_BATCH_AGE_MS,
            very_large_bulk: false,
            restore_refresh_interval: DEFAULT_RESTORE_REFRESH_INTERVAL.to_string(),
            refresh_on_close: false,
            exclude_fields: vec![],
            hoist_additional_properties: false,
            intake_wait_ms: 5_000,
            max_in_flight_batches: 5,
            dispatch_wait_ms: 60_000,
            drain_wait_ms: 5 * 60 * 1000,
        }
    }
}

impl WriterConfig {
    /// Load a configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: WriterConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that thresholds and names are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &str) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            }
        }

        if self.index.trim().is_empty() {
            return Err(invalid("index", "must not be empty"));
        }
        if self.doc_type.trim().is_empty() {
            return Err(invalid("doc_type", "must not be empty"));
        }
        if self.max_batch_items == 0 {
            return Err(invalid("max_batch_items", "must be greater than zero"));
        }
        if self.max_batch_bytes == 0 {
            return Err(invalid("max_batch_bytes", "must be greater than zero"));
        }
        if self.max_batch_age_ms == 0 {
            return Err(invalid("max_batch_age_ms", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn max_batch_age(&self) -> Duration {
        Duration::from_millis(self.max_batch_age_ms)
    }

    pub fn intake_wait(&self) -> Duration {
        Duration::from_millis(self.intake_wait_ms)
    }

    pub fn dispatch_wait(&self) -> Duration {
        Duration::from_millis(self.dispatch_wait_ms)
    }

    pub fn drain_wait(&self) -> Duration {
        Duration::from_millis(self.drain_wait_ms)
    }

    /// Outstanding item count above which intake is slowed down.
    pub fn high_water_mark(&self) -> u64 {
        self.max_batch_items as u64 * HIGH_WATER_BATCHES
    }
}
