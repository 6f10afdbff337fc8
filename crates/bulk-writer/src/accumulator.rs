//! Batch accumulation and flush triggers.
//!
//! The accumulator is plain synchronous state. The writer keeps it behind a
//! mutex and every producer append, timer tick and forced flush goes through
//! that one lock, so a batch is swapped out exactly once.

use std::fmt;
use std::mem;
use std::time::Duration;

use doc_store::WriteRequest;
use tokio::time::Instant;

use crate::batch::{Batch, FrozenBatch};
use crate::config::WriterConfig;

/// Thresholds that end the current batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    pub max_items: usize,
    pub max_bytes: usize,
    pub max_age: Duration,
}

impl From<&WriterConfig> for FlushPolicy {
    fn from(config: &WriterConfig) -> Self {
        Self {
            max_items: config.max_batch_items,
            max_bytes: config.max_batch_bytes,
            max_age: config.max_batch_age(),
        }
    }
}

/// Which condition caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Bytes,
    Items,
    Age,
    Forced,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes => write!(f, "bytes"),
            Self::Items => write!(f, "items"),
            Self::Age => write!(f, "age"),
            Self::Forced => write!(f, "forced"),
        }
    }
}

#[derive(Debug)]
pub struct Accumulator {
    batch: Batch,
    last_flush: Instant,
    policy: FlushPolicy,
}

impl Accumulator {
    pub fn new(policy: FlushPolicy, now: Instant) -> Self {
        Self {
            batch: Batch::new(now),
            last_flush: now,
            policy,
        }
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.batch.size_bytes()
    }

    /// Append a request and return the batch if a trigger now fires.
    pub fn push(
        &mut self,
        request: WriteRequest,
        now: Instant,
    ) -> Option<(FrozenBatch, FlushTrigger)> {
        self.batch.push(request);
        self.poll(now)
    }

    /// Evaluate the triggers without adding anything.
    pub fn poll(&mut self, now: Instant) -> Option<(FrozenBatch, FlushTrigger)> {
        let trigger = self.due(now)?;
        Some((self.swap(now), trigger))
    }

    /// Freeze the current batch regardless of thresholds, if it has anything.
    pub fn take(&mut self, now: Instant) -> Option<FrozenBatch> {
        if self.batch.is_empty() {
            return None;
        }
        Some(self.swap(now))
    }

    fn due(&self, now: Instant) -> Option<FlushTrigger> {
        if self.batch.is_empty() {
            return None;
        }
        if self.batch.size_bytes() >= self.policy.max_bytes {
            Some(FlushTrigger::Bytes)
        } else if self.batch.len() >= self.policy.max_items {
            Some(FlushTrigger::Items)
        } else if now.saturating_duration_since(self.last_flush) >= self.policy.max_age {
            Some(FlushTrigger::Age)
        } else {
            None
        }
    }

    fn swap(&mut self, now: Instant) -> FrozenBatch {
        self.last_flush = now;
        mem::replace(&mut self.batch, Batch::new(now)).freeze()
    }
}
