//! Batch types.
//!
//! A batch moves through EMPTY → ACCUMULATING → FROZEN → RECONCILED. The
//! first two states are [`Batch`], the only type with mutating methods.
//! Freezing consumes it and yields a [`FrozenBatch`], which can only be read
//! and finally consumed by reconciliation into a [`BatchReport`].

use doc_store::{ItemOutcome, WriteRequest};
use tokio::time::Instant;

/// The batch currently being filled.
#[derive(Debug)]
pub struct Batch {
    requests: Vec<WriteRequest>,
    size_bytes: usize,
    created_at: Instant,
}

impl Batch {
    pub fn new(created_at: Instant) -> Self {
        Self {
            requests: Vec::new(),
            size_bytes: 0,
            created_at,
        }
    }

    /// Append a request, keeping the byte total in step with the members.
    pub fn push(&mut self, request: WriteRequest) {
        self.size_bytes += request.payload_len();
        self.requests.push(request);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn freeze(self) -> FrozenBatch {
        FrozenBatch {
            requests: self.requests,
            size_bytes: self.size_bytes,
            created_at: self.created_at,
        }
    }
}

/// A batch handed off for submission. Its contents can no longer change.
#[derive(Debug)]
pub struct FrozenBatch {
    requests: Vec<WriteRequest>,
    size_bytes: usize,
    created_at: Instant,
}

impl FrozenBatch {
    pub fn requests(&self) -> &[WriteRequest] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Match the store's per-item outcomes against the submitted requests.
    ///
    /// Outcomes beyond the submitted count are ignored; submitted requests
    /// without an outcome are counted as failed so outstanding accounting
    /// always settles.
    pub fn reconcile(self, outcomes: &[ItemOutcome]) -> BatchReport {
        let mut ok = 0;
        let mut failed = 0;
        for (request, outcome) in self.requests.iter().zip(outcomes) {
            match outcome {
                ItemOutcome::Ok => ok += 1,
                ItemOutcome::Failed { reason } => {
                    failed += 1;
                    tracing::debug!(
                        "index ({},{},{:?}) failed: {}",
                        request.collection(),
                        request.doc_type(),
                        request.id(),
                        reason
                    );
                }
            }
        }
        let submitted = self.requests.len() as u64;
        failed += submitted - (ok + failed);

        BatchReport {
            submitted,
            acknowledged: outcomes.len() as u64,
            ok,
            failed,
            size_bytes: self.size_bytes as u64,
        }
    }

    /// Reconcile a batch that never reached the store.
    pub fn fail_all(self) -> BatchReport {
        BatchReport {
            submitted: self.requests.len() as u64,
            acknowledged: 0,
            ok: 0,
            failed: self.requests.len() as u64,
            size_bytes: self.size_bytes as u64,
        }
    }
}

/// Result of reconciling one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub submitted: u64,
    /// Number of outcomes the store returned.
    pub acknowledged: u64,
    pub ok: u64,
    pub failed: u64,
    pub size_bytes: u64,
}

impl BatchReport {
    pub fn is_count_mismatch(&self) -> bool {
        self.acknowledged != self.submitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn request(body: &str) -> WriteRequest {
        WriteRequest::new("c", "t", Utc::now(), body)
    }

    fn frozen(bodies: &[&str]) -> FrozenBatch {
        let mut batch = Batch::new(Instant::now());
        for body in bodies {
            batch.push(request(body));
        }
        batch.freeze()
    }

    #[test]
    fn test_size_is_sum_of_members() {
        let mut batch = Batch::new(Instant::now());
        assert!(batch.is_empty());

        let bodies = ["{}", r#"{"a":1}"#, r#"{"text":"hello"}"#];
        for body in bodies {
            batch.push(request(body));
        }

        let expected: usize = bodies.iter().map(|b| b.len()).sum();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.size_bytes(), expected);

        let frozen = batch.freeze();
        assert_eq!(frozen.size_bytes(), expected);
        assert_eq!(
            frozen.requests().iter().map(|r| r.payload_len()).sum::<usize>(),
            frozen.size_bytes()
        );
    }

    #[test]
    fn test_reconcile_partitions_outcomes() {
        let report = frozen(&["{}", "{}", "{}"]).reconcile(&[
            ItemOutcome::Ok,
            ItemOutcome::failed("mapper_parsing_exception"),
            ItemOutcome::Ok,
        ]);

        assert_eq!(report.submitted, 3);
        assert_eq!(report.ok, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.size_bytes, 6);
        assert!(!report.is_count_mismatch());
    }

    #[test]
    fn test_reconcile_counts_missing_outcomes_as_failed() {
        let report = frozen(&["{}", "{}", "{}"]).reconcile(&[ItemOutcome::Ok]);

        assert_eq!(report.ok, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.acknowledged, 1);
        assert!(report.is_count_mismatch());
    }

    #[test]
    fn test_reconcile_ignores_surplus_outcomes() {
        let report = frozen(&["{}"]).reconcile(&[ItemOutcome::Ok, ItemOutcome::Ok]);

        assert_eq!(report.ok, 1);
        assert_eq!(report.failed, 0);
        assert!(report.is_count_mismatch());
    }

    #[test]
    fn test_fail_all() {
        let report = frozen(&["{}", "{}"]).fail_all();
        assert_eq!(report.ok, 0);
        assert_eq!(report.failed, 2);
        assert_eq!(report.acknowledged, 0);
    }
}
