//! Backpressure gates.
//!
//! Two independent gates slow producers down when the store falls behind:
//! the intake gate holds new datums while too many items are outstanding,
//! and the dispatch gate holds new submissions while too many batches are in
//! flight. Both are soft limits. A gate that runs out of patience logs and
//! lets the caller through.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::WriterConfig;
use crate::counters::Counters;

/// How a caller got through a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// The limit was not exceeded; no wait happened.
    Open,
    /// The caller waited and the limit cleared.
    Released { waited: Duration },
    /// The wait budget ran out with the limit still exceeded.
    Exhausted { waited: Duration },
}

#[derive(Debug, Clone)]
pub struct Backpressure {
    high_water_mark: u64,
    intake_wait: Duration,
    max_in_flight_batches: u64,
    dispatch_wait: Duration,
}

impl Backpressure {
    pub fn new(config: &WriterConfig) -> Self {
        Self {
            high_water_mark: config.high_water_mark(),
            intake_wait: config.intake_wait(),
            max_in_flight_batches: config.max_in_flight_batches,
            dispatch_wait: config.dispatch_wait(),
        }
    }

    pub fn high_water_mark(&self) -> u64 {
        self.high_water_mark
    }

    /// Hold a producer while outstanding items exceed the high-water mark.
    pub async fn intake_gate(&self, counters: &Counters) -> GateOutcome {
        let limit = self.high_water_mark;
        if counters.total_outstanding() <= limit {
            return GateOutcome::Open;
        }

        let outcome = guarded_wait("intake", counters, self.intake_wait, |c| {
            c.total_outstanding() <= limit
        })
        .await;

        if let GateOutcome::Exhausted { .. } = outcome {
            tracing::warn!(
                "Even after back-off there are {} items still in queue",
                counters.total_outstanding()
            );
        }
        outcome
    }

    /// Hold a submission while too many batches are in flight.
    pub async fn dispatch_gate(&self, counters: &Counters) -> GateOutcome {
        let limit = self.max_in_flight_batches;
        if counters.batches_in_flight() <= limit {
            return GateOutcome::Open;
        }

        let outcome = guarded_wait("dispatch", counters, self.dispatch_wait, |c| {
            c.batches_in_flight() <= limit
        })
        .await;

        if let GateOutcome::Exhausted { waited } = outcome {
            tracing::warn!(
                "{} batches still in flight after waiting {:?}; submitting anyway",
                counters.batches_in_flight(),
                waited
            );
        }
        outcome
    }
}

/// Wait until every submitted batch has been reconciled.
pub async fn drain(counters: &Counters, budget: Duration) -> GateOutcome {
    if counters.batches_in_flight() == 0 {
        return GateOutcome::Open;
    }
    guarded_wait("drain", counters, budget, |c| c.batches_in_flight() == 0).await
}

async fn guarded_wait<F>(
    gate: &'static str,
    counters: &Counters,
    budget: Duration,
    done: F,
) -> GateOutcome
where
    F: FnMut(&Counters) -> bool,
{
    let start = Instant::now();
    let mut guard = AbandonedWait { gate, armed: true };

    let cleared = counters.wait_until(budget, done).await;
    guard.armed = false;

    let waited = start.elapsed();
    tracing::debug!("{gate} gate waited {waited:?} (cleared: {cleared})");
    if cleared {
        GateOutcome::Released { waited }
    } else {
        GateOutcome::Exhausted { waited }
    }
}

/// Logs when a gate wait is dropped before it finished, e.g. on abrupt
/// shutdown.
struct AbandonedWait {
    gate: &'static str,
    armed: bool,
}

impl Drop for AbandonedWait {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!("{} wait was interrupted. Data may be lost", self.gate);
        }
    }
}
