//! Collection progress, readable from outside the pipeline at any time.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;

/// One stage of the collection state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Authenticating,
    CollectingLive,
    CollectingOffline,
    Enriching,
    Exporting,
    Complete,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Authenticating => "authenticating",
            Phase::CollectingLive => "collecting_live",
            Phase::CollectingOffline => "collecting_offline",
            Phase::Enriching => "enriching",
            Phase::Exporting => "exporting",
            Phase::Complete => "complete",
            Phase::Failed => "failed",
        }
    }

    /// Position in the forward progression. `Failed` is not a rung on the
    /// ladder; it never appears as a completed-through marker.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Phase::Idle => 0,
            Phase::Authenticating => 1,
            Phase::CollectingLive => 2,
            Phase::CollectingOffline => 3,
            Phase::Enriching => 4,
            Phase::Exporting => 5,
            Phase::Complete => 6,
            Phase::Failed => 0,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the collection counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgressSnapshot {
    pub phase: Phase,
    pub processed: u64,
    pub live_found: u64,
    pub offline_found: u64,
    pub errored: u64,
}

/// Shared handle over the pipeline's counters.
///
/// The pipeline updates it synchronously after each unit of work; any other
/// holder of the handle can snapshot it without blocking the pipeline.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<Mutex<ProgressSnapshot>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.inner.lock().unwrap().clone()
    }

    pub fn set_phase(&self, phase: Phase) {
        self.inner.lock().unwrap().phase = phase;
    }

    pub fn record_processed(&self, count: u64) {
        self.inner.lock().unwrap().processed += count;
    }

    pub fn set_live_found(&self, count: u64) {
        self.inner.lock().unwrap().live_found = count;
    }

    pub fn set_offline_found(&self, count: u64) {
        self.inner.lock().unwrap().offline_found = count;
    }

    pub fn record_errors(&self, count: u64) {
        self.inner.lock().unwrap().errored += count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let tracker = ProgressTracker::new();
        tracker.set_phase(Phase::CollectingLive);
        tracker.record_processed(10);
        tracker.record_processed(5);
        tracker.record_errors(1);
        tracker.set_live_found(3);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.phase, Phase::CollectingLive);
        assert_eq!(snapshot.processed, 15);
        assert_eq!(snapshot.live_found, 3);
        assert_eq!(snapshot.errored, 1);
    }

    #[test]
    fn clones_observe_the_same_state() {
        let tracker = ProgressTracker::new();
        let observer = tracker.clone();
        tracker.record_processed(7);
        assert_eq!(observer.snapshot().processed, 7);
    }

    #[test]
    fn phase_rank_orders_the_state_machine() {
        assert!(Phase::Idle.rank() < Phase::CollectingLive.rank());
        assert!(Phase::CollectingLive.rank() < Phase::CollectingOffline.rank());
        assert!(Phase::CollectingOffline.rank() < Phase::Enriching.rank());
        assert!(Phase::Exporting.rank() < Phase::Complete.rank());
    }
}
