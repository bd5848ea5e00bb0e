//! Mutable state threaded through the sampling loop

use tokio::time::Instant;

use super::clock::DriftClock;
use super::rotator::{EventSetRotator, RotationPolicy};
use crate::counters::ScopeSnapshots;

/// Interval bookkeeping for the exit summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Interval waits that completed (elapsed or cancelled)
    pub intervals: u64,
    /// Records written to the sink
    pub records: u64,
    /// Intervals that produced no record
    pub skipped: u64,
}

/// State owned by one run of the sampling loop.
///
/// Holds the only live copy of the previous capture; each new capture is
/// moved in, never cloned.
#[derive(Debug)]
pub struct SamplingSession {
    pub previous: Option<ScopeSnapshots>,
    pub rotator: EventSetRotator,
    pub clock: DriftClock,
    /// The counter source holds a program that needs a matching cleanup
    pub programmed: bool,
    /// Cleared once the loop decides to stop
    pub running: bool,
    pub stats: SessionStats,
    started: Instant,
}

impl SamplingSession {
    #[must_use]
    pub fn new(policy: RotationPolicy) -> Self {
        Self {
            previous: None,
            rotator: EventSetRotator::new(policy),
            clock: DriftClock::new(),
            programmed: false,
            running: false,
            stats: SessionStats::default(),
            started: Instant::now(),
        }
    }

    /// Milliseconds on the monotonic process clock (the runtime clock, so
    /// paused test time drives it too)
    #[must_use]
    pub fn process_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
