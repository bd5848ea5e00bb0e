//! # Snapshot Differencing
//!
//! Turns two time-ordered snapshots of the same scope into a [`CounterDelta`].
//!
//! ## Wraparound
//!
//! Hardware counters are fixed-width and roll over. A counter that reads
//! `0xFFFF_FFFF_FFFF_FFF0` and then `0x10` advanced by `0x20`, not by a huge
//! negative amount, so every difference is taken modulo `2^width` where `width`
//! is the counter width the snapshot was captured with.
//!
//! ## Timing
//!
//! The monotonic tick delta is authoritative for ratio math and must be
//! positive. Wall-clock time is only used for display and may stall or jump.

use std::collections::BTreeMap;
use std::time::Duration;

use super::snapshot::{CounterSnapshot, ScopeSnapshots};
use crate::domain::{DeltaError, Scope};

/// Difference between two snapshots of one scope
#[derive(Debug, Clone, PartialEq)]
pub struct CounterDelta {
    pub(crate) scope: Scope,
    pub(crate) values: BTreeMap<String, i64>,
    pub(crate) elapsed_ticks: u64,
    pub(crate) elapsed_wall_ms: u64,
    pub(crate) elapsed_secs: f64,
    pub(crate) core_count: u32,
    pub(crate) thermal_headroom: Option<i32>,
}

impl CounterDelta {
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Signed difference of one counter, if both snapshots carried it
    #[must_use]
    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.get(name).copied()
    }

    #[must_use]
    pub fn values(&self) -> &BTreeMap<String, i64> {
        &self.values
    }

    /// Elapsed monotonic ticks (always > 0)
    #[must_use]
    pub fn elapsed_ticks(&self) -> u64 {
        self.elapsed_ticks
    }

    #[must_use]
    pub fn elapsed_wall_ms(&self) -> u64 {
        self.elapsed_wall_ms
    }

    /// Elapsed time derived from ticks and the source's tick rate
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    #[must_use]
    pub fn core_count(&self) -> u32 {
        self.core_count
    }

    /// Thermal headroom at the end of the interval
    #[must_use]
    pub fn thermal_headroom(&self) -> Option<i32> {
        self.thermal_headroom
    }
}

/// Elapsed count of a counter that wraps at `2^width`
#[must_use]
pub fn wrapping_delta(prev: u64, curr: u64, width: u32) -> u64 {
    let diff = curr.wrapping_sub(prev);
    if width >= 64 {
        diff
    } else {
        diff & ((1u64 << width) - 1)
    }
}

/// Computes deltas between snapshots captured by one counter source
#[derive(Debug, Clone, Copy)]
pub struct DeltaComputer {
    tick_rate_hz: u64,
}

impl DeltaComputer {
    /// `tick_rate_hz` converts monotonic ticks to seconds
    #[must_use]
    pub fn new(tick_rate_hz: u64) -> Self {
        Self { tick_rate_hz: tick_rate_hz.max(1) }
    }

    #[must_use]
    pub fn tick_rate_hz(&self) -> u64 {
        self.tick_rate_hz
    }

    /// Difference `curr - prev` for one scope.
    ///
    /// # Errors
    /// - [`DeltaError::ScopeMismatch`] if the snapshots describe different scopes
    /// - [`DeltaError::NonMonotonicTime`] if the tick counter went backwards
    /// - [`DeltaError::ZeroElapsedInterval`] if no ticks elapsed
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn diff(
        &self,
        prev: &CounterSnapshot,
        curr: &CounterSnapshot,
    ) -> Result<CounterDelta, DeltaError> {
        if prev.scope() != curr.scope() {
            return Err(DeltaError::ScopeMismatch { prev: prev.scope(), curr: curr.scope() });
        }

        let (t0, t1) = (prev.taken_at(), curr.taken_at());
        if t1.ticks < t0.ticks {
            return Err(DeltaError::NonMonotonicTime { prev: t0.ticks, curr: t1.ticks });
        }
        let elapsed_ticks = t1.ticks - t0.ticks;
        if elapsed_ticks == 0 {
            return Err(DeltaError::ZeroElapsedInterval);
        }

        let width = prev.counter_width().min(curr.counter_width());
        let values = curr
            .counters()
            .iter()
            .filter_map(|(name, &now)| {
                let before = prev.get(name)?;
                let delta = wrapping_delta(before, now, width);
                Some((name.clone(), i64::try_from(delta).unwrap_or(i64::MAX)))
            })
            .collect();

        // Wall clock may be adjusted underneath us; a backwards step reads as 0ms
        let elapsed_wall_ms = t1
            .wall
            .duration_since(t0.wall)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64;

        Ok(CounterDelta {
            scope: curr.scope(),
            values,
            elapsed_ticks,
            elapsed_wall_ms,
            elapsed_secs: elapsed_ticks as f64 / self.tick_rate_hz as f64,
            core_count: curr.core_count(),
            thermal_headroom: curr.thermal_headroom(),
        })
    }

    /// Diff every scope of two captures, pairing snapshots by scope.
    ///
    /// Any defect in any scope fails the whole interval.
    ///
    /// # Errors
    /// Returns the first [`DeltaError`] found.
    pub fn diff_all(
        &self,
        prev: &ScopeSnapshots,
        curr: &ScopeSnapshots,
    ) -> Result<ScopeDeltas, DeltaError> {
        let system = match (&prev.system, &curr.system) {
            (Some(p), Some(c)) => Some(self.diff(p, c)?),
            (None, Some(c)) => return Err(DeltaError::MissingScope(c.scope())),
            (_, None) => None,
        };

        Ok(ScopeDeltas {
            system,
            sockets: self.diff_matching(&prev.sockets, &curr.sockets)?,
            cores: self.diff_matching(&prev.cores, &curr.cores)?,
        })
    }

    fn diff_matching(
        &self,
        prev: &[CounterSnapshot],
        curr: &[CounterSnapshot],
    ) -> Result<Vec<CounterDelta>, DeltaError> {
        curr.iter()
            .enumerate()
            .map(|(idx, c)| {
                // Same order on both sides is the common case
                let p = prev
                    .get(idx)
                    .filter(|p| p.scope() == c.scope())
                    .or_else(|| prev.iter().find(|p| p.scope() == c.scope()))
                    .ok_or(DeltaError::MissingScope(c.scope()))?;
                self.diff(p, c)
            })
            .collect()
    }
}

/// Deltas for every enabled scope over one interval
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeDeltas {
    pub system: Option<CounterDelta>,
    pub sockets: Vec<CounterDelta>,
    pub cores: Vec<CounterDelta>,
}

impl ScopeDeltas {
    /// Wall-clock duration of the interval in milliseconds
    #[must_use]
    pub fn elapsed_wall_ms(&self) -> u64 {
        self.system
            .iter()
            .chain(&self.sockets)
            .chain(&self.cores)
            .next()
            .map_or(0, CounterDelta::elapsed_wall_ms)
    }
}
