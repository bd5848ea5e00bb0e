//! Derived metrics over a [`CounterDelta`]
//!
//! Every ratio resolves a zero denominator to `0.0`. Metrics that depend on
//! counters the source may not provide (memory controller, interconnect)
//! resolve to [`MetricValue::Unavailable`] instead, which renders as `N/A`.

// Counter values are converted to f64 for ratio math
#![allow(clippy::cast_precision_loss)]

use pcmon_common::names;
use pcmon_common::{L2_MISS_PENALTY_CYCLES, L3_MISS_PENALTY_CYCLES};
use serde::{Serialize, Serializer};
use std::fmt;

use super::delta::CounterDelta;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// A single rendered metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Ratio(f64),
    Count(u64),
    Unavailable,
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Ratio(v) => write!(f, "{v:.3}"),
            MetricValue::Count(v) => write!(f, "{v}"),
            MetricValue::Unavailable => f.write_str("N/A"),
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricValue::Ratio(v) => serializer.serialize_f64(*v),
            MetricValue::Count(v) => serializer.serialize_u64(*v),
            MetricValue::Unavailable => serializer.serialize_none(),
        }
    }
}

/// `num / den`, or 0 when the denominator is zero or the result is not finite
#[must_use]
pub fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        return 0.0;
    }
    let value = num / den;
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

impl CounterDelta {
    /// Non-negative count of a counter (0 when absent)
    #[must_use]
    pub fn count(&self, name: &str) -> u64 {
        self.get(name).map_or(0, |v| u64::try_from(v).unwrap_or(0))
    }

    fn count_f(&self, name: &str) -> f64 {
        self.count(name) as f64
    }

    #[must_use]
    pub fn instructions(&self) -> u64 {
        self.count(names::INSTRUCTIONS)
    }

    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.count(names::CYCLES)
    }

    /// Instructions retired per core cycle
    #[must_use]
    pub fn ipc(&self) -> f64 {
        ratio(self.count_f(names::INSTRUCTIONS), self.count_f(names::CYCLES))
    }

    /// IPC scaled to a physical core (all its hardware threads)
    #[must_use]
    pub fn core_ipc(&self, threads_per_core: u32) -> f64 {
        self.ipc() * f64::from(threads_per_core.max(1))
    }

    fn ticks_per_core(&self) -> f64 {
        self.elapsed_ticks as f64 * f64::from(self.core_count.max(1))
    }

    /// Instructions per nominal tick, averaged over the cores in scope
    #[must_use]
    pub fn exec_usage(&self) -> f64 {
        ratio(self.count_f(names::INSTRUCTIONS), self.ticks_per_core())
    }

    /// Instructions per nominal tick, summed over the cores in scope
    #[must_use]
    pub fn total_exec_usage(&self) -> f64 {
        ratio(self.count_f(names::INSTRUCTIONS), self.elapsed_ticks as f64)
    }

    /// Core cycles per nominal tick (1.0 = running at nominal frequency all the time)
    #[must_use]
    pub fn relative_frequency(&self) -> f64 {
        ratio(self.count_f(names::CYCLES), self.ticks_per_core())
    }

    /// Core cycles per reference cycle while unhalted
    #[must_use]
    pub fn active_relative_frequency(&self) -> f64 {
        ratio(self.count_f(names::CYCLES), self.count_f(names::REF_CYCLES))
    }

    #[must_use]
    pub fn l3_misses(&self) -> u64 {
        self.count(names::L3_MISS)
    }

    #[must_use]
    pub fn l3_hits(&self) -> u64 {
        self.count(names::L3_HIT)
    }

    /// L2 misses; falls back to L3 lookups when there is no direct counter
    #[must_use]
    pub fn l2_misses(&self) -> u64 {
        match self.get(names::L2_MISS) {
            Some(_) => self.count(names::L2_MISS),
            None => self.l3_hits().saturating_add(self.l3_misses()),
        }
    }

    /// L2 misses in units of 2^20 events, as the reduced (Atom) tables show them
    #[must_use]
    pub fn l2_misses_mi(&self) -> f64 {
        self.l2_misses() as f64 / BYTES_PER_MIB
    }

    #[must_use]
    pub fn l2_hits(&self) -> u64 {
        self.count(names::L2_HIT)
    }

    #[must_use]
    pub fn l3_hit_ratio(&self) -> f64 {
        let hits = self.l3_hits() as f64;
        ratio(hits, hits + self.l3_misses() as f64)
    }

    #[must_use]
    pub fn l2_hit_ratio(&self) -> f64 {
        let hits = self.l2_hits() as f64;
        ratio(hits, hits + self.l2_misses() as f64)
    }

    /// Estimated share of cycles stalled on L3 misses, capped at 1.0
    #[must_use]
    pub fn cycles_lost_l3_misses(&self) -> f64 {
        let stalled = self.l3_misses().saturating_mul(L3_MISS_PENALTY_CYCLES) as f64;
        ratio(stalled, self.count_f(names::CYCLES)).min(1.0)
    }

    /// Estimated share of cycles stalled on L2 misses served by L3, capped at 1.0
    #[must_use]
    pub fn cycles_lost_l2_misses(&self) -> f64 {
        let stalled = self.l3_hits().saturating_mul(L2_MISS_PENALTY_CYCLES) as f64;
        ratio(stalled, self.count_f(names::CYCLES)).min(1.0)
    }

    /// Data and instruction TLB misses that caused a page walk
    #[must_use]
    pub fn tlb_misses(&self) -> u64 {
        self.count(names::DTLB_MISS).saturating_add(self.count(names::ITLB_MISS))
    }

    /// Share of cycles spent in page walks
    #[must_use]
    pub fn tlb_miss_cycles(&self) -> f64 {
        let walking =
            self.count_f(names::DTLB_WALK_CYCLES) + self.count_f(names::ITLB_WALK_CYCLES);
        ratio(walking, self.count_f(names::CYCLES))
    }

    fn bytes(&self, name: &str) -> Option<f64> {
        self.get(name).map(|_| self.count_f(name))
    }

    /// GiB read from the memory controller
    #[must_use]
    pub fn bytes_read_gib(&self) -> MetricValue {
        self.bytes(names::MC_READ_BYTES)
            .map_or(MetricValue::Unavailable, |b| MetricValue::Ratio(b / BYTES_PER_GIB))
    }

    /// GiB written to the memory controller
    #[must_use]
    pub fn bytes_written_gib(&self) -> MetricValue {
        self.bytes(names::MC_WRITE_BYTES)
            .map_or(MetricValue::Unavailable, |b| MetricValue::Ratio(b / BYTES_PER_GIB))
    }

    /// Memory bandwidth (read + write) in bytes per second
    #[must_use]
    pub fn memory_bandwidth(&self) -> MetricValue {
        match (self.bytes(names::MC_READ_BYTES), self.bytes(names::MC_WRITE_BYTES)) {
            (Some(read), Some(write)) => MetricValue::Ratio(ratio(read + write, self.elapsed_secs)),
            _ => MetricValue::Unavailable,
        }
    }

    /// MiB received over the socket interconnect
    #[must_use]
    pub fn qpi_incoming_mib(&self) -> MetricValue {
        self.bytes(names::QPI_IN_BYTES)
            .map_or(MetricValue::Unavailable, |b| MetricValue::Ratio(b / BYTES_PER_MIB))
    }

    /// MiB sent over the socket interconnect
    #[must_use]
    pub fn qpi_outgoing_mib(&self) -> MetricValue {
        self.bytes(names::QPI_OUT_BYTES)
            .map_or(MetricValue::Unavailable, |b| MetricValue::Ratio(b / BYTES_PER_MIB))
    }

    /// Interconnect traffic relative to memory controller traffic
    #[must_use]
    pub fn qpi_to_mc_ratio(&self) -> MetricValue {
        match (
            self.bytes(names::QPI_IN_BYTES),
            self.bytes(names::MC_READ_BYTES),
            self.bytes(names::MC_WRITE_BYTES),
        ) {
            (Some(qpi), Some(read), Some(write)) => MetricValue::Ratio(ratio(qpi, read + write)),
            _ => MetricValue::Unavailable,
        }
    }
}
