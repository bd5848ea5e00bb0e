//! # Counter Acquisition and Arithmetic
//!
//! - [`CounterSource`] - programs the PMU and captures [`ScopeSnapshots`]
//! - [`DeltaComputer`] - wrap-safe differences between two snapshots
//! - [`metrics`] - derived metrics (IPC, hit ratios, bandwidth) on a [`CounterDelta`]
//!
//! Two sources ship: [`PerfCounterSource`] on Linux and
//! [`SimulatedCounterSource`] everywhere.

pub mod delta;
pub mod metrics;
#[cfg(target_os = "linux")]
pub mod perf;
pub mod simulated;
pub mod snapshot;
pub mod source;
pub mod topology;

pub use delta::{wrapping_delta, CounterDelta, DeltaComputer, ScopeDeltas};
pub use metrics::MetricValue;
#[cfg(target_os = "linux")]
pub use perf::PerfCounterSource;
pub use simulated::SimulatedCounterSource;
pub use snapshot::{CounterMap, CounterSnapshot, ScopeSnapshots, Timestamp};
pub use source::{roll_up, CounterSource};
pub use topology::{CoreInfo, MicroarchFamily, Topology};
