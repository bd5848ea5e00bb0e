//! Immutable counter snapshots
//!
//! A [`CounterSnapshot`] is one read of every counter register for one scope.
//! Snapshots are produced by a [`CounterSource`](super::CounterSource) and
//! consumed by the [`DeltaComputer`](super::DeltaComputer); nothing mutates
//! them after capture.

use std::collections::BTreeMap;
use std::time::SystemTime;

use crate::domain::Scope;

/// Raw counter values keyed by counter name, in name order
pub type CounterMap = BTreeMap<String, u64>;

/// When a snapshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// Wall-clock time, used for display
    pub wall: SystemTime,
    /// Monotonic tick counter, used for ratio math
    pub ticks: u64,
}

impl Timestamp {
    #[must_use]
    pub fn new(wall: SystemTime, ticks: u64) -> Self {
        Self { wall, ticks }
    }
}

/// All counter registers of one scope at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct CounterSnapshot {
    scope: Scope,
    counters: CounterMap,
    taken_at: Timestamp,
    /// Bit width of the raw counters (values wrap at `2^width`)
    counter_width: u32,
    /// Logical cores aggregated into this snapshot
    core_count: u32,
    /// Degrees below the thermal throttling point, when the core reports it
    thermal_headroom: Option<i32>,
}

impl CounterSnapshot {
    /// Create a snapshot of full-width (64-bit) counters
    #[must_use]
    pub fn new(scope: Scope, counters: CounterMap, taken_at: Timestamp) -> Self {
        Self {
            scope,
            counters,
            taken_at,
            counter_width: 64,
            core_count: 1,
            thermal_headroom: None,
        }
    }

    /// Counters that roll over at `2^width` instead of `2^64`
    #[must_use]
    pub fn with_counter_width(mut self, width: u32) -> Self {
        self.counter_width = width.clamp(1, 64);
        self
    }

    #[must_use]
    pub fn with_core_count(mut self, core_count: u32) -> Self {
        self.core_count = core_count.max(1);
        self
    }

    #[must_use]
    pub fn with_thermal_headroom(mut self, headroom: Option<i32>) -> Self {
        self.thermal_headroom = headroom;
        self
    }

    /// Sum several snapshots into one covering a wider scope.
    ///
    /// Parts must already be full-width; narrow counters have to be widened
    /// by the source before aggregation or the sum wraps at the wrong modulus.
    pub fn aggregate<'a>(
        scope: Scope,
        taken_at: Timestamp,
        parts: impl IntoIterator<Item = &'a CounterSnapshot>,
    ) -> Self {
        let mut counters = CounterMap::new();
        let mut core_count = 0;
        for part in parts {
            core_count += part.core_count;
            for (name, value) in &part.counters {
                let slot = counters.entry(name.clone()).or_insert(0u64);
                *slot = slot.wrapping_add(*value);
            }
        }
        Self::new(scope, counters, taken_at).with_core_count(core_count)
    }

    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    #[must_use]
    pub fn counters(&self) -> &CounterMap {
        &self.counters
    }

    /// Raw value of one counter
    #[must_use]
    pub fn get(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    #[must_use]
    pub fn taken_at(&self) -> Timestamp {
        self.taken_at
    }

    #[must_use]
    pub fn counter_width(&self) -> u32 {
        self.counter_width
    }

    #[must_use]
    pub fn core_count(&self) -> u32 {
        self.core_count
    }

    #[must_use]
    pub fn thermal_headroom(&self) -> Option<i32> {
        self.thermal_headroom
    }
}

/// One capture across every enabled scope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeSnapshots {
    pub system: Option<CounterSnapshot>,
    pub sockets: Vec<CounterSnapshot>,
    pub cores: Vec<CounterSnapshot>,
}

impl ScopeSnapshots {
    /// Timestamp of the capture (taken from the first snapshot present)
    #[must_use]
    pub fn taken_at(&self) -> Option<Timestamp> {
        self.system
            .iter()
            .chain(&self.sockets)
            .chain(&self.cores)
            .next()
            .map(CounterSnapshot::taken_at)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.system.is_none() && self.sockets.is_empty() && self.cores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CoreId, SocketId};
    use std::time::Duration;

    fn core(id: u32, instructions: u64, ticks: u64) -> CounterSnapshot {
        let mut counters = CounterMap::new();
        counters.insert("instructions".to_string(), instructions);
        let at = Timestamp::new(SystemTime::UNIX_EPOCH + Duration::from_secs(10), ticks);
        CounterSnapshot::new(Scope::Core(CoreId(id)), counters, at)
    }

    #[test]
    fn test_aggregate_sums_counters_and_cores() {
        let parts = [core(0, 100, 5), core(1, 250, 5)];
        let at = parts[0].taken_at();
        let socket = CounterSnapshot::aggregate(Scope::Socket(SocketId(0)), at, &parts);

        assert_eq!(socket.get("instructions"), Some(350));
        assert_eq!(socket.core_count(), 2);
        assert_eq!(socket.scope(), Scope::Socket(SocketId(0)));
    }

    #[test]
    fn test_aggregate_wraps_instead_of_overflowing() {
        let parts = [core(0, u64::MAX, 5), core(1, 2, 5)];
        let socket = CounterSnapshot::aggregate(Scope::System, parts[0].taken_at(), &parts);
        assert_eq!(socket.get("instructions"), Some(1));
    }

    #[test]
    fn test_counter_width_is_clamped() {
        let snap = core(0, 1, 1).with_counter_width(128);
        assert_eq!(snap.counter_width(), 64);
    }

    #[test]
    fn test_scope_snapshots_timestamp() {
        let capture = ScopeSnapshots { system: None, sockets: Vec::new(), cores: vec![core(0, 1, 42)] };
        assert_eq!(capture.taken_at().map(|t| t.ticks), Some(42));
        assert!(ScopeSnapshots::default().taken_at().is_none());
    }
}
