//! # Shared Counter Definitions (engine ↔ counter backends)
//!
//! Defines the counter names and hardware event descriptors shared between the
//! sampling engine and the counter backends that program the PMU. Everything
//! here is plain `const` data so backends without `std` can use it as well.
//!
//! ## Event Sets
//!
//! The PMU has a handful of fixed counters (instructions, cycles, reference
//! cycles) and four general-purpose counters. Each event set programs the four
//! general-purpose counters with a different group of events:
//!
//! 1. **Cache** ([`CACHE_EVENTS`]) - L2/L3 hits and misses
//! 2. **TLB** ([`TLB_EVENTS`]) - data/instruction TLB misses and walk cycles
//!
//! Sampling alternates between the sets so that more logical counters are
//! covered than the hardware has registers for.
//!
//! ## Key Types
//!
//! - [`RawEvent`] - event-select / unit-mask pair with a stable counter name

#![no_std]

// ============================================================================
// Counter Names
// ============================================================================

/// Counter names as they appear in snapshots and deltas.
pub mod names {
    /// Instructions retired (fixed counter)
    pub const INSTRUCTIONS: &str = "instructions";

    /// Core cycles while unhalted (fixed counter)
    pub const CYCLES: &str = "cycles";

    /// Reference cycles at the nominal frequency while unhalted (fixed counter)
    pub const REF_CYCLES: &str = "ref_cycles";

    /// Retired loads that missed L3
    pub const L3_MISS: &str = "l3_miss";

    /// Retired loads that hit L3
    pub const L3_HIT: &str = "l3_hit";

    /// Retired loads that missed L2
    pub const L2_MISS: &str = "l2_miss";

    /// Retired loads that hit L2
    pub const L2_HIT: &str = "l2_hit";

    /// Data TLB load misses that caused a page walk
    pub const DTLB_MISS: &str = "dtlb_miss";

    /// Cycles with a data TLB page walk pending
    pub const DTLB_WALK_CYCLES: &str = "dtlb_walk_cycles";

    /// Instruction TLB misses that caused a page walk
    pub const ITLB_MISS: &str = "itlb_miss";

    /// Cycles with an instruction TLB page walk pending
    pub const ITLB_WALK_CYCLES: &str = "itlb_walk_cycles";

    /// Bytes read from the memory controller (uncore, socket/system scope)
    pub const MC_READ_BYTES: &str = "mc_read_bytes";

    /// Bytes written to the memory controller (uncore, socket/system scope)
    pub const MC_WRITE_BYTES: &str = "mc_write_bytes";

    /// Bytes received over the socket interconnect
    pub const QPI_IN_BYTES: &str = "qpi_in_bytes";

    /// Bytes sent over the socket interconnect
    pub const QPI_OUT_BYTES: &str = "qpi_out_bytes";
}

/// Number of general-purpose counters programmed per event set
pub const PROGRAMMABLE_COUNTERS: usize = 4;

/// Estimated penalty of an L3 miss, in core cycles
pub const L3_MISS_PENALTY_CYCLES: u64 = 180;

/// Estimated penalty of an L2 miss served by L3, in core cycles
pub const L2_MISS_PENALTY_CYCLES: u64 = 35;

/// Theoretical peak instructions per cycle of one core
pub const MAX_IPC: u32 = 4;

// ============================================================================
// Hardware Event Descriptors
// ============================================================================

/// A raw PMU event: event-select code and unit mask
///
/// **Encoding**: `config = event | (umask << 8)` (Intel `IA32_PERFEVTSELx` layout,
/// also accepted by `perf_event_open` with `PERF_TYPE_RAW`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawEvent {
    /// Counter name reported in snapshots
    pub name: &'static str,

    /// Event-select code
    pub event: u8,

    /// Unit mask (sub-event selector)
    pub umask: u8,
}

impl RawEvent {
    /// Raw configuration value for the event-select register
    #[must_use]
    pub const fn config(&self) -> u64 {
        (self.event as u64) | ((self.umask as u64) << 8)
    }
}

/// `MEM_LOAD_RETIRED.*` events for the cache event set
pub const CACHE_EVENTS: [RawEvent; PROGRAMMABLE_COUNTERS] = [
    RawEvent { name: names::L3_MISS, event: 0xD1, umask: 0x20 },
    RawEvent { name: names::L3_HIT, event: 0xD1, umask: 0x04 },
    RawEvent { name: names::L2_MISS, event: 0xD1, umask: 0x10 },
    RawEvent { name: names::L2_HIT, event: 0xD1, umask: 0x02 },
];

/// `DTLB_LOAD_MISSES.*` / `ITLB_MISSES.*` events for the TLB event set
pub const TLB_EVENTS: [RawEvent; PROGRAMMABLE_COUNTERS] = [
    RawEvent { name: names::DTLB_MISS, event: 0x08, umask: 0x01 },
    RawEvent { name: names::DTLB_WALK_CYCLES, event: 0x08, umask: 0x10 },
    RawEvent { name: names::ITLB_MISS, event: 0x85, umask: 0x01 },
    RawEvent { name: names::ITLB_WALK_CYCLES, event: 0x85, umask: 0x10 },
];

/// Counter names for user-supplied custom events, by programmable slot
pub const CUSTOM_EVENT_NAMES: [&str; PROGRAMMABLE_COUNTERS] =
    ["custom0", "custom1", "custom2", "custom3"];
