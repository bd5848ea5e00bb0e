//! Synthetic counter source
//!
//! Produces plausible, deterministic counter streams for a synthetic topology.
//! Backs `--simulate` on machines without PMU access and the engine tests.

// Counter synthesis is float math truncated back into u64 registers
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]

use log::debug;
use pcmon_common::names;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;
use std::time::{Instant, SystemTime};

use super::snapshot::{CounterMap, CounterSnapshot, ScopeSnapshots, Timestamp};
use super::source::{roll_up, CounterSource};
use super::topology::Topology;
use crate::domain::{CaptureError, ProgramError, Scope, ScopeSelection};
use crate::sampling::EventSetMode;

/// Seed used unless `--seed` picks another one
pub const DEFAULT_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// Distance below `u64::MAX` at which wrap-seeded counters start
const WRAP_HEADROOM: u64 = 1 << 20;

/// How hard the synthetic cores work
#[derive(Debug, Clone, PartialEq)]
struct Load {
    /// Unhalted share of each interval (reference cycles per nominal tick)
    busy: RangeInclusive<f64>,
    /// Core cycles per reference cycle
    turbo: RangeInclusive<f64>,
}

impl Default for Load {
    fn default() -> Self {
        Self { busy: 0.2..=1.0, turbo: 0.8..=1.2 }
    }
}

/// Deterministic synthetic counters
pub struct SimulatedCounterSource {
    topology: Topology,
    epoch: Instant,
    rng: SmallRng,
    load: Load,
    /// Running totals per core, every counter the simulation knows
    totals: Vec<CounterMap>,
    last_ticks: u64,
    programmed: Option<EventSetMode>,
    occupied: bool,
}

impl SimulatedCounterSource {
    #[must_use]
    pub fn new(topology: Topology) -> Self {
        let totals = vec![CounterMap::new(); topology.num_cores()];
        Self {
            topology,
            epoch: Instant::now(),
            rng: SmallRng::seed_from_u64(DEFAULT_SEED),
            load: Load::default(),
            totals,
            last_ticks: 0,
            programmed: None,
            occupied: false,
        }
    }

    /// Reseed the jitter; equal seeds give equal counter streams for equal timings
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Every core busy the whole interval at exactly the nominal frequency
    #[must_use]
    pub fn at_nominal_frequency(mut self) -> Self {
        self.load = Load { busy: 1.0..=1.0, turbo: 1.0..=1.0 };
        self
    }

    /// Start every counter just below the 64-bit wrap point
    #[must_use]
    pub fn seeded_near_wrap(mut self) -> Self {
        let start = u64::MAX - WRAP_HEADROOM;
        for core in &mut self.totals {
            for name in all_counter_names() {
                core.insert(name.to_string(), start);
            }
        }
        self
    }

    /// Pretend another consumer holds the PMU until [`CounterSource::reset_pmu`]
    #[must_use]
    pub fn occupied(mut self) -> Self {
        self.occupied = true;
        self
    }

    fn advance(&mut self, elapsed_ticks: u64) {
        let elapsed = elapsed_ticks as f64;
        let memory = self.topology.memory_traffic_available;
        let interconnect = self.topology.num_sockets() > 1;

        for core in &mut self.totals {
            let rng = &mut self.rng;
            let ref_cycles = elapsed * rng.random_range(self.load.busy.clone());
            let cycles = ref_cycles * rng.random_range(self.load.turbo.clone());
            let instructions = cycles * rng.random_range(0.5..2.5);

            let l2_miss = instructions * rng.random_range(0.001..0.006);
            let l2_hit = instructions * rng.random_range(0.005..0.03);
            let l3_hit = l2_miss * rng.random_range(0.3..0.9);
            let l3_miss = l2_miss - l3_hit;

            let dtlb_miss = instructions * rng.random_range(0.0001..0.001);
            let itlb_miss = dtlb_miss * rng.random_range(0.05..0.3);

            let mut bump = |name: &str, amount: f64| {
                let slot = core.entry(name.to_string()).or_insert(0);
                *slot = slot.wrapping_add(amount as u64);
            };
            bump(names::INSTRUCTIONS, instructions);
            bump(names::CYCLES, cycles);
            bump(names::REF_CYCLES, ref_cycles);
            bump(names::L2_MISS, l2_miss);
            bump(names::L2_HIT, l2_hit);
            bump(names::L3_HIT, l3_hit);
            bump(names::L3_MISS, l3_miss);
            bump(names::DTLB_MISS, dtlb_miss);
            bump(names::DTLB_WALK_CYCLES, dtlb_miss * 30.0);
            bump(names::ITLB_MISS, itlb_miss);
            bump(names::ITLB_WALK_CYCLES, itlb_miss * 25.0);
            for (slot, name) in pcmon_common::CUSTOM_EVENT_NAMES.into_iter().enumerate() {
                bump(name, instructions * 0.01 * (slot + 1) as f64);
            }
            if memory {
                let read = l3_miss * 64.0;
                bump(names::MC_READ_BYTES, read);
                bump(names::MC_WRITE_BYTES, read * 0.35);
                if interconnect {
                    bump(names::QPI_IN_BYTES, read * 0.1);
                    bump(names::QPI_OUT_BYTES, read * 0.1);
                }
            }
        }
    }

    /// Counters visible while `mode` is programmed
    fn visible(&self, mode: &EventSetMode, totals: &CounterMap) -> CounterMap {
        let mut wanted = vec![names::INSTRUCTIONS, names::CYCLES, names::REF_CYCLES];
        wanted.extend(mode.counter_names());
        if self.topology.memory_traffic_available {
            wanted.extend([names::MC_READ_BYTES, names::MC_WRITE_BYTES]);
            if self.topology.num_sockets() > 1 {
                wanted.push(names::QPI_IN_BYTES);
                if self.topology.outgoing_qpi_available {
                    wanted.push(names::QPI_OUT_BYTES);
                }
            }
        }

        wanted
            .into_iter()
            .map(|name| (name.to_string(), totals.get(name).copied().unwrap_or(0)))
            .collect()
    }
}

fn all_counter_names() -> impl Iterator<Item = &'static str> {
    [
        names::INSTRUCTIONS,
        names::CYCLES,
        names::REF_CYCLES,
        names::L2_MISS,
        names::L2_HIT,
        names::L3_HIT,
        names::L3_MISS,
        names::DTLB_MISS,
        names::DTLB_WALK_CYCLES,
        names::ITLB_MISS,
        names::ITLB_WALK_CYCLES,
        names::MC_READ_BYTES,
        names::MC_WRITE_BYTES,
        names::QPI_IN_BYTES,
        names::QPI_OUT_BYTES,
    ]
    .into_iter()
    .chain(pcmon_common::CUSTOM_EVENT_NAMES)
}

impl CounterSource for SimulatedCounterSource {
    fn topology(&self) -> &Topology {
        &self.topology
    }

    fn program(&mut self, mode: &EventSetMode) -> Result<(), ProgramError> {
        if self.occupied {
            return Err(ProgramError::ResourceBusy);
        }
        debug!("Simulated PMU programmed for {mode}");
        self.programmed = Some(mode.clone());
        Ok(())
    }

    fn cleanup(&mut self) {
        self.programmed = None;
    }

    fn capture_all(&mut self, scopes: ScopeSelection) -> Result<ScopeSnapshots, CaptureError> {
        let mode = self.programmed.clone().ok_or(CaptureError::NotProgrammed)?;
        let ticks = self.monotonic_ticks();
        self.advance(ticks.saturating_sub(self.last_ticks));
        self.last_ticks = ticks;

        let taken_at = Timestamp::new(SystemTime::now(), ticks);
        let cores = self
            .topology
            .cores
            .iter()
            .zip(&self.totals)
            .map(|(core, totals)| {
                CounterSnapshot::new(Scope::Core(core.id), self.visible(&mode, totals), taken_at)
                    .with_thermal_headroom(Some(40 + (core.id.0 % 7) as i32))
            })
            .collect::<Vec<_>>();

        Ok(roll_up(&self.topology, cores, taken_at, scopes))
    }

    fn monotonic_ticks(&self) -> u64 {
        // Strictly increasing even when two reads land on the same tick
        let now = self.topology.ticks_from_nanos(self.epoch.elapsed().as_nanos());
        now.max(self.last_ticks.saturating_add(1))
    }

    fn reset_pmu(&mut self) -> Result<(), ProgramError> {
        self.occupied = false;
        self.programmed = None;
        Ok(())
    }
}
