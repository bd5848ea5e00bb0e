//! # Linux perf_event Counter Source
//!
//! Counts per-CPU hardware events through `perf_event_open`.
//!
//! ## Counters Per CPU
//!
//! - **Generic**: instructions, cycles, reference cycles
//! - **Programmable**: the four raw events of the active mode
//!
//! The kernel virtualizes every counter to 64 bits, so snapshots are
//! full-width. Socket and system snapshots are sums over the cores they
//! contain. Time is kept on the monotonic clock and scaled to nominal-frequency
//! ticks.

use anyhow::Result;
use log::{debug, info, warn};
use perf_event_open::config::{Cpu, Opts, Proc};
use perf_event_open::count::Counter;
use perf_event_open::event::hw::Hardware;
use perf_event_open::event::raw::Raw;
use std::fs;
use std::io;
use std::time::{Instant, SystemTime};

use super::snapshot::{CounterMap, CounterSnapshot, ScopeSnapshots, Timestamp};
use super::source::{roll_up, CounterSource};
use super::topology::{self, Topology};
use crate::domain::{CaptureError, CoreId, ProgramError, Scope, ScopeSelection};
use crate::sampling::EventSetMode;
use pcmon_common::{names, RawEvent};

const NMI_WATCHDOG: &str = "/proc/sys/kernel/nmi_watchdog";

fn program_error(counter: &str, cpu: CoreId, err: &io::Error) -> ProgramError {
    match err.raw_os_error() {
        Some(libc::EACCES | libc::EPERM) => ProgramError::AccessDenied,
        Some(libc::EBUSY) => ProgramError::ResourceBusy,
        _ => ProgramError::Unknown(format!("{counter} on {cpu}: {err}")),
    }
}

/// The event is not implemented by this PMU
fn is_unsupported(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENOENT | libc::EOPNOTSUPP | libc::EINVAL))
}

fn raw(event: &RawEvent) -> Raw {
    Raw { config: event.config(), config1: 0, config2: 0, config3: 0 }
}

/// Counting events of one CPU, opened disabled
struct CpuCounters {
    cpu: CoreId,
    counters: Vec<(&'static str, Counter)>,
}

impl CpuCounters {
    fn open(cpu: CoreId, mode: &EventSetMode) -> Result<Self, ProgramError> {
        // Every pid on this CPU, user and kernel, starting disabled
        let target = (Proc::ALL, Cpu(cpu.0));
        let opts = Opts::default();

        let generic = [
            (names::INSTRUCTIONS, Hardware::Instr),
            (names::CYCLES, Hardware::CpuCycle),
            (names::REF_CYCLES, Hardware::RefCpuCycle),
        ];

        let mut counters = Vec::with_capacity(generic.len() + pcmon_common::PROGRAMMABLE_COUNTERS);
        for (name, event) in generic {
            let counter = Counter::new(event, target, &opts).map_err(|e| program_error(name, cpu, &e))?;
            counters.push((name, counter));
        }

        for event in mode.programmable_events() {
            match Counter::new(raw(&event), target, &opts) {
                Ok(counter) => counters.push((event.name, counter)),
                Err(e) if is_unsupported(&e) => {
                    warn!("Event {} (0x{:x}) not supported on {cpu}, reading as 0", event.name, event.config());
                }
                Err(e) => return Err(program_error(event.name, cpu, &e)),
            }
        }

        Ok(Self { cpu, counters })
    }

    fn enable(&self) -> Result<(), ProgramError> {
        for (name, counter) in &self.counters {
            counter
                .clear_count()
                .and_then(|()| counter.enable())
                .map_err(|e| program_error(name, self.cpu, &e))?;
        }
        Ok(())
    }

    fn read(&self) -> Result<CounterMap, CaptureError> {
        let mut values = CounterMap::new();
        for (name, counter) in &self.counters {
            let stat = counter.stat().map_err(|error| CaptureError::ReadFailed {
                core: self.cpu,
                counter: (*name).to_string(),
                error,
            })?;
            values.insert((*name).to_string(), stat.count);
        }
        Ok(values)
    }
}

/// Hardware counters of every online CPU
pub struct PerfCounterSource {
    topology: Topology,
    epoch: Instant,
    programmed: Option<(EventSetMode, Vec<CpuCounters>)>,
}

impl PerfCounterSource {
    /// Detect the machine. Nothing is opened until [`CounterSource::program`].
    ///
    /// # Errors
    /// Returns an error if the CPU topology cannot be read
    pub fn new() -> Result<Self> {
        let topology = topology::detect()?;
        info!(
            "Detected {} ({} family), {} CPUs on {} socket(s), {} ticks/s",
            topology.brand,
            topology.family,
            topology.num_cores(),
            topology.num_sockets(),
            topology.tick_rate_hz
        );
        Ok(Self { topology, epoch: Instant::now(), programmed: None })
    }
}

impl CounterSource for PerfCounterSource {
    fn topology(&self) -> &Topology {
        &self.topology
    }

    fn program(&mut self, mode: &EventSetMode) -> Result<(), ProgramError> {
        if self.programmed.is_some() {
            self.cleanup();
        }

        let cpus = self
            .topology
            .cores
            .iter()
            .map(|core| CpuCounters::open(core.id, mode))
            .collect::<Result<Vec<_>, _>>()?;
        for cpu in &cpus {
            cpu.enable()?;
        }

        debug!("Programmed {mode} on {} CPUs", cpus.len());
        self.programmed = Some((mode.clone(), cpus));
        Ok(())
    }

    fn cleanup(&mut self) {
        if let Some((mode, cpus)) = self.programmed.take() {
            // Dropping the counters closes every descriptor
            debug!("Released {mode} on {} CPUs", cpus.len());
        }
    }

    fn capture_all(&mut self, scopes: ScopeSelection) -> Result<ScopeSnapshots, CaptureError> {
        let taken_at = Timestamp::new(SystemTime::now(), self.monotonic_ticks());
        let (mode, cpus) = self.programmed.as_ref().ok_or(CaptureError::NotProgrammed)?;

        let mut cores = Vec::with_capacity(cpus.len());
        for cpu in cpus {
            let mut values = cpu.read()?;
            // Unsupported programmable events still get a column
            for name in mode.counter_names() {
                values.entry(name.to_string()).or_insert(0);
            }
            cores.push(CounterSnapshot::new(Scope::Core(cpu.cpu), values, taken_at));
        }

        Ok(roll_up(&self.topology, cores, taken_at, scopes))
    }

    fn monotonic_ticks(&self) -> u64 {
        self.topology.ticks_from_nanos(self.epoch.elapsed().as_nanos())
    }

    fn reset_pmu(&mut self) -> Result<(), ProgramError> {
        self.cleanup();
        fs::write(NMI_WATCHDOG, "0").map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => ProgramError::AccessDenied,
            _ => ProgramError::Unknown(format!("Failed to write {NMI_WATCHDOG}: {e}")),
        })?;
        info!("Disabled the NMI watchdog to free its counter");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_error_mapping() {
        let cpu = CoreId(0);
        let denied = io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(program_error("cycles", cpu, &denied), ProgramError::AccessDenied);

        let perm = io::Error::from_raw_os_error(libc::EPERM);
        assert_eq!(program_error("cycles", cpu, &perm), ProgramError::AccessDenied);

        let busy = io::Error::from_raw_os_error(libc::EBUSY);
        assert_eq!(program_error("cycles", cpu, &busy), ProgramError::ResourceBusy);

        let other = io::Error::from_raw_os_error(libc::EMFILE);
        assert!(matches!(program_error("cycles", cpu, &other), ProgramError::Unknown(msg) if msg.contains("cycles on C0")));
    }

    #[test]
    fn test_unsupported_errors() {
        assert!(is_unsupported(&io::Error::from_raw_os_error(libc::ENOENT)));
        assert!(!is_unsupported(&io::Error::from_raw_os_error(libc::EBUSY)));
    }

    #[test]
    fn test_raw_event_config() {
        let event = pcmon_common::TLB_EVENTS[0];
        let raw = raw(&event);
        assert_eq!(raw.config, 0x0108);
        assert_eq!(raw.config1, 0);
    }
}
