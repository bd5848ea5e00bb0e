//! CPU topology probing
//!
//! Utilities for querying CPU layout from the /sys and /proc filesystems.

use anyhow::{Context, Result};
use log::warn;
use pcmon_common::MAX_IPC;
use std::fs;
use std::path::Path;

use crate::domain::{CoreId, SocketId};

/// Microarchitecture family, selects the metric set reports can offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroarchFamily {
    /// Low-power cores without L3 events: reduced metric set
    Atom,
    /// Everything else: full metric set
    Core,
}

impl std::fmt::Display for MicroarchFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MicroarchFamily::Atom => f.write_str("atom"),
            MicroarchFamily::Core => f.write_str("core"),
        }
    }
}

/// One logical core and the socket it lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreInfo {
    pub id: CoreId,
    pub socket: SocketId,
}

/// Machine layout and counter capabilities
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    pub cores: Vec<CoreInfo>,
    pub family: MicroarchFamily,
    pub brand: String,
    pub threads_per_core: u32,
    /// Monotonic ticks per second: the nominal core frequency, so one busy
    /// core at base clock runs one cycle per tick
    pub tick_rate_hz: u64,
    pub max_ipc: u32,
    /// Memory controller byte counters are present
    pub memory_traffic_available: bool,
    /// Outgoing interconnect byte counters are present
    pub outgoing_qpi_available: bool,
}

impl Topology {
    /// A synthetic machine: `cores` logical cores spread evenly over `sockets`
    #[must_use]
    pub fn synthetic(cores: u32, sockets: u32) -> Self {
        let sockets = sockets.clamp(1, cores.max(1));
        let per_socket = cores.max(1).div_ceil(sockets);
        Self {
            cores: (0..cores.max(1))
                .map(|id| CoreInfo { id: CoreId(id), socket: SocketId(id / per_socket) })
                .collect(),
            family: MicroarchFamily::Core,
            brand: "Simulated CPU @ 2.40GHz".to_string(),
            threads_per_core: 1,
            tick_rate_hz: SYNTHETIC_NOMINAL_HZ,
            max_ipc: MAX_IPC,
            memory_traffic_available: true,
            outgoing_qpi_available: sockets > 1,
        }
    }

    /// Convert elapsed nanoseconds into nominal-frequency ticks
    #[must_use]
    pub fn ticks_from_nanos(&self, nanos: u128) -> u64 {
        let ticks = nanos.saturating_mul(u128::from(self.tick_rate_hz)) / NANOS_PER_SEC;
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    #[must_use]
    pub fn num_cores(&self) -> usize {
        self.cores.len()
    }

    /// Distinct sockets, ascending
    #[must_use]
    pub fn sockets(&self) -> Vec<SocketId> {
        let mut sockets: Vec<SocketId> = self.cores.iter().map(|c| c.socket).collect();
        sockets.sort_unstable();
        sockets.dedup();
        sockets
    }

    #[must_use]
    pub fn num_sockets(&self) -> usize {
        self.sockets().len()
    }

    #[must_use]
    pub fn socket_of(&self, core: CoreId) -> Option<SocketId> {
        self.cores.iter().find(|c| c.id == core).map(|c| c.socket)
    }
}

/// Nominal frequency of synthetic machines
pub const SYNTHETIC_NOMINAL_HZ: u64 = 2_400_000_000;

/// Tick rate used when the nominal frequency cannot be determined
pub const FALLBACK_TICK_RATE_HZ: u64 = 1_000_000_000;

const NANOS_PER_SEC: u128 = 1_000_000_000;

const BASE_FREQUENCY: &str = "/sys/devices/system/cpu/cpu0/cpufreq/base_frequency";

/// Parse a kernel CPU list like "0-3" or "0-3,8-11" or "5"
///
/// # Errors
/// Returns an error if an entry is not a number or a range
pub fn parse_cpu_list(list: &str) -> Result<Vec<CoreId>> {
    let mut cpus = Vec::new();

    for range in list.trim().split(',').filter(|r| !r.is_empty()) {
        if let Some((start, end)) = range.split_once('-') {
            // Range like "0-3"
            let start: u32 = start.parse().with_context(|| format!("Bad CPU range: {range}"))?;
            let end: u32 = end.parse().with_context(|| format!("Bad CPU range: {range}"))?;
            for cpu in start..=end {
                cpus.push(CoreId(cpu));
            }
        } else {
            // Single CPU like "5"
            let cpu: u32 = range.parse().with_context(|| format!("Bad CPU id: {range}"))?;
            cpus.push(CoreId(cpu));
        }
    }

    Ok(cpus)
}

/// Get list of online CPU IDs from /sys/devices/system/cpu/online
///
/// # Errors
/// Returns an error if the file cannot be read or parsed
pub fn online_cpus() -> Result<Vec<CoreId>> {
    let content = fs::read_to_string("/sys/devices/system/cpu/online")
        .context("Failed to read /sys/devices/system/cpu/online")?;
    parse_cpu_list(&content)
}

fn read_topology_file(cpu: CoreId, file: &str) -> Option<String> {
    let path = format!("/sys/devices/system/cpu/cpu{}/topology/{file}", cpu.0);
    fs::read_to_string(path).ok()
}

/// Socket (physical package) of a CPU; 0 when the kernel doesn't say
#[must_use]
pub fn socket_of(cpu: CoreId) -> SocketId {
    read_topology_file(cpu, "physical_package_id")
        .and_then(|id| id.trim().parse().ok())
        .map_or(SocketId(0), SocketId)
}

/// Hardware threads sharing a physical core with `cpu`
#[must_use]
pub fn threads_per_core(cpu: CoreId) -> u32 {
    read_topology_file(cpu, "thread_siblings_list")
        .and_then(|list| parse_cpu_list(&list).ok())
        .and_then(|siblings| u32::try_from(siblings.len()).ok())
        .filter(|&n| n > 0)
        .unwrap_or(1)
}

/// Brand string and family from /proc/cpuinfo contents
#[must_use]
pub fn parse_cpuinfo(cpuinfo: &str) -> (String, MicroarchFamily) {
    let brand = cpuinfo
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            (key.trim() == "model name").then(|| value.trim().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());

    let family = if brand.contains("Atom") { MicroarchFamily::Atom } else { MicroarchFamily::Core };
    (brand, family)
}

/// Nominal frequency advertised in a brand string ("... @ 2.40GHz")
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn brand_frequency_hz(brand: &str) -> Option<u64> {
    let (_, tail) = brand.rsplit_once('@')?;
    let tail = tail.trim();
    let (number, scale) = if let Some(ghz) = tail.strip_suffix("GHz") {
        (ghz, 1e9)
    } else {
        (tail.strip_suffix("MHz")?, 1e6)
    };
    let hz = number.trim().parse::<f64>().ok()? * scale;
    (hz.is_finite() && hz >= 1.0).then(|| hz.round() as u64)
}

/// Nominal core frequency: cpufreq `base_frequency` (kHz), then the brand string
#[must_use]
pub fn nominal_frequency_hz(brand: &str) -> Option<u64> {
    fs::read_to_string(BASE_FREQUENCY)
        .ok()
        .and_then(|khz| khz.trim().parse::<u64>().ok())
        .filter(|&khz| khz > 0)
        .map(|khz| khz * 1_000)
        .or_else(|| brand_frequency_hz(brand))
}

/// Detect the running machine.
///
/// The tick rate is the nominal core frequency, so counter sources that keep
/// time on the monotonic clock scale nanoseconds with [`Topology::ticks_from_nanos`].
///
/// # Errors
/// Returns an error if the online CPU list is unavailable
pub fn detect() -> Result<Topology> {
    let cpus = online_cpus()?;
    let cpuinfo = if Path::new("/proc/cpuinfo").exists() {
        fs::read_to_string("/proc/cpuinfo").context("Failed to read /proc/cpuinfo")?
    } else {
        String::new()
    };
    let (brand, family) = parse_cpuinfo(&cpuinfo);
    let threads = cpus.first().map_or(1, |&cpu| threads_per_core(cpu));
    let tick_rate_hz = nominal_frequency_hz(&brand).unwrap_or_else(|| {
        warn!("Nominal CPU frequency unknown, FREQ and EXEC are relative to 1 GHz");
        FALLBACK_TICK_RATE_HZ
    });

    Ok(Topology {
        cores: cpus.into_iter().map(|id| CoreInfo { id, socket: socket_of(id) }).collect(),
        family,
        brand,
        threads_per_core: threads,
        tick_rate_hz,
        max_ipc: MAX_IPC,
        memory_traffic_available: false,
        outgoing_qpi_available: false,
    })
}
