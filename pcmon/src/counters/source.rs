//! The counter acquisition seam
//!
//! The sampling engine never touches hardware directly. Everything it needs
//! from the PMU goes through [`CounterSource`]: programming an event set,
//! releasing it, and reading every counter at once.

use super::snapshot::{CounterSnapshot, ScopeSnapshots, Timestamp};
use super::topology::Topology;
use crate::domain::{CaptureError, ProgramError, Scope, ScopeSelection};
use crate::sampling::EventSetMode;

/// Access to a machine's performance counters.
///
/// Counters are a scarce, process-wide resource. Every successful
/// [`program`](CounterSource::program) must be followed by exactly one
/// [`cleanup`](CounterSource::cleanup) before the source is programmed again.
pub trait CounterSource {
    /// Machine layout and capability flags
    fn topology(&self) -> &Topology;

    /// Program the PMU to count the events of `mode`.
    ///
    /// # Errors
    /// [`ProgramError::AccessDenied`] and [`ProgramError::ResourceBusy`] are fatal
    /// for the session; the source is left unprogrammed on any error.
    fn program(&mut self, mode: &EventSetMode) -> Result<(), ProgramError>;

    /// Release whatever [`program`](CounterSource::program) acquired
    fn cleanup(&mut self);

    /// Read every counter for the enabled scopes.
    ///
    /// # Errors
    /// Any read failure; the engine skips the interval and keeps going.
    fn capture_all(&mut self, scopes: ScopeSelection) -> Result<ScopeSnapshots, CaptureError>;

    /// Current value of the monotonic tick counter
    fn monotonic_ticks(&self) -> u64;

    /// Forcibly reset PMU state held by other consumers.
    ///
    /// Destructive and global; only ever called after operator confirmation.
    ///
    /// # Errors
    /// Returns an error if the reset could not be performed.
    fn reset_pmu(&mut self) -> Result<(), ProgramError> {
        Ok(())
    }
}

/// Build socket and system snapshots by summing per-core snapshots.
///
/// Cores are grouped by the socket the topology assigns them. Scopes that are
/// not selected are left empty, including the per-core list itself.
#[must_use]
pub fn roll_up(
    topology: &Topology,
    cores: Vec<CounterSnapshot>,
    taken_at: Timestamp,
    scopes: ScopeSelection,
) -> ScopeSnapshots {
    let sockets = if scopes.sockets {
        topology
            .sockets()
            .into_iter()
            .map(|socket| {
                let parts = cores.iter().filter(|snap| {
                    matches!(snap.scope(), Scope::Core(id) if topology.socket_of(id) == Some(socket))
                });
                CounterSnapshot::aggregate(Scope::Socket(socket), taken_at, parts)
            })
            .collect()
    } else {
        Vec::new()
    };

    let system = scopes
        .system
        .then(|| CounterSnapshot::aggregate(Scope::System, taken_at, &cores));

    ScopeSnapshots { system, sockets, cores: if scopes.cores { cores } else { Vec::new() } }
}
