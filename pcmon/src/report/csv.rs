//! Wide CSV table
//!
//! Semicolon-separated. A two-line header (group label per column, then
//! column label) is written once, together with the first data row. Each
//! row holds the time, then the system block, one block per socket and one
//! block per core, for the scopes that are enabled.

use super::{Fixed3, IntervalReport, ReportContext, ReportEncoder, ReportRecord, Row};
use crate::counters::{CounterDelta, MicroarchFamily, ScopeDeltas, Topology};
use crate::domain::{ReportError, Scope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Exec,
    Ipc,
    Freq,
    AFreq,
    L3Miss,
    L2Miss,
    /// L2 misses in Mi-events (reduced table)
    L2MissMi,
    L3Hit,
    L2Hit,
    L3Clk,
    L2Clk,
    L2HitRatio,
    Read,
    Write,
    Inst,
    ACyc,
    Ticks,
    CoreIpc,
    TotalExec,
    MaxIpc,
    QpiIn,
    QpiToMc,
    QpiOut,
    Temp,
}

/// Core and socket metrics, full set
const CORE_FAMILY_COLUMNS: &[Column] = &[
    Column::Exec,
    Column::Ipc,
    Column::Freq,
    Column::AFreq,
    Column::L3Miss,
    Column::L2Miss,
    Column::L3Hit,
    Column::L2Hit,
    Column::L3Clk,
    Column::L2Clk,
];

/// Reduced set for parts without L3 events
const ATOM_FAMILY_COLUMNS: &[Column] =
    &[Column::Exec, Column::Ipc, Column::Freq, Column::L2MissMi, Column::L2HitRatio];

/// System-only totals following the family block
const SYSTEM_TOTAL_COLUMNS: &[Column] = &[
    Column::Inst,
    Column::ACyc,
    Column::Ticks,
    Column::CoreIpc,
    Column::TotalExec,
    Column::MaxIpc,
];

impl Column {
    fn label(self) -> &'static str {
        match self {
            Column::Exec => "EXEC",
            Column::Ipc | Column::CoreIpc => "IPC",
            Column::Freq => "FREQ",
            Column::AFreq => "AFREQ",
            Column::L3Miss => "L3MISS",
            Column::L2Miss | Column::L2MissMi => "L2MISS",
            Column::L3Hit => "L3HIT",
            Column::L2Hit | Column::L2HitRatio => "L2HIT",
            Column::L3Clk => "L3CLK",
            Column::L2Clk => "L2CLK",
            Column::Read => "READ",
            Column::Write => "WRITE",
            Column::Inst | Column::TotalExec => "INST",
            Column::ACyc => "ACYC",
            Column::Ticks => "TICKS",
            Column::MaxIpc => "MAXIPC",
            Column::QpiIn => "TotalQPIin",
            Column::QpiToMc => "QPItoMC",
            Column::QpiOut => "TotalQPIout",
            Column::Temp => "TEMP",
        }
    }

    fn render(self, delta: &CounterDelta, topology: &Topology, row: &mut Row) {
        match self {
            Column::Exec => row.push(Fixed3(delta.exec_usage())),
            Column::Ipc => row.push(Fixed3(delta.ipc())),
            Column::Freq => row.push(Fixed3(delta.relative_frequency())),
            Column::AFreq => row.push(Fixed3(delta.active_relative_frequency())),
            Column::L3Miss => row.push(delta.l3_misses()),
            Column::L2Miss => row.push(delta.l2_misses()),
            Column::L2MissMi => row.push(Fixed3(delta.l2_misses_mi())),
            Column::L3Hit => row.push(delta.l3_hits()),
            Column::L2Hit => row.push(delta.l2_hits()),
            Column::L3Clk => row.push(Fixed3(delta.cycles_lost_l3_misses())),
            Column::L2Clk => row.push(Fixed3(delta.cycles_lost_l2_misses())),
            Column::L2HitRatio => row.push(Fixed3(delta.l2_hit_ratio())),
            Column::Read => row.push(delta.bytes_read_gib()),
            Column::Write => row.push(delta.bytes_written_gib()),
            Column::Inst => row.push(delta.instructions()),
            Column::ACyc => row.push(delta.cycles()),
            Column::Ticks => row.push(delta.elapsed_ticks()),
            Column::CoreIpc => row.push(Fixed3(delta.core_ipc(topology.threads_per_core))),
            Column::TotalExec => row.push(Fixed3(delta.total_exec_usage())),
            Column::MaxIpc => row.push(topology.max_ipc),
            Column::QpiIn => row.push(delta.qpi_incoming_mib()),
            Column::QpiToMc => row.push(delta.qpi_to_mc_ratio()),
            Column::QpiOut => row.push(delta.qpi_outgoing_mib()),
            Column::Temp => match delta.thermal_headroom() {
                Some(headroom) => row.push(headroom),
                None => row.push("N/A"),
            },
        }
    }
}

/// CSV table encoder
#[derive(Debug)]
pub struct CsvEncoder {
    topology: Topology,
    system: Vec<Column>,
    socket: Vec<Column>,
    core: Vec<Column>,
    header_written: bool,
}

impl CsvEncoder {
    #[must_use]
    pub fn new(context: ReportContext) -> Self {
        let topology = context.topology;
        let family = match topology.family {
            MicroarchFamily::Atom => ATOM_FAMILY_COLUMNS,
            MicroarchFamily::Core => CORE_FAMILY_COLUMNS,
        };

        let mut system = family.to_vec();
        if topology.family == MicroarchFamily::Core {
            system.extend([Column::Read, Column::Write]);
        }
        system.extend_from_slice(SYSTEM_TOTAL_COLUMNS);
        // Interconnect traffic only exists between sockets
        if topology.num_sockets() > 1 {
            system.extend([Column::QpiIn, Column::QpiToMc]);
        }
        if topology.outgoing_qpi_available {
            system.push(Column::QpiOut);
        }

        let mut core = family.to_vec();
        if topology.family == MicroarchFamily::Atom {
            core.push(Column::Temp);
        }

        Self { topology, system, socket: family.to_vec(), core, header_written: false }
    }

    fn columns(&self, scope: Scope) -> &[Column] {
        match scope {
            Scope::System => &self.system,
            Scope::Socket(_) => &self.socket,
            Scope::Core(_) => &self.core,
        }
    }

    fn group_label(&self, scope: Scope) -> String {
        match scope {
            Scope::System => "SYSTEM".to_string(),
            Scope::Socket(socket) => format!("SKT{}", socket.0),
            Scope::Core(core) => {
                let socket = self.topology.socket_of(core).map_or(0, |s| s.0);
                format!("C{}@S{socket}", core.0)
            }
        }
    }

    /// Deltas in column order: system, sockets, cores
    fn blocks<'a>(deltas: &'a ScopeDeltas) -> impl Iterator<Item = &'a CounterDelta> {
        deltas.system.iter().chain(&deltas.sockets).chain(&deltas.cores)
    }

    fn header(&self, deltas: &ScopeDeltas) -> String {
        let mut groups = Row::default();
        let mut labels = Row::default();
        groups.push("SYSTEM");
        labels.push("TIME");

        for delta in Self::blocks(deltas) {
            let columns = self.columns(delta.scope());
            let group = self.group_label(delta.scope());
            groups.extend(columns.iter().map(|_| &group));
            labels.extend(columns.iter().map(|c| c.label()));
        }

        format!("{}\n{}\n", groups.into_string(), labels.into_string())
    }
}

impl ReportEncoder for CsvEncoder {
    fn encode(&mut self, report: &IntervalReport<'_>) -> Result<Option<ReportRecord>, ReportError> {
        let deltas = report.deltas;
        if Self::blocks(deltas).next().is_none() {
            return Ok(None);
        }

        let mut row = Row::default();
        row.push(report.stamp);
        for delta in Self::blocks(deltas) {
            for column in self.columns(delta.scope()) {
                column.render(delta, &self.topology, &mut row);
            }
        }

        let mut text = String::new();
        if !self.header_written {
            text.push_str(&self.header(deltas));
            self.header_written = true;
        }
        text.push_str(&row.into_string());
        Ok(Some(ReportRecord::new(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScopeSelection;
    use crate::report::test_support::{deltas, stamp};
    use crate::sampling::EventSetMode;
    use pcmon_common::names;

    fn encoder(topology: Topology) -> CsvEncoder {
        CsvEncoder::new(ReportContext { topology, scopes: ScopeSelection::all() })
    }

    fn single_socket(cores: u32) -> Topology {
        let mut topology = Topology::synthetic(cores, 1);
        topology.memory_traffic_available = false;
        topology
    }

    fn encode(encoder: &mut CsvEncoder, deltas: &ScopeDeltas) -> Option<String> {
        let report =
            IntervalReport { stamp: stamp(), duration_ms: 25, mode: &EventSetMode::Default, deltas };
        encoder.encode(&report).unwrap().map(|r| r.as_str().to_string())
    }

    #[test]
    fn test_header_exactly_once() {
        let mut csv = encoder(single_socket(1));
        let deltas = deltas(&[(names::INSTRUCTIONS, 500), (names::CYCLES, 1_000)], 1);

        let first = encode(&mut csv, &deltas).unwrap();
        let lines: Vec<&str> = first.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("SYSTEM;SYSTEM;"));
        assert!(lines[1].starts_with("TIME;EXEC;IPC;FREQ;AFREQ;L3MISS;L2MISS;L3HIT;L2HIT;L3CLK;L2CLK;READ;WRITE;"));
        assert!(lines[1].contains("INST;ACYC;TICKS;IPC;INST;MAXIPC;"));
        assert!(lines[2].starts_with("12:00:01:250;"));

        let second = encode(&mut csv, &deltas).unwrap();
        assert_eq!(second.lines().count(), 1);
    }

    #[test]
    fn test_header_and_row_have_same_width() {
        let mut csv = encoder(single_socket(2));
        let deltas = deltas(&[(names::INSTRUCTIONS, 500), (names::CYCLES, 1_000)], 2);
        let text = encode(&mut csv, &deltas).unwrap();
        let widths: Vec<usize> = text.lines().map(|l| l.split(';').count()).collect();
        assert_eq!(widths[0], widths[1]);
        assert_eq!(widths[1], widths[2]);

        let groups = text.lines().next().unwrap();
        assert!(groups.contains("SKT0;"));
        assert!(groups.contains("C1@S0;"));
    }

    #[test]
    fn test_system_block_values() {
        let mut csv = encoder(single_socket(1));
        let deltas = deltas(
            &[
                (names::INSTRUCTIONS, 500),
                (names::CYCLES, 1_000),
                (names::REF_CYCLES, 800),
                (names::L3_MISS, 2),
                (names::L3_HIT, 20),
            ],
            1,
        );
        let text = encode(&mut csv, &deltas).unwrap();
        let row: Vec<&str> = text.lines().nth(2).unwrap().split(';').collect();

        // TIME, then EXEC IPC FREQ AFREQ over 1000 ticks on one core
        assert_eq!(&row[..5], ["12:00:01:250", "0.500", "0.500", "1.000", "1.250"]);
        // L3MISS L2MISS (fallback to l3 lookups) L3HIT L2HIT
        assert_eq!(&row[5..9], ["2", "22", "20", "0"]);
        // READ/WRITE unavailable
        assert_eq!(&row[11..13], ["N/A", "N/A"]);
        // INST ACYC TICKS IPC INST MAXIPC
        assert_eq!(&row[13..19], ["500", "1000", "1000", "0.500", "0.500", "4"]);
    }

    #[test]
    fn test_atom_family_reduced_set() {
        let mut topology = single_socket(1);
        topology.family = MicroarchFamily::Atom;
        let mut csv = encoder(topology);
        let deltas = deltas(&[(names::CYCLES, 1_000), (names::L2_HIT, 3), (names::L2_MISS, 1)], 1);
        let scaled = crate::report::test_support::deltas(&[(names::L2_MISS, 1_572_864)], 1);
        let text = encode(&mut csv, &deltas).unwrap();
        let labels = text.lines().nth(1).unwrap();
        assert!(labels.starts_with("TIME;EXEC;IPC;FREQ;L2MISS;L2HIT;INST;"));
        assert!(labels.ends_with("EXEC;IPC;FREQ;L2MISS;L2HIT;TEMP;"));
        assert!(!labels.contains("READ"));

        let row = text.lines().nth(2).unwrap();
        // Core L2 misses in Mi-events, L2 hit ratio 3 / (3 + 1), then unknown temperature
        assert!(row.ends_with(";0.000;0.750;N/A;"));

        // 1.5 Mi misses
        let row = encode(&mut csv, &scaled).unwrap();
        let system: Vec<&str> = row.split(';').collect();
        assert_eq!(system[4], "1.500");
    }

    #[test]
    fn test_qpi_columns_on_multi_socket() {
        let topology = Topology::synthetic(2, 2);
        let csv = encoder(topology);
        assert!(csv.system.contains(&Column::QpiIn));
        assert!(csv.system.contains(&Column::QpiOut));
        assert!(csv.system.contains(&Column::Read));
    }

    #[test]
    fn test_no_data_no_header() {
        let mut csv = encoder(single_socket(1));
        let empty = ScopeDeltas::default();
        assert!(encode(&mut csv, &empty).is_none());
        assert!(!csv.header_written);
    }
}
