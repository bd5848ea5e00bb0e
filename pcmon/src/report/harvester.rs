//! Harvester trace format
//!
//! One line per interval: `HH:MM:SS:mmm;<duration-ms>;<TAG>;` followed by one
//! fixed-shape group per core. The group layout depends on the event set:
//!
//! | Tag      | Fields                                            |
//! |----------|---------------------------------------------------|
//! | `CACHE`  | IPC;CYCLES;L2MISS;L3MISS;L2HIT;L3HIT;L2CLK;L3CLK  |
//! | `TLB`    | IPC;CYCLES;TLBMISS;TLBCLK                         |
//! | `CUSTOM` | IPC;CYCLES;E0..En                                 |

use pcmon_common::{CUSTOM_EVENT_NAMES, PROGRAMMABLE_COUNTERS};

use super::{Fixed3, IntervalReport, ReportEncoder, ReportRecord, Row};
use crate::counters::CounterDelta;
use crate::domain::ReportError;
use crate::sampling::EventSetMode;

/// Bumped whenever a layout changes
pub const HARVESTER_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Ipc,
    Cycles,
    L2Miss,
    L3Miss,
    L2Hit,
    L3Hit,
    L2Clk,
    L3Clk,
    TlbMiss,
    TlbClk,
    Event(usize),
}

const CACHE_LAYOUT: &[Field] = &[
    Field::Ipc,
    Field::Cycles,
    Field::L2Miss,
    Field::L3Miss,
    Field::L2Hit,
    Field::L3Hit,
    Field::L2Clk,
    Field::L3Clk,
];

const TLB_LAYOUT: &[Field] = &[Field::Ipc, Field::Cycles, Field::TlbMiss, Field::TlbClk];

impl Field {
    fn label(self) -> String {
        match self {
            Field::Ipc => "IPC".into(),
            Field::Cycles => "CYCLES".into(),
            Field::L2Miss => "L2MISS".into(),
            Field::L3Miss => "L3MISS".into(),
            Field::L2Hit => "L2HIT".into(),
            Field::L3Hit => "L3HIT".into(),
            Field::L2Clk => "L2CLK".into(),
            Field::L3Clk => "L3CLK".into(),
            Field::TlbMiss => "TLBMISS".into(),
            Field::TlbClk => "TLBCLK".into(),
            Field::Event(slot) => format!("E{slot}"),
        }
    }

    fn render(self, delta: &CounterDelta, row: &mut Row) {
        match self {
            Field::Ipc => row.push(Fixed3(delta.ipc())),
            Field::Cycles => row.push(delta.cycles()),
            Field::L2Miss => row.push(delta.l2_misses()),
            Field::L3Miss => row.push(delta.l3_misses()),
            Field::L2Hit => row.push(delta.l2_hits()),
            Field::L3Hit => row.push(delta.l3_hits()),
            Field::L2Clk => row.push(Fixed3(delta.cycles_lost_l2_misses())),
            Field::L3Clk => row.push(Fixed3(delta.cycles_lost_l3_misses())),
            Field::TlbMiss => row.push(delta.tlb_misses()),
            Field::TlbClk => row.push(Fixed3(delta.tlb_miss_cycles())),
            Field::Event(slot) => row.push(delta.count(CUSTOM_EVENT_NAMES[slot])),
        }
    }
}

fn layout(mode: &EventSetMode) -> Vec<Field> {
    match mode {
        EventSetMode::Default => CACHE_LAYOUT.to_vec(),
        EventSetMode::Tlb => TLB_LAYOUT.to_vec(),
        EventSetMode::Custom(events) => {
            let mut fields = vec![Field::Ipc, Field::Cycles];
            fields.extend((0..events.len().min(PROGRAMMABLE_COUNTERS)).map(Field::Event));
            fields
        }
    }
}

/// Field labels of one per-core group for `mode`
fn group_labels(mode: &EventSetMode) -> Vec<String> {
    layout(mode).into_iter().map(Field::label).collect()
}

/// One-line description of the per-core groups the rotation will produce,
/// e.g. `Harvester layout v1: CACHE=IPC;CYCLES;... TLB=IPC;CYCLES;TLBMISS;TLBCLK`
#[must_use]
pub fn layout_summary(modes: &[EventSetMode]) -> String {
    let mut summary = format!("Harvester layout v{HARVESTER_FORMAT_VERSION}:");
    let mut seen = Vec::new();
    for mode in modes {
        let group = format!("{}={}", mode.tag(), group_labels(mode).join(";"));
        if !seen.contains(&group) {
            summary.push(' ');
            summary.push_str(&group);
            seen.push(group);
        }
    }
    summary
}

/// Per-core groups tagged with the event set
#[derive(Debug, Default)]
pub struct HarvesterEncoder;

impl HarvesterEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ReportEncoder for HarvesterEncoder {
    fn encode(&mut self, report: &IntervalReport<'_>) -> Result<Option<ReportRecord>, ReportError> {
        if report.deltas.cores.is_empty() {
            return Ok(None);
        }

        let fields = layout(report.mode);
        let mut row = Row::default();
        row.push(report.stamp);
        row.push(report.duration_ms);
        row.push(report.mode.tag());
        for core in &report.deltas.cores {
            for field in &fields {
                field.render(core, &mut row);
            }
        }
        Ok(Some(ReportRecord::new(row.into_string())))
    }
}
