//! JSON lines: one object per interval with the derived metrics of every scope

use serde::Serialize;
use std::collections::BTreeMap;

use super::{IntervalReport, ReportEncoder, ReportRecord};
use crate::counters::{CounterDelta, MetricValue, Topology};
use crate::domain::{ReportError, Scope};
use crate::sampling::WallStamp;

#[derive(Debug, Serialize)]
struct ScopeMetrics<'a> {
    scope: Scope,
    exec: f64,
    ipc: f64,
    core_ipc: f64,
    freq: f64,
    afreq: f64,
    l3_miss: u64,
    l2_miss: u64,
    l3_hit: u64,
    l2_hit: u64,
    l3_hit_ratio: f64,
    l2_hit_ratio: f64,
    l3_clk: f64,
    l2_clk: f64,
    tlb_miss: u64,
    tlb_clk: f64,
    read_gib: MetricValue,
    write_gib: MetricValue,
    bandwidth: MetricValue,
    qpi_in_mib: MetricValue,
    qpi_out_mib: MetricValue,
    qpi_to_mc: MetricValue,
    thermal_headroom: Option<i32>,
    counters: &'a BTreeMap<String, i64>,
}

impl<'a> ScopeMetrics<'a> {
    fn new(delta: &'a CounterDelta, topology: &Topology) -> Self {
        Self {
            scope: delta.scope(),
            exec: delta.exec_usage(),
            ipc: delta.ipc(),
            core_ipc: delta.core_ipc(topology.threads_per_core),
            freq: delta.relative_frequency(),
            afreq: delta.active_relative_frequency(),
            l3_miss: delta.l3_misses(),
            l2_miss: delta.l2_misses(),
            l3_hit: delta.l3_hits(),
            l2_hit: delta.l2_hits(),
            l3_hit_ratio: delta.l3_hit_ratio(),
            l2_hit_ratio: delta.l2_hit_ratio(),
            l3_clk: delta.cycles_lost_l3_misses(),
            l2_clk: delta.cycles_lost_l2_misses(),
            tlb_miss: delta.tlb_misses(),
            tlb_clk: delta.tlb_miss_cycles(),
            read_gib: delta.bytes_read_gib(),
            write_gib: delta.bytes_written_gib(),
            bandwidth: delta.memory_bandwidth(),
            qpi_in_mib: delta.qpi_incoming_mib(),
            qpi_out_mib: delta.qpi_outgoing_mib(),
            qpi_to_mc: delta.qpi_to_mc_ratio(),
            thermal_headroom: delta.thermal_headroom(),
            counters: delta.values(),
        }
    }
}

#[derive(Debug, Serialize)]
struct IntervalLine<'a> {
    time: WallStamp,
    duration_ms: u64,
    mode: &'static str,
    events: Vec<&'static str>,
    system: Option<ScopeMetrics<'a>>,
    sockets: Vec<ScopeMetrics<'a>>,
    cores: Vec<ScopeMetrics<'a>>,
}

#[derive(Debug)]
pub struct JsonEncoder {
    topology: Topology,
}

impl JsonEncoder {
    #[must_use]
    pub fn new(topology: Topology) -> Self {
        Self { topology }
    }
}

impl ReportEncoder for JsonEncoder {
    fn encode(&mut self, report: &IntervalReport<'_>) -> Result<Option<ReportRecord>, ReportError> {
        let deltas = report.deltas;
        if deltas.system.is_none() && deltas.sockets.is_empty() && deltas.cores.is_empty() {
            return Ok(None);
        }

        let metrics = |d| ScopeMetrics::new(d, &self.topology);
        let line = IntervalLine {
            time: report.stamp,
            duration_ms: report.duration_ms,
            mode: report.mode.tag(),
            events: report.mode.counter_names(),
            system: deltas.system.as_ref().map(metrics),
            sockets: deltas.sockets.iter().map(metrics).collect(),
            cores: deltas.cores.iter().map(metrics).collect(),
        };
        Ok(Some(ReportRecord::new(serde_json::to_string(&line)?)))
    }
}
