//! # Report Encoders
//!
//! Turn one interval's [`ScopeDeltas`] into text.
//!
//! ## Formats
//!
//! - [`SimpleEncoder`] - core 0's four programmable events, tab-separated
//! - [`CsvEncoder`] - wide semicolon-separated table with a two-line header
//! - [`HarvesterEncoder`] - compact per-core groups tagged with the event set
//! - [`JsonEncoder`] - one JSON object per interval
//!
//! Every encoder treats "no data" as a silent skip and returns `Ok(None)`.
//! The CSV and Harvester layouts are a persisted contract: the semicolon
//! delimiter and the field order must not change.

mod csv;
mod harvester;
mod json;
mod simple;

pub use csv::CsvEncoder;
pub use harvester::{layout_summary as harvester_layout_summary, HarvesterEncoder};
pub use json::JsonEncoder;
pub use simple::SimpleEncoder;

use std::fmt;
use std::io::Write;

use crate::counters::{ScopeDeltas, Topology};
use crate::domain::{ReportError, ScopeSelection};
use crate::sampling::{EventSetMode, WallStamp};

/// Everything an encoder sees for one interval
#[derive(Debug, Clone, Copy)]
pub struct IntervalReport<'a> {
    pub stamp: WallStamp,
    pub duration_ms: u64,
    /// Event set that was programmed while the interval ran
    pub mode: &'a EventSetMode,
    pub deltas: &'a ScopeDeltas,
}

/// Rendered output for one interval, newline-terminated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRecord(String);

impl ReportRecord {
    #[must_use]
    pub fn new(mut text: String) -> Self {
        if !text.ends_with('\n') {
            text.push('\n');
        }
        Self(text)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.0.lines()
    }

    /// # Errors
    /// Propagates sink write failures
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_all(self.0.as_bytes())
    }
}

impl fmt::Display for ReportRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Renders interval deltas into text records
pub trait ReportEncoder {
    /// Encode one interval. `Ok(None)` means nothing to emit.
    ///
    /// # Errors
    /// Returns [`ReportError`] if serialization fails
    fn encode(&mut self, report: &IntervalReport<'_>) -> Result<Option<ReportRecord>, ReportError>;
}

/// Selectable output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportFormat {
    /// Core 0 programmable events, tab-separated
    Simple,
    /// Semicolon-separated table with a two-line header
    Csv,
    /// Per-core groups tagged with the active event set
    #[default]
    Harvester,
    /// JSON lines
    Json,
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportFormat::Simple => "simple",
            ReportFormat::Csv => "csv",
            ReportFormat::Harvester => "harvester",
            ReportFormat::Json => "json",
        };
        f.write_str(name)
    }
}

/// Machine facts encoders need besides the deltas
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub topology: Topology,
    pub scopes: ScopeSelection,
}

/// Build the encoder for `format`
#[must_use]
pub fn encoder_for(format: ReportFormat, context: ReportContext) -> Box<dyn ReportEncoder> {
    match format {
        ReportFormat::Simple => Box::new(SimpleEncoder::new()),
        ReportFormat::Csv => Box::new(CsvEncoder::new(context)),
        ReportFormat::Harvester => Box::new(HarvesterEncoder::new()),
        ReportFormat::Json => Box::new(JsonEncoder::new(context.topology)),
    }
}

/// Semicolon-terminated field list, the shape shared by CSV and Harvester rows
#[derive(Debug, Default)]
pub(crate) struct Row(String);

impl Row {
    pub(crate) fn push(&mut self, field: impl fmt::Display) {
        use fmt::Write as _;
        // Writing into a String cannot fail
        let _ = write!(self.0, "{field};");
    }

    pub(crate) fn extend<I, T>(&mut self, fields: I)
    where
        I: IntoIterator<Item = T>,
        T: fmt::Display,
    {
        for field in fields {
            self.push(field);
        }
    }

    pub(crate) fn into_string(self) -> String {
        self.0
    }
}

/// Ratio formatting shared by the text encoders: three decimals
pub(crate) struct Fixed3(pub f64);

impl fmt::Display for Fixed3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::{Duration, SystemTime};

    use crate::counters::{CounterMap, CounterSnapshot, DeltaComputer, ScopeDeltas, ScopeSnapshots, Timestamp};
    use crate::domain::{CoreId, Scope, SocketId};
    use crate::sampling::WallStamp;

    pub fn stamp() -> WallStamp {
        WallStamp { hour: 12, minute: 0, second: 1, milli: 250 }
    }

    fn snapshot(scope: Scope, ticks: u64, wall_ms: u64, values: &[(&str, u64)], cores: u32) -> CounterSnapshot {
        let counters: CounterMap = values.iter().map(|(k, v)| ((*k).to_string(), *v)).collect();
        let at = Timestamp::new(SystemTime::UNIX_EPOCH + Duration::from_millis(wall_ms), ticks);
        CounterSnapshot::new(scope, counters, at).with_core_count(cores)
    }

    /// One interval of 1000 ticks over `values` (start at zero) for
    /// `cores` cores on one socket, with matching socket and system scopes.
    pub fn deltas(values: &[(&str, u64)], cores: u32) -> ScopeDeltas {
        let zero: Vec<(&str, u64)> = values.iter().map(|(k, _)| (*k, 0)).collect();
        let capture = |ticks, wall_ms, vals: &[(&str, u64)]| ScopeSnapshots {
            system: Some(snapshot(Scope::System, ticks, wall_ms, vals, cores)),
            sockets: vec![snapshot(Scope::Socket(SocketId(0)), ticks, wall_ms, vals, cores)],
            cores: (0..cores)
                .map(|id| snapshot(Scope::Core(CoreId(id)), ticks, wall_ms, vals, 1))
                .collect(),
        };
        let prev = capture(1_000, 10_000, &zero);
        let curr = capture(2_000, 10_025, values);
        DeltaComputer::new(1_000).diff_all(&prev, &curr).unwrap()
    }
}
