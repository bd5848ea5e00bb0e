//! Minimal format: the programmable events of the first core, tab-separated

use super::{IntervalReport, ReportEncoder, ReportRecord};
use crate::domain::ReportError;

#[derive(Debug, Default)]
pub struct SimpleEncoder;

impl SimpleEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ReportEncoder for SimpleEncoder {
    fn encode(&mut self, report: &IntervalReport<'_>) -> Result<Option<ReportRecord>, ReportError> {
        let Some(core) = report.deltas.cores.first() else {
            return Ok(None);
        };

        let line = report
            .mode
            .counter_names()
            .into_iter()
            .map(|name| core.count(name).to_string())
            .collect::<Vec<_>>()
            .join("\t");
        Ok(Some(ReportRecord::new(line)))
    }
}
