//! # Sampling Loop
//!
//! Drives one [`CounterSource`] through the capture, diff, report and rotate
//! cycle until cancelled, a sample limit is hit, or a single-shot command
//! finishes.
//!
//! ## Iteration
//!
//! 1. Wait for the interval, racing cancellation
//! 2. Capture B and stamp it through the drift clock
//! 3. Diff against the previous capture and emit a record (skipped when
//!    there is no previous capture or the interval is defective)
//! 4. Move B into the previous slot
//! 5. Stop, or rotate: reprogram for the next mode and recapture A
//!
//! Every successful `program()` gets exactly one `cleanup()`, including on
//! error paths.

use log::{debug, info, warn};
use std::fmt;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::time::SystemTime;

use super::interval::{IntervalSource, WaitOutcome};
use super::rotator::RotationPolicy;
use super::session::{SamplingSession, SessionStats};
use crate::counters::{CounterSource, DeltaComputer, ScopeSnapshots};
use crate::domain::{SamplingError, ScopeSelection};
use crate::report::{IntervalReport, ReportEncoder};

/// Loop settings
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub interval: IntervalSource,
    pub scopes: ScopeSelection,
    pub policy: RotationPolicy,
    /// Stop after this many intervals
    pub sample_limit: Option<u64>,
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Interrupted,
    SampleLimit,
    CommandFinished,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Interrupted => f.write_str("interrupted"),
            ExitReason::SampleLimit => f.write_str("sample limit reached"),
            ExitReason::CommandFinished => f.write_str("command finished"),
        }
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub reason: ExitReason,
    pub stats: SessionStats,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} intervals, {} records, {} skipped",
            self.reason, self.stats.intervals, self.stats.records, self.stats.skipped
        )
    }
}

/// The sampling driver
pub struct SamplingLoop<S, W> {
    source: S,
    encoder: Box<dyn ReportEncoder>,
    out: W,
    config: LoopConfig,
    computer: DeltaComputer,
}

impl<S: CounterSource, W: Write> SamplingLoop<S, W> {
    pub fn new(source: S, encoder: Box<dyn ReportEncoder>, out: W, config: LoopConfig) -> Self {
        let computer = DeltaComputer::new(source.topology().tick_rate_hz);
        Self { source, encoder, out, config, computer }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Give back the source and the sink
    pub fn into_parts(self) -> (S, W) {
        (self.source, self.out)
    }

    /// Run until cancelled, the sample limit, or command completion.
    ///
    /// # Errors
    /// Fatal programming failures, a failing interval command, and sink
    /// write errors. The counters are released before any error returns.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<RunSummary, SamplingError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut session = SamplingSession::new(self.config.policy.clone());

        let result = self.drive(&mut session, shutdown.as_mut()).await;

        session.running = false;
        if session.programmed {
            self.source.cleanup();
            session.programmed = false;
        }
        let flushed = self.out.flush();

        // A loop failure outranks a failed final flush
        let reason = result?;
        flushed?;
        info!("Sampling stopped ({reason})");
        Ok(RunSummary { reason, stats: session.stats })
    }

    async fn drive<F>(
        &mut self,
        session: &mut SamplingSession,
        mut shutdown: Pin<&mut F>,
    ) -> Result<ExitReason, SamplingError>
    where
        F: Future<Output = ()>,
    {
        self.program(session)?;
        session.previous = self.capture();
        session.running = true;

        let mut reason = ExitReason::Interrupted;
        while session.running {
            let outcome = self.config.interval.wait(shutdown.as_mut()).await?;
            session.stats.intervals += 1;

            match self.source.capture_all(self.config.scopes) {
                Ok(current) => {
                    self.report(session, &current)?;
                    session.previous = Some(current);
                }
                Err(e) => {
                    warn!("Capture failed, skipping interval: {e}");
                    session.stats.skipped += 1;
                }
            }

            if let Some(stop) = self.stop_reason(outcome, &session.stats) {
                reason = stop;
                session.running = false;
            } else if session.rotator.advance() {
                debug!("Rotating to {}", session.rotator.current());
                self.source.cleanup();
                session.programmed = false;
                session.previous = None;
                self.program(session)?;
                session.previous = self.capture();
            }
        }
        Ok(reason)
    }

    /// Why the loop should stop after this interval, if it should
    fn stop_reason(&self, outcome: WaitOutcome, stats: &SessionStats) -> Option<ExitReason> {
        if outcome == WaitOutcome::Cancelled {
            Some(ExitReason::Interrupted)
        } else if self.config.interval.is_single_shot() {
            Some(ExitReason::CommandFinished)
        } else if self.config.sample_limit.is_some_and(|limit| stats.intervals >= limit) {
            Some(ExitReason::SampleLimit)
        } else {
            None
        }
    }

    fn program(&mut self, session: &mut SamplingSession) -> Result<(), SamplingError> {
        if !session.programmed {
            self.source.program(session.rotator.current())?;
            session.programmed = true;
        }
        Ok(())
    }

    /// Capture A after (re)programming; a failure leaves no previous capture
    fn capture(&mut self) -> Option<ScopeSnapshots> {
        self.source
            .capture_all(self.config.scopes)
            .map_err(|e| warn!("Initial capture failed: {e}"))
            .ok()
    }

    fn report(&mut self, session: &mut SamplingSession, current: &ScopeSnapshots) -> Result<(), SamplingError> {
        let wall = current.taken_at().map_or_else(SystemTime::now, |t| t.wall);
        let process_ms = session.process_ms();
        let stamp = session.clock.stamp(wall, process_ms);

        let Some(previous) = session.previous.as_ref() else {
            debug!("No previous capture, nothing to report");
            session.stats.skipped += 1;
            return Ok(());
        };

        let deltas = match self.computer.diff_all(previous, current) {
            Ok(deltas) => deltas,
            Err(e) => {
                debug!("Skipping interval: {e}");
                session.stats.skipped += 1;
                return Ok(());
            }
        };

        let report = IntervalReport {
            stamp,
            duration_ms: deltas.elapsed_wall_ms(),
            mode: session.rotator.current(),
            deltas: &deltas,
        };
        match self.encoder.encode(&report)? {
            Some(record) => {
                record.write_to(&mut self.out)?;
                self.out.flush()?;
                session.stats.records += 1;
            }
            None => session.stats.skipped += 1,
        }
        Ok(())
    }
}
