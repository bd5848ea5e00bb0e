use pcmon::counters::{roll_up, CounterMap, CounterSnapshot, CounterSource, ScopeSnapshots, Timestamp, Topology};
use pcmon::domain::{CaptureError, CoreId, ProgramError, SamplingError, Scope, ScopeSelection};
use pcmon::report::{encoder_for, ReportContext, ReportFormat};
use pcmon::sampling::{
    EventDescriptor, EventSetMode, ExitReason, IntervalSource, LoopConfig, RotationPolicy, SamplingLoop,
};
use pcmon_common::names;
use std::future::pending;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Program(EventSetMode),
    Cleanup,
}

/// Scripted counter source that records every program/cleanup call
struct RecordingSource {
    topology: Topology,
    programmed: Option<EventSetMode>,
    programs: Vec<EventSetMode>,
    cleanups: usize,
    calls: Vec<Call>,
    /// Wall time reported by every capture instead of the real clock
    frozen_wall: Option<SystemTime>,
    ticks: u64,
    value: u64,
    step: u64,
    /// Program call (1-based) that fails with ResourceBusy
    busy_on_program: Option<usize>,
    /// Capture calls (1-based) that fail
    failing_captures: Vec<usize>,
    captures: usize,
}

impl RecordingSource {
    fn new(cores: u32) -> Self {
        Self {
            topology: Topology::synthetic(cores, 1),
            programmed: None,
            programs: Vec::new(),
            cleanups: 0,
            calls: Vec::new(),
            frozen_wall: None,
            ticks: 1_000,
            value: 0,
            step: 1_000,
            busy_on_program: None,
            failing_captures: Vec::new(),
            captures: 0,
        }
    }

    fn starting_at(mut self, value: u64, step: u64) -> Self {
        self.value = value;
        self.step = step;
        self
    }
}

impl CounterSource for RecordingSource {
    fn topology(&self) -> &Topology {
        &self.topology
    }

    fn program(&mut self, mode: &EventSetMode) -> Result<(), ProgramError> {
        assert!(self.programmed.is_none(), "program() without cleanup()");
        if self.busy_on_program == Some(self.programs.len() + 1) {
            return Err(ProgramError::ResourceBusy);
        }
        self.programs.push(mode.clone());
        self.calls.push(Call::Program(mode.clone()));
        self.programmed = Some(mode.clone());
        Ok(())
    }

    fn cleanup(&mut self) {
        assert!(self.programmed.is_some(), "cleanup() without program()");
        self.programmed = None;
        self.cleanups += 1;
        self.calls.push(Call::Cleanup);
    }

    fn capture_all(&mut self, scopes: ScopeSelection) -> Result<ScopeSnapshots, CaptureError> {
        self.captures += 1;
        let mode = self.programmed.clone().ok_or(CaptureError::NotProgrammed)?;
        if self.failing_captures.contains(&self.captures) {
            return Err(CaptureError::ReadFailed {
                core: CoreId(0),
                counter: names::CYCLES.to_string(),
                error: std::io::Error::other("counter vanished"),
            });
        }

        let taken_at = Timestamp::new(self.frozen_wall.unwrap_or_else(SystemTime::now), self.ticks);
        let mut values = CounterMap::new();
        for name in [names::INSTRUCTIONS, names::CYCLES, names::REF_CYCLES].into_iter().chain(mode.counter_names()) {
            values.insert(name.to_string(), self.value);
        }
        let cores = self
            .topology
            .cores
            .iter()
            .map(|core| CounterSnapshot::new(Scope::Core(core.id), values.clone(), taken_at))
            .collect();

        self.ticks += 1_000;
        self.value = self.value.wrapping_add(self.step);
        Ok(roll_up(&self.topology, cores, taken_at, scopes))
    }

    fn monotonic_ticks(&self) -> u64 {
        self.ticks
    }
}

fn config(interval: IntervalSource, limit: Option<u64>) -> LoopConfig {
    LoopConfig { interval, scopes: ScopeSelection::all(), policy: RotationPolicy::default(), sample_limit: limit }
}

fn every_ms(ms: u64) -> IntervalSource {
    IntervalSource::FixedDelay(Duration::from_millis(ms))
}

fn sampler(
    source: RecordingSource,
    format: ReportFormat,
    config: LoopConfig,
) -> SamplingLoop<RecordingSource, Vec<u8>> {
    let context = ReportContext { topology: source.topology().clone(), scopes: config.scopes };
    SamplingLoop::new(source, encoder_for(format, context), Vec::new(), config)
}

fn output(sampler: SamplingLoop<RecordingSource, Vec<u8>>) -> (RecordingSource, String) {
    let (source, out) = sampler.into_parts();
    (source, String::from_utf8(out).expect("utf-8 output"))
}

fn fields(line: &str) -> Vec<&str> {
    line.trim_end_matches(';').split(';').collect()
}

#[tokio::test(start_paused = true)]
async fn test_harvester_alternates_cache_and_tlb() {
    let mut sampler = sampler(RecordingSource::new(2), ReportFormat::Harvester, config(every_ms(25), Some(4)));
    let summary = sampler.run(pending::<()>()).await.unwrap();
    assert_eq!(summary.reason, ExitReason::SampleLimit);

    let (_, text) = output(sampler);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);

    for (idx, line) in lines.iter().enumerate() {
        let fields = fields(line);
        let (tag, per_core) = if idx % 2 == 0 { ("CACHE", 8) } else { ("TLB", 4) };
        assert_eq!(fields[2], tag, "line {idx}: {line}");
        assert_eq!(fields.len(), 3 + 2 * per_core, "line {idx}: {line}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_counter_wrap_reports_modular_delta() {
    let source = RecordingSource::new(1).starting_at(0xFFFF_FFFF_FFFF_FFF0, 0x20);
    let mut sampler = sampler(source, ReportFormat::Harvester, config(every_ms(25), Some(1)));
    sampler.run(pending::<()>()).await.unwrap();

    let (_, text) = output(sampler);
    let line = text.lines().next().expect("one record");
    // CYCLES of core 0 went from 0xFFFF_FFFF_FFFF_FFF0 to 0x10
    assert_eq!(fields(line)[4], "32");
    assert_eq!(fields(line)[3], "1.000");
}

#[tokio::test(start_paused = true)]
async fn test_no_previous_snapshot_emits_nothing() {
    let mut source = RecordingSource::new(1);
    // The capture right after programming fails, so the first interval has no baseline
    source.failing_captures = vec![1];
    let mut sampler = sampler(source, ReportFormat::Simple, config(every_ms(25), Some(1)));

    let summary = sampler.run(pending::<()>()).await.unwrap();
    assert_eq!(summary.stats.records, 0);
    assert_eq!(summary.stats.skipped, 1);

    let (_, text) = output(sampler);
    assert!(text.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_capture_skips_interval_and_keeps_baseline() {
    let mut source = RecordingSource::new(1);
    source.failing_captures = vec![2];
    let mut sampler = sampler(source, ReportFormat::Harvester, config(every_ms(25), Some(2)));

    let summary = sampler.run(pending::<()>()).await.unwrap();
    assert_eq!(summary.stats.intervals, 2);
    assert_eq!(summary.stats.skipped, 1);
    assert_eq!(summary.stats.records, 1);
}

#[tokio::test(start_paused = true)]
async fn test_program_cleanup_pairing_over_five_intervals() {
    let mut sampler = sampler(RecordingSource::new(2), ReportFormat::Csv, config(every_ms(10), Some(5)));
    sampler.run(pending::<()>()).await.unwrap();

    let (source, text) = output(sampler);
    assert_eq!(source.programs.len(), 5);
    assert_eq!(source.cleanups, source.programs.len());
    assert!(source.programmed.is_none());
    // Modes are re-entered in rotation order
    assert_eq!(source.programs[0], EventSetMode::Default);
    assert_eq!(source.programs[1], EventSetMode::Tlb);
    assert_eq!(source.programs[4], EventSetMode::Default);

    // Two header lines, then one row per interval
    assert_eq!(text.lines().count(), 2 + 5);
    assert_eq!(text.lines().filter(|l| l.starts_with("TIME;")).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_mid_loop_releases_counters() {
    let mut sampler = sampler(RecordingSource::new(1), ReportFormat::Harvester, config(every_ms(10), None));
    let summary = sampler.run(tokio::time::sleep(Duration::from_millis(35))).await.unwrap();

    assert_eq!(summary.reason, ExitReason::Interrupted);
    assert_eq!(summary.stats.intervals, 4);

    let (source, _) = output(sampler);
    assert_eq!(source.cleanups, source.programs.len());
    assert!(source.programmed.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reprogram_failure_is_fatal_and_balanced() {
    let mut source = RecordingSource::new(1);
    source.busy_on_program = Some(2);
    let mut sampler = sampler(source, ReportFormat::Harvester, config(every_ms(10), None));

    let err = sampler.run(pending::<()>()).await.unwrap_err();
    assert!(matches!(err, SamplingError::Program(ProgramError::ResourceBusy)));

    let (source, text) = output(sampler);
    assert_eq!(source.programs.len(), 1);
    assert_eq!(source.cleanups, 1);
    assert_eq!(text.lines().count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_single_mode_policy_never_reprograms() {
    let mut cfg = config(every_ms(10), Some(3));
    cfg.policy = RotationPolicy::single(EventSetMode::Tlb);
    let mut sampler = sampler(RecordingSource::new(1), ReportFormat::Harvester, cfg);
    sampler.run(pending::<()>()).await.unwrap();

    let (source, text) = output(sampler);
    assert_eq!(source.programs, [EventSetMode::Tlb]);
    assert_eq!(source.cleanups, 1);
    assert!(text.lines().all(|l| l.contains(";TLB;")));
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_interval_is_single_shot() {
    let mut sampler = sampler(
        RecordingSource::new(1),
        ReportFormat::Harvester,
        config(IntervalSource::RunToCompletion("true".to_string()), None),
    );
    let summary = sampler.run(pending::<()>()).await.unwrap();
    assert_eq!(summary.reason, ExitReason::CommandFinished);
    assert_eq!(summary.stats.records, 1);

    let (source, _) = output(sampler);
    assert_eq!(source.programs.len(), 1);
    assert_eq!(source.cleanups, 1);
}

#[tokio::test(start_paused = true)]
async fn test_custom_events_resubmitted_on_every_entry() {
    let custom = EventSetMode::Custom(vec![
        EventDescriptor { event: 0x2e, umask: 0x41 },
        EventDescriptor { event: 0x3c, umask: 0x00 },
    ]);
    let mut cfg = config(every_ms(10), Some(5));
    cfg.policy = RotationPolicy::new(vec![EventSetMode::Default, custom.clone()]).unwrap();
    let mut sampler = sampler(RecordingSource::new(1), ReportFormat::Harvester, cfg);
    sampler.run(pending::<()>()).await.unwrap();

    let (source, text) = output(sampler);
    assert_eq!(
        source.programs,
        [EventSetMode::Default, custom.clone(), EventSetMode::Default, custom.clone(), EventSetMode::Default]
    );

    // Every program after the first is preceded by a cleanup, and the run ends with one
    let mut expected = Vec::new();
    for mode in &source.programs {
        if !expected.is_empty() {
            expected.push(Call::Cleanup);
        }
        expected.push(Call::Program(mode.clone()));
    }
    expected.push(Call::Cleanup);
    assert_eq!(source.calls, expected);

    let tags: Vec<&str> = text.lines().map(|l| fields(l)[2]).collect();
    assert_eq!(tags, ["CACHE", "CUSTOM", "CACHE", "CUSTOM", "CACHE"]);
    // IPC;CYCLES;E0;E1 per core for the custom set
    assert_eq!(fields(text.lines().nth(1).unwrap()).len(), 3 + 4);
}

#[tokio::test(start_paused = true)]
async fn test_stamps_non_decreasing_within_one_wall_second() {
    let mut source = RecordingSource::new(1);
    source.frozen_wall = Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000));
    let mut cfg = config(every_ms(10), Some(4));
    cfg.policy = RotationPolicy::single(EventSetMode::Default);
    let mut sampler = sampler(source, ReportFormat::Harvester, cfg);
    sampler.run(pending::<()>()).await.unwrap();

    let (_, text) = output(sampler);
    let stamps: Vec<&str> = text.lines().map(|l| fields(l)[0]).collect();
    assert_eq!(stamps.len(), 4);

    let seconds: Vec<&str> = stamps.iter().map(|s| &s[..8]).collect();
    assert!(seconds.windows(2).all(|w| w[0] == w[1]), "{stamps:?}");

    let millis: Vec<u32> = stamps.iter().map(|s| s[9..].parse().unwrap()).collect();
    // Paused time advances exactly one interval between reports
    assert_eq!(millis, [0, 10, 20, 30]);
}
