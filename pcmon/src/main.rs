//! # pcmon - Main Entry Point
//!
//! Parses the command line, picks a counter source (perf_event on Linux, or
//! the simulator with `--simulate`) and runs the sampling loop until Ctrl+C,
//! SIGTERM, the sample limit, or completion of the measured command.
//!
//! Records go to stdout (or `--output`); the banner, diagnostics and the exit
//! summary go to stderr.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use log::{info, warn};
use std::fs::File;
use std::future::Future;
use std::io::{self, BufRead, BufWriter, Write};

use pcmon::cli::{normalize_legacy_flags, Args, UsageError};
use pcmon::counters::simulated::DEFAULT_SEED;
use pcmon::counters::{CounterSource, SimulatedCounterSource, Topology};
use pcmon::domain::{PreflightError, ProgramError, SamplingError};
use pcmon::report::{encoder_for, harvester_layout_summary, ReportContext, ReportFormat};
use pcmon::sampling::{LoopConfig, SamplingLoop};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = -1;
const EXIT_NOPERM: i32 = -1;

fn main() {
    env_logger::init();

    let args = match Args::try_parse_from(normalize_legacy_flags(std::env::args())) {
        Ok(args) => args,
        Err(e) => {
            // Help and usage errors share the legacy exit code
            let _ = e.print();
            std::process::exit(if e.kind() == ErrorKind::DisplayVersion { EXIT_SUCCESS } else { EXIT_USAGE });
        }
    };

    std::process::exit(match run(&args) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<UsageError>().is_some() {
        return EXIT_USAGE;
    }
    if let Some(PreflightError::PermissionDenied { .. }) = err.downcast_ref::<PreflightError>() {
        return EXIT_NOPERM;
    }
    match err.downcast_ref::<SamplingError>() {
        Some(SamplingError::Program(ProgramError::AccessDenied | ProgramError::ResourceBusy)) => EXIT_NOPERM,
        _ => EXIT_ERROR,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn run(args: &Args) -> Result<()> {
    if args.simulate {
        let topology = Topology::synthetic(args.sim_cores, args.sim_sockets);
        let source = SimulatedCounterSource::new(topology).with_seed(args.seed.unwrap_or(DEFAULT_SEED));
        return sample(source, args).await;
    }

    #[cfg(target_os = "linux")]
    {
        pcmon::preflight::run_preflight_checks()?;
        let source = pcmon::counters::PerfCounterSource::new()?;
        sample(source, args).await
    }

    #[cfg(not(target_os = "linux"))]
    {
        anyhow::bail!("Hardware counters are only supported on Linux.\n\nTry: pcmon <interval> --simulate")
    }
}

async fn sample<S: CounterSource>(source: S, args: &Args) -> Result<()> {
    let interval = args.interval()?;
    let policy = args.rotation_policy()?;
    let scopes = args.scopes();
    let format = args.report_format();

    if scopes.is_empty() {
        warn!("All scopes are disabled, nothing will be reported");
    }

    let topology = source.topology();
    if !args.quiet {
        eprintln!();
        eprintln!(" pcmon v{}", env!("CARGO_PKG_VERSION"));
        eprintln!();
        eprintln!(
            " Detected {} ({} family), {} cores on {} socket(s)",
            topology.brand,
            topology.family,
            topology.num_cores(),
            topology.num_sockets()
        );
        let modes: Vec<String> = policy.modes().iter().map(ToString::to_string).collect();
        eprintln!(" Sampling {interval}, event sets {}, format {format}", modes.join(" -> "));
        if format == ReportFormat::Harvester {
            eprintln!(" {}", harvester_layout_summary(policy.modes()));
        }
        eprintln!();
    }

    let encoder = encoder_for(format, ReportContext { topology: topology.clone(), scopes });
    let out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout()),
    };

    let config = LoopConfig { interval, scopes, policy, sample_limit: args.sample_limit() };
    let mut sampler = SamplingLoop::new(source, encoder, out, config);

    match sampler.run(shutdown_signal()?).await {
        Ok(summary) => {
            if !args.quiet {
                eprintln!("{summary}");
            }
            Ok(())
        }
        Err(SamplingError::Program(ProgramError::ResourceBusy)) => {
            eprintln!(
                "Performance Monitoring Unit is occupied by another application. \
                 Try to stop the application that uses the PMU."
            );
            if args.reset_pmu {
                offer_pmu_reset(sampler.source_mut())?;
            } else {
                eprintln!("Alternatively rerun with --reset-pmu to reset the PMU configuration at your own risk.");
            }
            Err(SamplingError::Program(ProgramError::ResourceBusy).into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Ask before touching PMU state other consumers rely on
fn offer_pmu_reset<S: CounterSource>(source: &mut S) -> Result<()> {
    eprintln!("You can try to reset the PMU configuration at your own risk. Try to reset? (y/n)");

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer).context("Failed to read answer")?;
    if answer.trim().eq_ignore_ascii_case("y") {
        source.reset_pmu()?;
        info!("PMU reset on operator request");
        eprintln!("PMU configuration has been reset. Try to rerun the program again.");
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        Ok(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        })
    }

    #[cfg(not(unix))]
    {
        Ok(async {
            let _ = tokio::signal::ctrl_c().await;
        })
    }
}
