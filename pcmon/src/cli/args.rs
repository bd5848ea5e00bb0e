//! CLI argument definitions

use clap::{Parser, ValueEnum};
use pcmon_common::PROGRAMMABLE_COUNTERS;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::ScopeSelection;
use crate::report::ReportFormat;
use crate::sampling::{EventDescriptor, EventSetMode, IntervalSource, RotationPolicy};

/// Invalid combination of otherwise well-formed arguments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("Interval must be a positive number of milliseconds or a quoted command, got `{0}`")]
    InvalidInterval(String),

    #[error("--modes custom needs at least one --events descriptor")]
    CustomWithoutEvents,

    #[error("At most {max} custom events fit in the programmable counters, got {got}")]
    TooManyEvents { max: usize, got: usize },
}

/// Event sets selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Cache hits and misses
    Default,
    /// TLB misses and page walks
    Tlb,
    /// The events given with --events
    Custom,
}

#[derive(Parser, Debug)]
#[command(
    name = "pcmon",
    version,
    about = "Sample hardware performance counters on a fixed or command-delimited interval",
    arg_required_else_help = true,
    after_help = "\
EXAMPLES:
    sudo pcmon 1000                          Sample every second, Harvester format
    sudo pcmon 500 -nc --csv                 System and sockets only, CSV table
    sudo pcmon \"make -j8\"                    Measure one run of a command
    pcmon 100 --simulate --samples 20        Synthetic counters, no PMU access needed

Legacy spellings -nc, -ns, -nsys, -csv and /nc, /ns, /nsys, /csv, /h are accepted."
)]
pub struct Args {
    /// Delay between samples in milliseconds, or a quoted command to run once
    #[arg(value_name = "INTERVAL_MS|\"COMMAND\"")]
    pub target: String,

    /// Hide per-core output
    #[arg(long)]
    pub nocores: bool,

    /// Hide per-socket output
    #[arg(long)]
    pub nosockets: bool,

    /// Hide system-wide output
    #[arg(long)]
    pub nosystem: bool,

    /// Shorthand for --format csv
    #[arg(long, conflicts_with = "format")]
    pub csv: bool,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Event sets to rotate through, in order
    #[arg(long, value_enum, value_delimiter = ',', default_value = "default,tlb")]
    pub modes: Vec<ModeArg>,

    /// Raw events for the custom event set (adds it to the rotation if missing)
    #[arg(long, value_delimiter = ',', value_name = "EVENT:UMASK")]
    pub events: Vec<EventDescriptor>,

    /// Stop after N intervals (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub samples: u64,

    /// Write records to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Use synthetic counters instead of the PMU
    #[arg(long)]
    pub simulate: bool,

    /// Logical cores of the simulated machine
    #[arg(long, default_value = "4", requires = "simulate")]
    pub sim_cores: u32,

    /// Sockets of the simulated machine
    #[arg(long, default_value = "1", requires = "simulate")]
    pub sim_sockets: u32,

    /// Seed of the simulated counter jitter, for reproducible runs
    #[arg(long, requires = "simulate")]
    pub seed: Option<u64>,

    /// Offer to reset the PMU when another application holds it
    #[arg(long)]
    pub reset_pmu: bool,

    /// Suppress the banner and the exit summary
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    #[must_use]
    pub fn scopes(&self) -> ScopeSelection {
        ScopeSelection { cores: !self.nocores, sockets: !self.nosockets, system: !self.nosystem }
    }

    #[must_use]
    pub fn report_format(&self) -> ReportFormat {
        if self.csv {
            ReportFormat::Csv
        } else {
            self.format.unwrap_or_default()
        }
    }

    /// # Errors
    /// [`UsageError::InvalidInterval`] for `0` or an empty argument
    pub fn interval(&self) -> Result<IntervalSource, UsageError> {
        IntervalSource::parse(&self.target).ok_or_else(|| UsageError::InvalidInterval(self.target.clone()))
    }

    /// # Errors
    /// A custom mode without events, or more events than programmable counters
    pub fn rotation_policy(&self) -> Result<RotationPolicy, UsageError> {
        if self.events.len() > PROGRAMMABLE_COUNTERS {
            return Err(UsageError::TooManyEvents { max: PROGRAMMABLE_COUNTERS, got: self.events.len() });
        }

        let mut modes: Vec<EventSetMode> = self
            .modes
            .iter()
            .map(|mode| match mode {
                ModeArg::Default => Ok(EventSetMode::Default),
                ModeArg::Tlb => Ok(EventSetMode::Tlb),
                ModeArg::Custom if self.events.is_empty() => Err(UsageError::CustomWithoutEvents),
                ModeArg::Custom => Ok(EventSetMode::Custom(self.events.clone())),
            })
            .collect::<Result<_, _>>()?;

        if !self.events.is_empty() && !self.modes.contains(&ModeArg::Custom) {
            modes.push(EventSetMode::Custom(self.events.clone()));
        }

        // clap's default keeps `modes` non-empty
        RotationPolicy::new(modes).map_err(|_| UsageError::CustomWithoutEvents)
    }

    #[must_use]
    pub fn sample_limit(&self) -> Option<u64> {
        (self.samples > 0).then_some(self.samples)
    }
}
