//! Structured error types for pcmon
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::{CoreId, Scope};
use thiserror::Error;

/// Failure to program the PMU for an event set
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    #[error("Access to performance counters denied (no perf_event or MSR access)")]
    AccessDenied,

    #[error("Performance monitoring unit is occupied by another application")]
    ResourceBusy,

    #[error("Failed to program performance counters: {0}")]
    Unknown(String),
}

/// Failure to read counter values mid-run
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Counter source is not programmed")]
    NotProgrammed,

    #[error("Failed to read {counter} on {core}: {error}")]
    ReadFailed { core: CoreId, counter: String, error: std::io::Error },
}

/// Unmet requirement found before the PMU is touched
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreflightError {
    #[error(
        "Permission denied: CPU-wide performance counters need root or perf_event_paranoid <= 0 \
         (currently {paranoid}).\n\n\
         Run with: sudo pcmon ...\n\
         Or allow it: sudo sysctl kernel.perf_event_paranoid=0"
    )]
    PermissionDenied { paranoid: i32 },
}

/// Per-interval data defects found while diffing two snapshots
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeltaError {
    #[error("Cannot diff {prev} against {curr}")]
    ScopeMismatch { prev: Scope, curr: Scope },

    #[error("Tick counter went backwards: {prev} -> {curr}")]
    NonMonotonicTime { prev: u64, curr: u64 },

    #[error("Zero-length sampling interval")]
    ZeroElapsedInterval,

    #[error("No previous snapshot for {0}")]
    MissingScope(Scope),
}

/// Errors that end a sampling session
#[derive(Error, Debug)]
pub enum SamplingError {
    #[error(transparent)]
    Program(#[from] ProgramError),

    #[error("Failed to run `{command}`: {error}")]
    Command { command: String, error: std::io::Error },

    #[error("Failed to write report: {0}")]
    Output(#[from] std::io::Error),

    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Errors while rendering a report record
#[derive(Error, Debug)]
pub enum ReportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
