//! Interval sources
//!
//! What the sampler blocks on between two captures: a fixed sleep, or an
//! external command run to completion (single-shot).

use log::{debug, warn};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::process::Command;

use crate::domain::SamplingError;

/// How one sampling interval is delimited
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntervalSource {
    /// Sleep for a fixed delay between captures
    FixedDelay(Duration),
    /// Run a shell command; the interval is its lifetime
    RunToCompletion(String),
}

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Elapsed,
    Cancelled,
}

impl IntervalSource {
    /// Interpret the positional argument.
    ///
    /// A positive integer is a delay in milliseconds; any other text is a
    /// command. Returns `None` for a literal zero, which is neither.
    #[must_use]
    pub fn parse(arg: &str) -> Option<Self> {
        let trimmed = arg.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.parse::<u64>() {
            Ok(0) => None,
            Ok(ms) => Some(IntervalSource::FixedDelay(Duration::from_millis(ms))),
            Err(_) => Some(IntervalSource::RunToCompletion(arg.to_string())),
        }
    }

    /// Command mode samples exactly one interval
    #[must_use]
    pub fn is_single_shot(&self) -> bool {
        matches!(self, IntervalSource::RunToCompletion(_))
    }

    /// Block for one interval, racing the cancellation future.
    ///
    /// A cancelled command is killed when its child handle drops.
    ///
    /// # Errors
    /// Returns [`SamplingError::Command`] if the command cannot be started or awaited.
    pub async fn wait<F>(&self, shutdown: Pin<&mut F>) -> Result<WaitOutcome, SamplingError>
    where
        F: Future<Output = ()>,
    {
        match self {
            IntervalSource::FixedDelay(delay) => {
                tokio::select! {
                    () = tokio::time::sleep(*delay) => Ok(WaitOutcome::Elapsed),
                    () = shutdown => Ok(WaitOutcome::Cancelled),
                }
            }
            IntervalSource::RunToCompletion(command) => {
                let mut child = shell(command)
                    .kill_on_drop(true)
                    .spawn()
                    .map_err(|error| SamplingError::Command { command: command.clone(), error })?;
                debug!("Started `{command}` (pid {:?})", child.id());

                tokio::select! {
                    status = child.wait() => {
                        let status = status
                            .map_err(|error| SamplingError::Command { command: command.clone(), error })?;
                        if !status.success() {
                            warn!("`{command}` exited with {status}");
                        }
                        Ok(WaitOutcome::Elapsed)
                    }
                    () = shutdown => Ok(WaitOutcome::Cancelled),
                }
            }
        }
    }
}

impl std::fmt::Display for IntervalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntervalSource::FixedDelay(delay) => write!(f, "every {} ms", delay.as_millis()),
            IntervalSource::RunToCompletion(command) => write!(f, "while running `{command}`"),
        }
    }
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
