//! Pre-flight checks for pcmon
//!
//! Validates system requirements before the PMU is programmed.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use log::debug;
use std::path::Path;

use crate::domain::PreflightError;

/// Minimum kernel version with the generic reference-cycles event
const MIN_KERNEL_VERSION: (u32, u32) = (3, 3);

const PERF_EVENT_PARANOID: &str = "/proc/sys/kernel/perf_event_paranoid";

/// Run all pre-flight checks before programming hardware counters
///
/// # Errors
/// Returns an error naming the first unmet requirement
pub fn run_preflight_checks() -> Result<()> {
    check_perf_events_supported()?;
    check_kernel_version()?;
    check_privileges()?;
    Ok(())
}

/// Check that the kernel was built with perf events
fn check_perf_events_supported() -> Result<()> {
    if !Path::new(PERF_EVENT_PARANOID).exists() {
        bail!(
            "This kernel does not expose perf_event_open ({PERF_EVENT_PARANOID} is missing).\n\n\
             Rebuild the kernel with CONFIG_PERF_EVENTS, or try: pcmon <interval> --simulate"
        );
    }
    Ok(())
}

/// Parse "5.15.0-generic" into (5, 15)
fn parse_kernel_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts
        .next()?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()?;
    Some((major, minor))
}

/// Check if the kernel version is recent enough
fn check_kernel_version() -> Result<()> {
    let version_str = std::fs::read_to_string("/proc/version")
        .context("Failed to read kernel version from /proc/version")?;

    // Parse version like "Linux version 5.15.0-generic ..."
    let release = version_str.split_whitespace().nth(2).unwrap_or("unknown");

    let Some((major, minor)) = parse_kernel_release(release) else {
        // Can't parse, assume it's fine
        return Ok(());
    };

    if (major, minor) < MIN_KERNEL_VERSION {
        bail!(
            "Kernel version {major}.{minor} is too old.\n\n\
             pcmon requires Linux {}.{} or newer.\n\
             Current kernel: {release}",
            MIN_KERNEL_VERSION.0,
            MIN_KERNEL_VERSION.1,
        );
    }

    Ok(())
}

/// CPU-wide counting is open to everyone only at paranoid level 0 or below
fn paranoid_allows_cpu_wide(level: i32) -> bool {
    level <= 0
}

/// Non-root users need a permissive paranoid level
fn privilege_check(is_root: bool, level: i32) -> Result<(), PreflightError> {
    if is_root || paranoid_allows_cpu_wide(level) {
        Ok(())
    } else {
        Err(PreflightError::PermissionDenied { paranoid: level })
    }
}

/// Check if running with sufficient privileges for CPU-wide counters
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    let level: i32 = std::fs::read_to_string(PERF_EVENT_PARANOID)
        .with_context(|| format!("Failed to read {PERF_EVENT_PARANOID}"))?
        .trim()
        .parse()
        .with_context(|| format!("Unexpected contents in {PERF_EVENT_PARANOID}"))?;
    debug!("perf_event_paranoid = {level}");

    privilege_check(false, level)?;
    Ok(())
}
