//! # pcmon - Hardware Performance Counter Sampler
//!
//! pcmon periodically snapshots CPU performance counters per core, per socket
//! and system-wide, differences consecutive snapshots, derives normalized
//! metrics (IPC, cache hit ratios, stall estimates, memory bandwidth) and
//! writes one record per interval in a choice of text formats.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────┐  program(mode)   ┌──────────────────┐
//! │  EventSetRotator │─────────────────▶│  CounterSource   │
//! └──────────────────┘                  │  (perf / sim)    │
//!          ▲                            └────────┬─────────┘
//!          │ advance                             │ capture_all
//!          │                                     ▼
//! ┌────────┴─────────┐                  ┌──────────────────┐
//! │   SamplingLoop   │◀─────────────────│  ScopeSnapshots  │
//! │ (tokio, select!) │                  └──────────────────┘
//! └────────┬─────────┘
//!          │ diff_all
//!          ▼
//! ┌──────────────────┐   encode   ┌──────────────────────────────┐
//! │  DeltaComputer   │───────────▶│ ReportEncoder                │
//! │  (wrap-safe)     │            │ Simple / CSV / Harvester / JSON │
//! └──────────────────┘            └──────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`counters`]: snapshots, wrap-safe deltas, derived metrics and the
//!   [`CounterSource`](counters::CounterSource) seam with its perf_event and
//!   simulated implementations
//! - [`sampling`]: event-set modes, rotation, interval sources, the drift
//!   clock and the [`SamplingLoop`](sampling::SamplingLoop) driver
//! - [`report`]: output encoders
//! - [`cli`]: command-line parsing, including legacy flag spellings
//! - [`domain`]: scope identifiers and error types
//!
//! ## Multiplexing
//!
//! The PMU has four programmable counters. pcmon rotates the event set
//! between intervals (cache events, then TLB events, then optionally a
//! user-defined set), so each record reflects exactly one event set and
//! carries a tag saying which.
//!
//! ## Typical Usage
//!
//! ```bash
//! # Sample every second
//! sudo pcmon 1000
//!
//! # CSV table without per-core columns
//! sudo pcmon 500 --nocores --csv -o counters.csv
//!
//! # Measure one command
//! sudo pcmon "make -j8"
//! ```

pub mod cli;
pub mod counters;
pub mod domain;
#[cfg(target_os = "linux")]
pub mod preflight;
pub mod report;
pub mod sampling;
