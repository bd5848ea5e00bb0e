//! # Sampling Engine
//!
//! - [`EventSetMode`] / [`EventSetRotator`] - which events are counted when
//! - [`IntervalSource`] - what the loop blocks on between captures
//! - [`DriftClock`] - `HH:MM:SS:mmm` stamps with accumulated milliseconds
//! - [`SamplingLoop`] - the capture, diff, report and rotate driver

pub mod clock;
pub mod engine;
pub mod interval;
pub mod mode;
pub mod rotator;
pub mod session;

pub use clock::{DriftClock, WallStamp};
pub use engine::{ExitReason, LoopConfig, RunSummary, SamplingLoop};
pub use interval::{IntervalSource, WaitOutcome};
pub use mode::{EventDescriptor, EventDescriptorParseError, EventSetMode};
pub use rotator::{EmptyPolicyError, EventSetRotator, RotationPolicy};
pub use session::{SamplingSession, SessionStats};
