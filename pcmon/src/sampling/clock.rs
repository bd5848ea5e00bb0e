//! Drift-corrected wall-clock stamps
//!
//! Reports are stamped `HH:MM:SS:mmm`. The wall clock only has whole-second
//! resolution here, so the millisecond field is accumulated from the
//! monotonic process clock while the seconds field stays the same, and reset
//! to zero when a new second begins.

use chrono::{DateTime, Local, Timelike};
use std::fmt;
use std::time::SystemTime;

/// Largest value of the millisecond field
pub const MAX_MILLI: u64 = 999;

/// Local time of day with a drift-corrected millisecond field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct WallStamp {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub milli: u16,
}

impl fmt::Display for WallStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}:{:03}", self.hour, self.minute, self.second, self.milli)
    }
}

impl serde::Serialize for WallStamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Millisecond accumulator keyed on the wall-clock second
#[derive(Debug, Clone, Default)]
pub struct DriftClock {
    last_epoch_sec: Option<u64>,
    last_process_ms: u64,
    milli: u64,
}

impl DriftClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one tick and get the millisecond field for it.
    ///
    /// `epoch_secs` is whole wall-clock seconds; `process_ms` is a monotonic
    /// millisecond clock. Within one second the field never decreases.
    pub fn advance(&mut self, epoch_secs: u64, process_ms: u64) -> u16 {
        if self.last_epoch_sec == Some(epoch_secs) {
            let step = process_ms.saturating_sub(self.last_process_ms);
            self.milli = self.milli.saturating_add(step).min(MAX_MILLI);
        } else {
            self.milli = 0;
        }
        self.last_epoch_sec = Some(epoch_secs);
        self.last_process_ms = process_ms;
        u16::try_from(self.milli).unwrap_or(999)
    }

    /// Stamp a capture taken at `wall`, in the local time zone
    pub fn stamp(&mut self, wall: SystemTime, process_ms: u64) -> WallStamp {
        let local = DateTime::<Local>::from(wall);
        let epoch_secs = u64::try_from(local.timestamp()).unwrap_or(0);
        let milli = self.advance(epoch_secs, process_ms);
        let field = |v: u32| u8::try_from(v).unwrap_or(0);
        WallStamp { hour: field(local.hour()), minute: field(local.minute()), second: field(local.second()), milli }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_milli_accumulates_within_second() {
        let mut clock = DriftClock::new();
        assert_eq!(clock.advance(100, 5_000), 0);
        assert_eq!(clock.advance(100, 5_250), 250);
        assert_eq!(clock.advance(100, 5_600), 600);
        // New second resets
        assert_eq!(clock.advance(101, 5_700), 0);
        assert_eq!(clock.advance(101, 5_720), 20);
    }

    #[test]
    fn test_milli_capped_and_non_decreasing() {
        let mut clock = DriftClock::new();
        clock.advance(7, 0);
        assert_eq!(clock.advance(7, 800), 800);
        assert_eq!(clock.advance(7, 2_000), 999);
        // Process clock going backwards never lowers the field
        assert_eq!(clock.advance(7, 1_500), 999);
    }

    #[test]
    fn test_stamp_display_zero_padded() {
        let stamp = WallStamp { hour: 9, minute: 5, second: 3, milli: 7 };
        assert_eq!(stamp.to_string(), "09:05:03:007");
        assert_eq!(serde_json::to_string(&stamp).unwrap(), "\"09:05:03:007\"");
    }

    #[test]
    fn test_stamp_matches_local_time() {
        let wall = SystemTime::now();
        let local = DateTime::<Local>::from(wall);
        let stamp = DriftClock::new().stamp(wall, 0);
        assert_eq!(u32::from(stamp.hour), local.hour());
        assert_eq!(u32::from(stamp.minute), local.minute());
        assert_eq!(u32::from(stamp.second), local.second());
    }

    #[test]
    fn test_same_wall_second_accumulates() {
        let wall = SystemTime::UNIX_EPOCH + std::time::Duration::from_millis(1_700_000_000_100);
        let mut clock = DriftClock::new();
        assert_eq!(clock.stamp(wall, 40).milli, 0);
        assert_eq!(clock.stamp(wall + std::time::Duration::from_millis(300), 340).milli, 300);
        // Next wall second starts over
        assert_eq!(clock.stamp(wall + std::time::Duration::from_millis(1_000), 1_040).milli, 0);
    }

    #[test]
    fn test_stamp_fields_in_range() {
        let mut clock = DriftClock::new();
        let stamp = clock.stamp(SystemTime::now(), 0);
        assert!(stamp.hour < 24 && stamp.minute < 60 && stamp.second < 61);
        assert_eq!(stamp.milli, 0);
    }
}
