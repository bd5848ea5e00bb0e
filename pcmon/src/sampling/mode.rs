//! Event-set modes
//!
//! An [`EventSetMode`] names the group of events the four programmable PMU
//! counters track during one interval.

use pcmon_common::{RawEvent, CACHE_EVENTS, CUSTOM_EVENT_NAMES, PROGRAMMABLE_COUNTERS, TLB_EVENTS};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A user-supplied raw event: event-select code and sub-event (unit) mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventDescriptor {
    pub event: u8,
    pub umask: u8,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid event descriptor `{0}` (expected EVENT:UMASK, e.g. 0x2e:0x41)")]
pub struct EventDescriptorParseError(String);

fn parse_byte(text: &str) -> Option<u8> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

impl FromStr for EventDescriptor {
    type Err = EventDescriptorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (event, umask) = s.split_once(':').unwrap_or((s, "0"));
        match (parse_byte(event), parse_byte(umask)) {
            (Some(event), Some(umask)) => Ok(Self { event, umask }),
            _ => Err(EventDescriptorParseError(s.to_string())),
        }
    }
}

impl fmt::Display for EventDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}:0x{:02x}", self.event, self.umask)
    }
}

/// The event group active during one sampling interval
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EventSetMode {
    /// Cache hits and misses
    #[default]
    Default,
    /// TLB misses and page-walk cycles
    Tlb,
    /// User-supplied raw events, re-submitted every time the mode is entered
    Custom(Vec<EventDescriptor>),
}

impl EventSetMode {
    /// Short tag used in reports
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            EventSetMode::Default => "CACHE",
            EventSetMode::Tlb => "TLB",
            EventSetMode::Custom(_) => "CUSTOM",
        }
    }

    /// The raw events to program into the general-purpose counters
    #[must_use]
    pub fn programmable_events(&self) -> Vec<RawEvent> {
        match self {
            EventSetMode::Default => CACHE_EVENTS.to_vec(),
            EventSetMode::Tlb => TLB_EVENTS.to_vec(),
            EventSetMode::Custom(events) => events
                .iter()
                .take(PROGRAMMABLE_COUNTERS)
                .zip(CUSTOM_EVENT_NAMES)
                .map(|(d, name)| RawEvent { name, event: d.event, umask: d.umask })
                .collect(),
        }
    }

    /// Counter names of the programmable events, in slot order
    #[must_use]
    pub fn counter_names(&self) -> Vec<&'static str> {
        self.programmable_events().iter().map(|e| e.name).collect()
    }
}

impl fmt::Display for EventSetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSetMode::Default => f.write_str("default"),
            EventSetMode::Tlb => f.write_str("tlb"),
            EventSetMode::Custom(events) => {
                f.write_str("custom[")?;
                for (idx, event) in events.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{event}")?;
                }
                f.write_str("]")
            }
        }
    }
}
