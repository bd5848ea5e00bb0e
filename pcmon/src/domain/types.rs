//! Newtypes and small value types shared across the engine

use serde::Serialize;
use std::fmt;

/// Logical core (hardware thread) index as numbered by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CoreId(pub u32);

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// Physical package (socket) index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SocketId(pub u32);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Granularity a snapshot was captured at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase", tag = "scope", content = "id")]
pub enum Scope {
    Core(CoreId),
    Socket(SocketId),
    System,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Core(id) => write!(f, "core {}", id.0),
            Scope::Socket(id) => write!(f, "socket {}", id.0),
            Scope::System => f.write_str("system"),
        }
    }
}

/// Which scopes are captured and reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeSelection {
    pub cores: bool,
    pub sockets: bool,
    pub system: bool,
}

impl ScopeSelection {
    /// All scopes enabled
    #[must_use]
    pub const fn all() -> Self {
        Self { cores: true, sockets: true, system: true }
    }

    /// True when no scope is enabled (nothing to capture or report)
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.cores && !self.sockets && !self.system
    }
}

impl Default for ScopeSelection {
    fn default() -> Self {
        Self::all()
    }
}
