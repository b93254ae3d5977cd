//! Lock states and the telemetry carried across transitions.
//!
//! The lock is a small hierarchical state chart:
//!
//! ```text
//! initial_read ─┬─> creating.{waiting -> searching}* -> creating.creating -> acquired
//!               ├─> acquiring.{waiting -> acquiring -> writing}
//!               │        └─> holding.{holding -> checking}* -> acquired
//!               └─> holding (resume: the document is already locked by us)
//! acquiring.waiting -> failed   (wait_timeout reached)
//! ```

use std::fmt;
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatingPhase {
    Waiting,
    Searching,
    Creating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquiringPhase {
    Waiting,
    Acquiring,
    Writing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingPhase {
    Holding,
    Checking,
}

/// Observable state of the lock state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    InitialRead,
    Creating(CreatingPhase),
    Acquiring(AcquiringPhase),
    Holding(HoldingPhase),
    Acquired,
    Failed,
}

impl LockState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LockState::Acquired | LockState::Failed)
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockState::InitialRead => "initial_read",
            LockState::Creating(CreatingPhase::Waiting) => "creating.waiting",
            LockState::Creating(CreatingPhase::Searching) => "creating.searching",
            LockState::Creating(CreatingPhase::Creating) => "creating.creating",
            LockState::Acquiring(AcquiringPhase::Waiting) => "acquiring.waiting",
            LockState::Acquiring(AcquiringPhase::Acquiring) => "acquiring.acquiring",
            LockState::Acquiring(AcquiringPhase::Writing) => "acquiring.writing",
            LockState::Holding(HoldingPhase::Holding) => "holding.holding",
            LockState::Holding(HoldingPhase::Checking) => "holding.checking",
            LockState::Acquired => "acquired",
            LockState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Context record threaded through every transition.
///
/// `total_wait_time` only counts contended waits (another writer held the
/// lock). `total_held_time` counts confirmed hold time since our last write
/// of the marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockTelemetry {
    pub wait_time: Duration,
    pub total_wait_time: Duration,
    pub total_held_time: Duration,
    pub create_attempts: u32,
}
