//! Events emitted by the lock state machine.

use serde::Serialize;

use super::state::{LockState, LockTelemetry};

/// One state entry, emitted before the state's action runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockEvent {
    pub writer: String,
    pub state: LockState,
    pub telemetry: LockTelemetry,
}

impl LockEvent {
    pub fn new(writer: impl Into<String>, state: LockState, telemetry: LockTelemetry) -> Self {
        Self {
            writer: writer.into(),
            state,
            telemetry,
        }
    }
}
