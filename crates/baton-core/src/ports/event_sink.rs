//! EventSink port - observing lock state transitions.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{LockEvent, as_millis};

/// Receives every state entry of the lock state machine, in order.
///
/// # Implementations
/// - `TracingEventSink`: default, logs through `tracing`
/// - `RecordingEventSink`: keeps events for assertions
/// - `NoopEventSink`: drops them
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LockEvent);
}

/// Default sink: structured `debug!` logs per transition, `info!` once the
/// lock is settled either way.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &LockEvent) {
        let total_wait_ms = as_millis(event.telemetry.total_wait_time);
        let total_held_ms = as_millis(event.telemetry.total_held_time);
        if event.state.is_terminal() {
            info!(
                writer = %event.writer,
                state = %event.state,
                total_wait_ms,
                total_held_ms,
                "lock settled"
            );
        } else {
            debug!(
                writer = %event.writer,
                state = %event.state,
                wait_ms = as_millis(event.telemetry.wait_time),
                total_wait_ms,
                total_held_ms,
                "lock state event"
            );
        }
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: &LockEvent) {
        (**self).emit(event);
    }
}
