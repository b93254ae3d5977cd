//! Errors and their operational classification.

use std::time::Duration;

use crate::domain::timing::TimingError;
use crate::ports::StoreError;

/// Coarse classification of a failure, for callers deciding what to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Another writer kept the lock for longer than we were willing to wait.
    Contention,
    /// The document store failed. Never retried by the lock.
    Transport,
    /// The caller handed us an unusable configuration.
    Configuration,
}

#[derive(Debug, thiserror::Error)]
pub enum BatonError {
    #[error(
        "Timed out waiting to acquire lock (waited {}ms, held {}ms)",
        .total_wait.as_millis(),
        .total_held.as_millis()
    )]
    LockTimeout {
        total_wait: Duration,
        total_held: Duration,
    },

    #[error(transparent)]
    Transport(#[from] StoreError),

    #[error("invalid lock timing: {0}")]
    InvalidTiming(#[from] TimingError),
}

impl BatonError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BatonError::LockTimeout { .. } => ErrorKind::Contention,
            BatonError::Transport(_) => ErrorKind::Transport,
            BatonError::InvalidTiming(_) => ErrorKind::Configuration,
        }
    }
}
