//! App - the lock protocol and the wiring around it.
//!
//! - **LockContext**: writer identity, domain fingerprint and timing
//! - **LockCoordinator**: the lock state machine
//! - **Reporter**: coordinator + merger, one report at a time

pub mod context;
pub mod coordinator;
pub mod reporter;

pub use self::context::LockContext;
pub use self::coordinator::LockCoordinator;
pub use self::reporter::{BuildError, Reporter, ReporterBuilder, post_or_update_report};
