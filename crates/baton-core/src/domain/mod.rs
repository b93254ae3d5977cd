//! Domain model: identities, report fragments, lock timing, lock states,
//! errors, and the events the lock emits.

pub mod errors;
pub mod events;
pub mod fragment;
pub mod ids;
pub mod state;
pub mod timing;

pub use self::errors::{BatonError, ErrorKind};
pub use self::events::LockEvent;
pub use self::fragment::ReportFragment;
pub use self::ids::{Id, IdMarker, ParseIdError, Writer, WriterId};
pub use self::state::{AcquiringPhase, CreatingPhase, HoldingPhase, LockState, LockTelemetry};
pub use self::timing::{LockTiming, TimingError};
pub(crate) use self::timing::as_millis;
