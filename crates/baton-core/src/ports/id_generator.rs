//! IdGenerator port - writer identities.
//!
//! Each process invocation needs an identity that no other concurrently
//! running job shares, minted without coordination. ULIDs fit: timestamp
//! from the injected `Clock`, 80 random bits.

use crate::domain::ids::WriterId;
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn generate_writer_id(&self) -> WriterId;
}

/// ULID based generator.
///
/// With a `ManualClock` the timestamp part is deterministic, the random part
/// still differs per id.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_writer_id(&self) -> WriterId {
        let timestamp_ms = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        WriterId::from(ulid)
    }
}
