//! Ports - seams to the outside world.
//!
//! Each trait hides one external collaborator so the lock and the merger can
//! be exercised in-process: the remote document store, time, identity
//! minting, and transition observation.

pub mod clock;
pub mod document_store;
pub mod event_sink;
pub mod id_generator;

pub use self::clock::{Clock, SystemClock};
pub use self::document_store::{Blob, BlobId, DocumentStore, StoreError};
pub use self::event_sink::{EventSink, TracingEventSink};
pub use self::id_generator::{IdGenerator, UlidGenerator};
