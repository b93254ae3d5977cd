//! Impls - port implementations for development, tests and the demo CLI.
//!
//! A production `DocumentStore` (the code-hosting service's comment API)
//! lives outside this crate.

pub mod dir_store;
pub mod inmem_store;
pub mod manual_clock;
pub mod recording_sink;

pub use self::dir_store::DirDocumentStore;
pub use self::inmem_store::InMemoryDocumentStore;
pub use self::manual_clock::ManualClock;
pub use self::recording_sink::{NoopEventSink, RecordingEventSink};
