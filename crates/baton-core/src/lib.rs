//! baton-core
//!
//! Lets independent CI jobs share one remote text document (a pull-request
//! comment) that offers no locking of its own.
//!
//! # Modules
//! - **domain**: writer ids, report fragments, lock timing, lock states, errors, events
//! - **document**: markup tree, tolerant parser, markup vocabulary, `DocumentMerger`
//! - **ports**: `DocumentStore`, `Clock`, `IdGenerator`, `EventSink`
//! - **app**: `LockContext`, `LockCoordinator`, `Reporter` / `post_or_update_report`
//! - **impls**: in-memory and directory stores, `ManualClock`, recording sinks

pub mod app;
pub mod document;
pub mod domain;
pub mod impls;
pub mod ports;

pub use self::app::{LockContext, LockCoordinator, Reporter, ReporterBuilder, post_or_update_report};
pub use self::document::DocumentMerger;
pub use self::domain::{BatonError, ErrorKind, LockState, LockTiming, ReportFragment, WriterId};
