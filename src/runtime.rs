//! Runtime for threaded source drivers.
//!
//! Each driver owns one OS thread running a single-threaded reactor:
//! - `driver`: thread lifecycle, the public handle and its builder
//! - `core`: the open / fetch / suspend / reopen state machine
//! - `source`: the logical endpoint carrying the flow-control window
//! - `watch`: readiness strategies used while there is nothing to read
//! - `position`: the persisted cursor of position-tracked drivers

mod core;
mod driver;
mod position;
mod source;
mod watch;

pub(crate) use source::ThreadedSource;

pub use driver::{init_tracing, DriverState, SourceDriverBuilder, ThreadedSourceDriver};
pub use watch::{FollowPoll, NotifyWatch, ReadableProbe, ReadinessNotifier, ReadinessWatch};
