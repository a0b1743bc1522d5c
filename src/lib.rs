//! # Threaded Source Core
//!
//! Engine for pull-based log sources that run on their own thread.
//!
//! A backend (file follower, journal reader, hosted custom reader, ...)
//! implements the small `SourceWorker` capability set: open, read one
//! message, close. The driver does everything around it:
//!
//! - runs the backend on a dedicated thread with its own reactor
//! - fetches in bounded batches and hands messages to a `Pipeline`
//! - stops fetching while too many messages are unacknowledged
//! - reopens a failed backend after a fixed interval
//! - persists a cursor once messages are acknowledged and resumes from it
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use threaded_source_core::{
//!     LogMessage, Pipeline, ReadResult, SourceConfig, SourceDriverBuilder, SourceWorker,
//!     TrackedMessage,
//! };
//!
//! struct Numbers {
//!     next: u64,
//! }
//!
//! impl SourceWorker for Numbers {
//!     fn open(&mut self) -> bool {
//!         true
//!     }
//!
//!     fn close(&mut self) {}
//!
//!     fn read_message(&mut self, msg: &mut LogMessage) -> ReadResult {
//!         msg.set_message(format!("number {}", self.next));
//!         self.next += 1;
//!         ReadResult::Success
//!     }
//! }
//!
//! let pipeline: Arc<dyn Pipeline> = Arc::new(|msg: TrackedMessage| {
//!     println!("{}", msg.message());
//!     msg.ack();
//! });
//!
//! let driver = SourceDriverBuilder::new(SourceConfig::new("numbers"), pipeline)
//!     .spawn(Numbers { next: 0 })
//!     .unwrap();
//! driver.stop();
//! ```
//!
//! ## Position tracking
//!
//! Backends that can report and seek to a cursor also implement
//! `PositionTracking` and are started with `spawn_position_tracked`. The
//! cursor of every fetched message travels with it as a `Bookmark` and is
//! written to the `PersistState` when the message is acknowledged.

pub mod ack;
mod config;
mod error;
mod message;
mod metrics;
pub mod persist;
mod runtime;
mod traits;

// Re-export public API
pub use ack::{AckTracker, Bookmark, ConsecutiveAckTracker, InstantAckTracker};
pub use config::{AckTracking, FetchSettings, ReopenSettings, SourceConfig, DEFAULT_STATS_INSTANCE};
pub use error::{SourceError, SourceResult};
pub use message::{LogMessage, TrackedMessage};
pub use metrics::SourceMetrics;
pub use persist::PersistState;
pub use runtime::{
    init_tracing, DriverState, FollowPoll, NotifyWatch, ReadableProbe, ReadinessNotifier,
    ReadinessWatch, SourceDriverBuilder, ThreadedSourceDriver,
};
pub use traits::{AckType, MessageAck, Pipeline, PositionTracking, ReadResult, SourceWorker};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
