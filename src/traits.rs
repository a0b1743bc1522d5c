//! Worker and pipeline trait definitions.
//!
//! This module defines the seams of the threaded source driver:
//! - `SourceWorker`: the capability set a concrete source backend implements
//! - `MessageAck`: the ack/nack callbacks, invoked on the acknowledging thread
//! - `PositionTracking`: the cursor capabilities of position-tracked backends
//! - `Pipeline`: the downstream consumer that receives fetched messages

use crate::{LogMessage, SourceResult, TrackedMessage};
use std::sync::Arc;

/// Outcome of a single `SourceWorker::read_message` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    /// The message was filled and should be forwarded
    Success,
    /// The source is exhausted for now; the driver suspends until readable
    NothingToRead,
    /// The source lost its connection; the driver closes it and retries later
    NotConnected,
}

/// Final outcome of a message handed to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckType {
    /// The message was processed downstream
    Processed,
    /// The message was dropped or could not be delivered
    Aborted,
}

/// Capability set of a source backend (file follower, journal, hosted reader, ...)
///
/// Every method runs on the driver's worker thread. All of them are
/// synchronous and must return in bounded time: a slow call stalls this
/// driver's reactor and delays its shutdown. Acknowledgement callbacks are
/// not part of this trait; see `ack_handler`.
///
/// # Example
///
/// ```rust
/// use threaded_source_core::{LogMessage, ReadResult, SourceWorker};
///
/// struct Counter {
///     next: u64,
///     limit: u64,
/// }
///
/// impl SourceWorker for Counter {
///     fn open(&mut self) -> bool {
///         true
///     }
///
///     fn close(&mut self) {}
///
///     fn read_message(&mut self, msg: &mut LogMessage) -> ReadResult {
///         if self.next >= self.limit {
///             return ReadResult::NothingToRead;
///         }
///         msg.set_message(format!("tick {}", self.next));
///         self.next += 1;
///         ReadResult::Success
///     }
///
///     fn is_readable(&mut self) -> bool {
///         self.next < self.limit
///     }
/// }
/// ```
pub trait SourceWorker: Send + 'static {
    /// Open the underlying source. Returning `false` arms the reopen timer.
    fn open(&mut self) -> bool;

    /// Close the underlying source
    fn close(&mut self);

    /// Fill `msg` with the next message of the source
    fn read_message(&mut self, msg: &mut LogMessage) -> ReadResult;

    /// Optional: report whether the source is open
    ///
    /// `None` lets the driver rely on its own bookkeeping of `open`/`close`.
    fn is_opened(&self) -> Option<bool> {
        None
    }

    /// Optional: report whether a read would produce a message right now
    ///
    /// The default reports `true`, so a worker that returns `NothingToRead`
    /// without overriding this is read again on the next turn.
    fn is_readable(&mut self) -> bool {
        true
    }

    /// Optional: callbacks for the final outcome of posted messages
    ///
    /// Queried once when the driver is spawned. The handler is invoked on the
    /// thread that acknowledges a message and never touches the worker, so a
    /// slow read does not hold up acknowledgements.
    fn ack_handler(&self) -> Option<Arc<dyn MessageAck>> {
        None
    }

    /// Optional: runs on the worker thread before the first watch is armed
    fn thread_init(&mut self) {}

    /// Optional: runs on the worker thread after the source was closed
    fn thread_deinit(&mut self) {}

    /// Optional: name used in logs and metric labels
    fn stats_instance(&self) -> Option<String> {
        None
    }
}

/// Ack and nack callbacks of a source backend
///
/// Runs on whichever thread acknowledges the message, concurrently with the
/// worker. State shared with the worker needs its own synchronization.
pub trait MessageAck: Send + Sync {
    /// Called once a message was processed downstream
    fn ack(&self, msg: &LogMessage) -> SourceResult<()> {
        let _ = msg;
        Ok(())
    }

    /// Called once a message was aborted downstream
    fn nack(&self, msg: &LogMessage) -> SourceResult<()> {
        let _ = msg;
        Ok(())
    }
}

/// Cursor capabilities of a position-tracked source
///
/// A driver is position tracked when it is spawned through
/// `SourceDriverBuilder::spawn_position_tracked`; the choice is fixed for the
/// lifetime of the driver.
pub trait PositionTracking {
    /// Optional: key of the persisted position record
    ///
    /// `None` falls back to `"{group}:{id}:LogThreadedSource"`.
    fn persist_name(&self) -> Option<String> {
        None
    }

    /// Cursor of the message returned by the last successful read
    fn cursor(&mut self) -> String;

    /// Position the source right after `cursor`, or at its start for `None`
    ///
    /// Returning `false` for a stored cursor makes the driver fall back to
    /// `seek_to_cursor(None)`.
    fn seek_to_cursor(&mut self, cursor: Option<&str>) -> bool;
}

/// Downstream consumer of fetched messages
///
/// `queue` always succeeds locally; flow control is carried by the window of
/// the source, not by this call. Implementations must eventually acknowledge
/// every message (or drop it, which counts as an abort).
pub trait Pipeline: Send + Sync {
    fn queue(&self, msg: TrackedMessage);
}

impl<F> Pipeline for F
where
    F: Fn(TrackedMessage) + Send + Sync,
{
    fn queue(&self, msg: TrackedMessage) {
        self(msg)
    }
}
